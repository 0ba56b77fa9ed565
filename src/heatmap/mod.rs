pub mod compositor;
pub mod realtime;
pub mod resize;

use ndarray::Array2;
use thiserror::Error;

pub use compositor::HeatmapCompositor;
pub use realtime::{HeatmapBroadcaster, LatestSlot};
pub use resize::{resize, InterpolationMethod};

/// Unified pressure surface: head rows stacked over body rows.
pub type Heatmap = Array2<f64>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeatmapError {
    #[error("expected a 2-D grid, got {ndim} dimensions")]
    NotTwoDimensional { ndim: usize },
    #[error("grid has no cells")]
    EmptyGrid,
    #[error("invalid target shape {rows}x{cols}")]
    InvalidShape { rows: usize, cols: usize },
    #[error("column count mismatch after alignment: head {head}, body {body}")]
    ColumnMismatch { head: usize, body: usize },
}
