use ndarray::{concatenate, Array2, ArrayD, ArrayView2, Axis, Ix2};

use super::resize::{resize, InterpolationMethod};
use super::{Heatmap, HeatmapError};

/// Merges a head grid and a body grid into one surface: both are resized to
/// the wider column count (rows unchanged) and the head is stacked on top.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeatmapCompositor {
    method: InterpolationMethod,
}

impl HeatmapCompositor {
    pub fn new(method: InterpolationMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> InterpolationMethod {
        self.method
    }

    pub fn compose(
        &self,
        head: ArrayView2<'_, f64>,
        body: ArrayView2<'_, f64>,
    ) -> Result<Heatmap, HeatmapError> {
        if head.is_empty() || body.is_empty() {
            return Err(HeatmapError::EmptyGrid);
        }

        let cols = head.ncols().max(body.ncols());
        let head = resize(head, (head.nrows(), cols), self.method)?;
        let body = resize(body, (body.nrows(), cols), self.method)?;
        if head.ncols() != body.ncols() {
            return Err(HeatmapError::ColumnMismatch {
                head: head.ncols(),
                body: body.ncols(),
            });
        }

        concatenate(Axis(0), &[head.view(), body.view()]).map_err(|_| {
            HeatmapError::ColumnMismatch {
                head: head.ncols(),
                body: body.ncols(),
            }
        })
    }

    /// Same as [`compose`](Self::compose) for grids of unchecked rank.
    pub fn compose_dyn(&self, head: &ArrayD<f64>, body: &ArrayD<f64>) -> Result<Heatmap, HeatmapError> {
        let head = two_dimensional(head)?;
        let body = two_dimensional(body)?;
        self.compose(head.view(), body.view())
    }
}

fn two_dimensional(grid: &ArrayD<f64>) -> Result<Array2<f64>, HeatmapError> {
    grid.clone()
        .into_dimensionality::<Ix2>()
        .map_err(|_| HeatmapError::NotTwoDimensional { ndim: grid.ndim() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array2, IxDyn};

    fn ramp(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f64)
    }

    #[test]
    fn aligned_inputs_are_stacked_unchanged() {
        let compositor = HeatmapCompositor::new(InterpolationMethod::Cubic);
        let head = ramp(2, 7);
        let body = ramp(12, 7);
        let out = compositor.compose(head.view(), body.view()).unwrap();
        assert_eq!(out.dim(), (14, 7));
        assert_eq!(out.slice(s![..2, ..]), head);
        assert_eq!(out.slice(s![2.., ..]), body);
    }

    #[test]
    fn narrow_head_is_widened_to_body_columns() {
        let compositor = HeatmapCompositor::default();
        let head = ndarray::array![[10.0, 0.0, 0.0], [20.0, 0.0, 0.0]];
        let body = Array2::zeros((12, 7));
        let out = compositor.compose(head.view(), body.view()).unwrap();
        assert_eq!(out.dim(), (14, 7));
        // End points are interpolation nodes, so they survive the resize.
        assert!((out[[0, 0]] - 10.0).abs() < 1e-9);
        assert!((out[[1, 0]] - 20.0).abs() < 1e-9);
        assert!(out[[0, 6]].abs() < 1e-9);
        assert_eq!(out.slice(s![2.., ..]).sum(), 0.0);
    }

    #[test]
    fn empty_grids_are_rejected() {
        let compositor = HeatmapCompositor::default();
        let head = Array2::<f64>::zeros((0, 3));
        let body = Array2::zeros((12, 7));
        assert!(matches!(
            compositor.compose(head.view(), body.view()),
            Err(HeatmapError::EmptyGrid)
        ));
    }

    #[test]
    fn non_matrix_input_is_rejected() {
        let compositor = HeatmapCompositor::default();
        let head = ArrayD::<f64>::zeros(IxDyn(&[2, 3, 1]));
        let body = ArrayD::<f64>::zeros(IxDyn(&[12, 7]));
        assert!(matches!(
            compositor.compose_dyn(&head, &body),
            Err(HeatmapError::NotTwoDimensional { ndim: 3 })
        ));

        let head = ArrayD::<f64>::zeros(IxDyn(&[2, 3]));
        assert_eq!(compositor.compose_dyn(&head, &body).unwrap().dim(), (14, 7));
    }
}
