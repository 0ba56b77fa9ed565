pub mod board_state;
pub mod parser;
pub mod reader;
pub mod stream;

pub use board_state::{BoardSnapshot, SharedBoardState};
pub use parser::{parse_line, parse_line_at, BoardId, BoardReading};
pub use reader::{discover_ports, SerialIngestor};
pub use stream::{board_grids, BoardStream, SerialFrame};
