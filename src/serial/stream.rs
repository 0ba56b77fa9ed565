use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDateTime};
use ndarray::Array2;

use crate::settings::StreamSettings;

use super::board_state::SharedBoardState;
use super::parser::{BoardId, BoardReading};

pub const HEAD_ROWS: usize = 2;
pub const HEAD_COLS: usize = 3;
pub const BODY_ROWS: usize = 12;
pub const BODY_COLS: usize = 7;

/// Head and body grids captured from one board snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialFrame {
    pub captured_at: NaiveDateTime,
    pub revision: u64,
    pub head: Array2<f64>,
    pub body: Array2<f64>,
}

fn fill_row(grid: &mut Array2<f64>, row: usize, reading: &BoardReading, first_channel: u32) {
    for col in 0..grid.ncols() {
        let value = reading.channel(first_channel + col as u32);
        if value != 0 {
            grid[[row, col]] = value as f64;
        }
    }
}

/// Lays the board map out as a 2×3 head grid and a 12×7 body grid.
///
/// The head board feeds C0–C2 into head row 0 and C3–C5 into head row 1.
/// Body board `n` (1..=6) feeds C0–C6 into body row `2(n-1)` and C7–C13 into
/// the row below it. Channels a board did not report stay at zero.
pub fn board_grids(boards: &BTreeMap<BoardId, BoardReading>) -> (Array2<f64>, Array2<f64>) {
    let mut head = Array2::zeros((HEAD_ROWS, HEAD_COLS));
    let mut body = Array2::zeros((BODY_ROWS, BODY_COLS));

    for (board, reading) in boards {
        if board.is_head() {
            fill_row(&mut head, 0, reading, 0);
            fill_row(&mut head, 1, reading, HEAD_COLS as u32);
        } else {
            let top = 2 * (board.ordinal() - 1);
            fill_row(&mut body, top, reading, 0);
            fill_row(&mut body, top + 1, reading, BODY_COLS as u32);
        }
    }

    (head, body)
}

/// Pull-side view of [`SharedBoardState`]: turns revisions into frames no
/// faster than the configured pacing allows.
pub struct BoardStream {
    state: Arc<SharedBoardState>,
    settings: StreamSettings,
    last_revision: Option<u64>,
    last_emit: Option<Instant>,
}

impl BoardStream {
    pub fn new(state: Arc<SharedBoardState>, settings: StreamSettings) -> Self {
        Self {
            state,
            settings,
            last_revision: None,
            last_emit: None,
        }
    }

    fn should_emit(&self, revision: u64, now: Instant) -> bool {
        let (Some(last_revision), Some(last_emit)) = (self.last_revision, self.last_emit) else {
            return true;
        };
        revision.saturating_sub(last_revision) >= self.settings.min_revision_delta
            || now.duration_since(last_emit) >= self.settings.min_interval
    }

    /// Blocks until a frame is due. Only returns `None` once `stop` is set.
    pub fn next_frame(&mut self, stop: &AtomicBool) -> Option<SerialFrame> {
        while !stop.load(Ordering::Relaxed) {
            let seen = self.last_revision.unwrap_or(0);
            let snapshot = self.state.wait_for_change(seen, self.settings.timeout);
            let now = Instant::now();

            if !self.should_emit(snapshot.revision, now) {
                continue;
            }

            let (head, body) = board_grids(&snapshot.latest);
            self.last_revision = Some(snapshot.revision);
            self.last_emit = Some(now);
            return Some(SerialFrame {
                captured_at: Local::now().naive_local(),
                revision: snapshot.revision,
                head,
                body,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::parser::parse_line;
    use std::time::Duration;

    fn boards_from(lines: &[&str]) -> BTreeMap<BoardId, BoardReading> {
        lines
            .iter()
            .filter_map(|line| parse_line(line))
            .map(|reading| (reading.board, reading))
            .collect()
    }

    #[test]
    fn head_board_fills_both_head_rows() {
        let (head, body) = board_grids(&boards_from(&["[UNO0] C0=10 C3=20"]));
        assert_eq!(head[[0, 0]], 10.0);
        assert_eq!(head[[1, 0]], 20.0);
        assert_eq!(head.sum(), 30.0);
        assert_eq!(body.sum(), 0.0);
    }

    #[test]
    fn body_boards_land_at_their_ordinal_rows() {
        let (head, body) = board_grids(&boards_from(&[
            "UNO1_C0: 200 UNO1_C1: 50",
            "UNO6_C6=3 UNO6_C13=4",
        ]));
        assert_eq!(head.sum(), 0.0);
        assert_eq!(body[[0, 0]], 200.0);
        assert_eq!(body[[0, 1]], 50.0);
        assert_eq!(body[[10, 6]], 3.0);
        assert_eq!(body[[11, 6]], 4.0);
        assert_eq!(body.sum(), 257.0);
    }

    #[test]
    fn channels_past_the_board_width_are_ignored() {
        let (head, _) = board_grids(&boards_from(&["[UNO0] C6=99 C2=1"]));
        assert_eq!(head.sum(), 1.0);
        assert_eq!(head[[0, 2]], 1.0);
    }

    #[test]
    fn stream_emits_first_frame_then_waits_for_new_revisions() {
        let state = Arc::new(SharedBoardState::new());
        let settings = StreamSettings {
            min_interval: Duration::from_secs(60),
            timeout: Duration::from_millis(10),
            min_revision_delta: 1,
        };
        let mut stream = BoardStream::new(Arc::clone(&state), settings);
        let stop = AtomicBool::new(false);

        let first = stream.next_frame(&stop).unwrap();
        assert_eq!(first.revision, 0);

        state.publish(parse_line("UNO2_C7=5").unwrap());
        let second = stream.next_frame(&stop).unwrap();
        assert_eq!(second.revision, 1);
        assert_eq!(second.body[[3, 0]], 5.0);
    }

    #[test]
    fn stream_returns_none_once_stopped() {
        let state = Arc::new(SharedBoardState::new());
        let mut stream = BoardStream::new(state, StreamSettings::default());
        let stop = AtomicBool::new(true);
        assert!(stream.next_frame(&stop).is_none());
    }
}
