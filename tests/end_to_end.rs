use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bedwatch_lib::detection::{
    Classifier, ClassifierError, PostureClass, PostureClassifierAdapter, PostureDetectionResult,
    RawPrediction,
};
use bedwatch_lib::heatmap::{Heatmap, HeatmapBroadcaster, HeatmapCompositor, InterpolationMethod};
use bedwatch_lib::pipeline::{DetectionPipeline, Recorder};
use bedwatch_lib::remote::MemoryStore;
use bedwatch_lib::serial::{board_grids, parse_line, BoardId, BoardStream, SharedBoardState};
use bedwatch_lib::settings::{PipelineSettings, StreamSettings};
use chrono::NaiveDateTime;

fn compose_lines(lines: &[&str]) -> Heatmap {
    let state = SharedBoardState::new();
    for line in lines {
        state.publish(parse_line(line).unwrap());
    }
    let (head, body) = board_grids(&state.snapshot().latest);
    HeatmapCompositor::new(InterpolationMethod::Cubic)
        .compose(head.view(), body.view())
        .unwrap()
}

#[test]
fn tagged_body_line_lands_in_the_first_body_row() {
    let reading = parse_line("UNO1_C0: 200 UNO1_C1: 50").unwrap();
    assert_eq!(reading.board, BoardId::Uno1);
    assert_eq!(reading.channel(0), 200);
    assert_eq!(reading.channel(1), 50);

    let heatmap = compose_lines(&["UNO1_C0: 200 UNO1_C1: 50"]);
    assert_eq!(heatmap.dim(), (14, 7));
    assert_eq!(heatmap[[2, 0]], 200.0);
    assert_eq!(heatmap[[2, 1]], 50.0);
    assert_eq!(heatmap[[3, 0]], 0.0);
    assert_eq!(heatmap.row(0).sum(), 0.0);
}

#[test]
fn bracketed_head_line_is_stretched_across_the_head_rows() {
    let heatmap = compose_lines(&["[UNO0] C0=10 C3=20"]);
    assert_eq!(heatmap.dim(), (14, 7));
    assert!((heatmap[[0, 0]] - 10.0).abs() < 1e-9);
    assert!((heatmap[[1, 0]] - 20.0).abs() < 1e-9);
    // Source columns 1 and 2 sit on target columns 3 and 6.
    assert!(heatmap[[0, 3]].abs() < 1e-9);
    assert!(heatmap[[1, 6]].abs() < 1e-9);
    assert_eq!(heatmap.slice(ndarray::s![2.., ..]).sum(), 0.0);
}

#[test]
fn stream_emits_a_frame_per_new_revision() {
    let state = Arc::new(SharedBoardState::new());
    let mut stream = BoardStream::new(Arc::clone(&state), StreamSettings::default());
    let stop = AtomicBool::new(false);

    state.publish(parse_line("UNO2_C7: 9").unwrap());
    let frame = stream.next_frame(&stop).unwrap();
    assert_eq!(frame.revision, 1);
    assert_eq!(frame.body[[3, 0]], 9.0);

    state.publish(parse_line("[UNO0] C5=4").unwrap());
    let frame = stream.next_frame(&stop).unwrap();
    assert_eq!(frame.revision, 2);
    assert_eq!(frame.head[[1, 2]], 4.0);
}

/// Predicts prone whenever the heatmap carries any pressure.
struct LoadedClassifier;

impl Classifier for LoadedClassifier {
    fn classify(&self, features: &[f64]) -> Result<RawPrediction, ClassifierError> {
        let loaded = features.iter().any(|value| *value > 0.0);
        Ok(RawPrediction {
            class_index: if loaded { 3 } else { 4 },
            ..RawPrediction::default()
        })
    }
}

#[derive(Clone, Default)]
struct SharedLog(Arc<Mutex<Vec<(NaiveDateTime, PostureClass)>>>);

impl Recorder for SharedLog {
    fn record(&mut self, timestamp: NaiveDateTime, _: &Heatmap, detection: &PostureDetectionResult) -> bool {
        self.0.lock().unwrap().push((timestamp, detection.posture));
        true
    }
}

#[test]
fn composed_heatmaps_flow_through_the_pipeline() {
    let log = SharedLog::default();
    let pipeline = DetectionPipeline::start(
        &PipelineSettings::default(),
        PostureClassifierAdapter::new(Box::new(LoadedClassifier)),
        Box::new(log.clone()),
    )
    .unwrap();

    let at = chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    assert!(pipeline.submit(compose_lines(&["UNO1_C0: 200 UNO1_C1: 50"]), at));
    assert!(pipeline.submit(Heatmap::zeros((14, 7)), at + chrono::Duration::seconds(1)));
    assert!(pipeline.submit(Heatmap::zeros((3, 3)), at + chrono::Duration::seconds(2)));

    let postures: Vec<_> = (0..3)
        .map(|_| pipeline.next_result(Duration::from_secs(5)).unwrap().detection.posture)
        .collect();
    assert_eq!(
        postures,
        [PostureClass::Prone, PostureClass::Unknown, PostureClass::Unknown]
    );
    assert_eq!(log.0.lock().unwrap().len(), 3);

    pipeline.stop(Duration::from_secs(2));
    assert!(!pipeline.submit(Heatmap::zeros((14, 7)), at));
}

#[test]
fn broadcaster_uploads_the_latest_heatmap() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = DetectionPipeline::start(
        &PipelineSettings::default(),
        PostureClassifierAdapter::new(Box::new(LoadedClassifier)),
        Box::new(SharedLog::default()),
    )
    .unwrap();
    let mut broadcaster =
        HeatmapBroadcaster::start(store.clone(), 7, pipeline.realtime_slot()).unwrap();

    let heatmap = compose_lines(&["UNO1_C0: 200 UNO1_C1: 50"]);
    pipeline.publish_realtime(heatmap.clone());

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while store.heatmap(7).is_none() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    broadcaster.stop(Duration::from_secs(2));
    pipeline.stop(Duration::from_secs(2));

    let uploaded = store.heatmap(7).unwrap();
    assert_eq!(uploaded.len(), 14 * 7);
    assert_eq!(uploaded[2 * 7], 200.0);
    assert_eq!(uploaded[2 * 7 + 1], 50.0);
}
