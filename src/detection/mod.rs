pub mod adapter;
pub mod classifier;
pub mod posture;

pub use adapter::PostureClassifierAdapter;
pub use classifier::{features, Classifier, ClassifierError, ModelFileClassifier, FEATURE_LEN};
pub use posture::{
    apply_policy, PostureClass, PostureDetectionResult, RawPrediction, Region, RegionFlags,
};
