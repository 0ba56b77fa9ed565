use log::{debug, error};

use crate::heatmap::Heatmap;

use super::classifier::{features, Classifier};
use super::posture::{apply_policy, PostureDetectionResult};

/// Runs the classifier on a heatmap and applies the region policy. Any
/// classifier failure degrades to an unknown posture with no flags.
pub struct PostureClassifierAdapter {
    classifier: Box<dyn Classifier>,
}

impl PostureClassifierAdapter {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self { classifier }
    }

    pub fn detect(&self, heatmap: &Heatmap) -> PostureDetectionResult {
        let prediction = features(heatmap.view())
            .and_then(|features| self.classifier.classify(&features));

        match prediction {
            Ok(raw) => {
                let result = apply_policy(&raw);
                debug!(
                    "Classified as {} (class {}, upper_body={}, right_leg={}, left_leg={}, feet={})",
                    result.posture, raw.class_index, raw.upper_body, raw.right_leg, raw.left_leg, raw.feet
                );
                result
            }
            Err(err) => {
                error!("Posture classification failed: {err}");
                PostureDetectionResult::unknown()
            }
        }
    }
}
