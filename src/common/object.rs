use serde::{Deserialize, Serialize};

use crate::common::geometry::Rect;

const UNKNOWN_LABEL: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    pub confidence: f32,
    pub index: i32,
}

impl Label {
    pub fn new(text: impl Into<String>, confidence: f32, index: i32) -> Self {
        Self {
            text: text.into(),
            confidence,
            index,
        }
    }
}

/// One detector hit. The bounding box is in upright image coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub bounding_box: Rect,
    /// Stable across consecutive stream-mode frames while the same physical object persists.
    pub tracking_id: Option<u32>,
    pub labels: Vec<Label>,
}

impl DetectedObject {
    pub fn new(bounding_box: Rect, tracking_id: Option<u32>) -> Self {
        Self {
            bounding_box,
            tracking_id,
            labels: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: Vec<Label>) -> Self {
        self.labels = labels;
        self
    }

    /// Custom models report "N/A" for objects they could not classify.
    pub fn has_valid_labels(&self) -> bool {
        !self.labels.is_empty() && self.labels.iter().all(|label| label.text != UNKNOWN_LABEL)
    }
}
