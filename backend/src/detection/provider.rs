use shared::ClassLabel;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Model load error: {0}")]
    ModelLoad(String),
    #[cfg(feature = "torch")]
    #[error("Image error: {0}")]
    Image(String),
    #[error("Inference error: {0}")]
    Inference(String),
}

/// Axis-aligned box in pixel coordinates of the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn intersection_over_union(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// One object found by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Class-id to label mapping that ships with a trained model.
///
/// Aggregation resolves every class id through this mapping, so a model
/// trained with a different class order only needs different metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabels {
    names: BTreeMap<u32, String>,
}

impl ClassLabels {
    pub fn new(names: BTreeMap<u32, String>) -> Self {
        Self { names }
    }

    pub fn name(&self, class_id: u32) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }

    /// Label used in response details; unmapped ids are rendered as `class_<id>`.
    pub fn display_name(&self, class_id: u32) -> String {
        match self.name(class_id) {
            Some(name) => name.to_string(),
            None => format!("class_{}", class_id),
        }
    }

    pub fn label(&self, class_id: u32) -> Option<ClassLabel> {
        self.name(class_id)
            .and_then(|name| ClassLabel::from_str(&name.to_ascii_lowercase()).ok())
    }
}

impl Default for ClassLabels {
    fn default() -> Self {
        let mut names = BTreeMap::new();
        names.insert(0, ClassLabel::Head.to_string());
        names.insert(1, ClassLabel::Helmet.to_string());
        Self { names }
    }
}

/// An object-detection model that has been loaded once and is shared by
/// every request.
pub trait DetectionProvider: Send + Sync {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Run the model on an image that is already on disk.
    ///
    /// This call may block for as long as inference takes.
    fn infer(&self, image_path: &Path) -> Result<Vec<Detection>, ProviderError>;

    fn class_labels(&self) -> &ClassLabels;
}
