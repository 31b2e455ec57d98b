use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Object classes the helmet model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClassLabel {
    /// A bare head, i.e. a worker without a helmet.
    Head,
    Helmet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum SafetyStatus {
    Safe,
    Warning,
    Danger,
    /// No verdict could be produced because no model is loaded.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_workers: u32,
    pub helmet_worn: u32,
    pub helmet_not_worn: u32,
    pub risk_percentage: f64,
    pub safety_status: SafetyStatus,
}

impl Summary {
    /// Zeroed summary reported when no detection model is available.
    pub fn unavailable() -> Self {
        Self {
            total_workers: 0,
            helmet_worn: 0,
            helmet_not_worn: 0,
            risk_percentage: 0.0,
            safety_status: SafetyStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Label resolved through the model's class mapping, e.g. `head` or `helmet`.
    #[serde(rename = "class")]
    pub class: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in pixels of the uploaded image.
    pub bbox: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub success: bool,
    pub image_url: String,
    pub image_width: u32,
    pub image_height: u32,
    pub summary: Summary,
    pub details: Vec<DetectionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}
