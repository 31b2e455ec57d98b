use shared::{ClassLabel, DetectionRecord, SafetyStatus, Summary};

use super::provider::{ClassLabels, Detection};

/// Share of bare heads, in percent, above which an image is `Danger`.
pub const DANGER_THRESHOLD_PERCENT: u64 = 30;

/// Smallest percentage reported while at least one head was seen.
const MIN_NONZERO_PERCENT: f64 = 0.01;

/// Reduce one image's detections to a safety summary.
///
/// The status is decided on the exact ratio; only the reported
/// percentage is rounded.
pub fn aggregate(detections: &[Detection], labels: &ClassLabels) -> Summary {
    let mut helmet_not_worn: u32 = 0;
    let mut helmet_worn: u32 = 0;

    for detection in detections {
        match labels.label(detection.class_id) {
            Some(ClassLabel::Head) => helmet_not_worn += 1,
            Some(ClassLabel::Helmet) => helmet_worn += 1,
            None => {}
        }
    }

    let total_workers = helmet_not_worn + helmet_worn;
    if total_workers == 0 {
        return Summary {
            total_workers: 0,
            helmet_worn: 0,
            helmet_not_worn: 0,
            risk_percentage: 0.0,
            safety_status: SafetyStatus::Safe,
        };
    }

    let risk_ratio = 100.0 * f64::from(helmet_not_worn) / f64::from(total_workers);
    let mut risk_percentage = round2(risk_ratio);
    if helmet_not_worn > 0 && risk_percentage == 0.0 {
        risk_percentage = MIN_NONZERO_PERCENT;
    }

    Summary {
        total_workers,
        helmet_worn,
        helmet_not_worn,
        risk_percentage,
        safety_status: classify(helmet_not_worn, total_workers),
    }
}

/// Safe at zero, Warning up to and including 30%, Danger above.
pub fn classify(helmet_not_worn: u32, total_workers: u32) -> SafetyStatus {
    if helmet_not_worn == 0 || total_workers == 0 {
        return SafetyStatus::Safe;
    }
    // 100 * n / t > 30  <=>  100 * n > 30 * t
    if 100 * u64::from(helmet_not_worn) > DANGER_THRESHOLD_PERCENT * u64::from(total_workers) {
        SafetyStatus::Danger
    } else {
        SafetyStatus::Warning
    }
}

/// Per-detection details in provider order.
pub fn to_records(detections: &[Detection], labels: &ClassLabels) -> Vec<DetectionRecord> {
    detections
        .iter()
        .map(|detection| DetectionRecord {
            class: labels.display_name(detection.class_id),
            confidence: round2_f32(detection.confidence),
            bbox: detection.bbox.to_array(),
        })
        .collect()
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round2_f32(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
