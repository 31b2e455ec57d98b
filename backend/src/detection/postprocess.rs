use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{ArrayView2, Axis};

use super::provider::{BoundingBox, Detection, ProviderError};

/// Grey used by YOLOv8 for letterbox padding.
const PAD_VALUE: u8 = 114;

/// How an image was scaled and padded into the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl Letterbox {
    pub fn new(orig_width: u32, orig_height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / orig_width as f32).min(input_size as f32 / orig_height as f32);
        let new_width = (orig_width as f32 * scale).round();
        let new_height = (orig_height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((input_size as f32 - new_width) / 2.0).floor(),
            pad_y: ((input_size as f32 - new_height) / 2.0).floor(),
            orig_width,
            orig_height,
        }
    }

    /// Map a box from model-input space back onto the original image.
    pub fn restore(&self, bbox: BoundingBox) -> BoundingBox {
        let max_x = self.orig_width as f32;
        let max_y = self.orig_height as f32;
        BoundingBox::new(
            ((bbox.x1 - self.pad_x) / self.scale).clamp(0.0, max_x),
            ((bbox.y1 - self.pad_y) / self.scale).clamp(0.0, max_y),
            ((bbox.x2 - self.pad_x) / self.scale).clamp(0.0, max_x),
            ((bbox.y2 - self.pad_y) / self.scale).clamp(0.0, max_y),
        )
    }
}

/// Resize keeping aspect ratio and pad to a square `input_size` canvas.
pub fn letterbox_image(image: &RgbImage, input_size: u32) -> (RgbImage, Letterbox) {
    let letterbox = Letterbox::new(image.width(), image.height(), input_size);
    let new_width = ((image.width() as f32 * letterbox.scale).round() as u32).max(1);
    let new_height = ((image.height() as f32 * letterbox.scale).round() as u32).max(1);

    let resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb([PAD_VALUE; 3]));
    imageops::overlay(
        &mut canvas,
        &resized,
        letterbox.pad_x as i64,
        letterbox.pad_y as i64,
    );
    (canvas, letterbox)
}

/// Decode a raw YOLOv8 head output of shape `[4 + num_classes, num_anchors]`.
///
/// Each anchor column holds `cx, cy, w, h` followed by one score per class.
/// Anchors whose best class score is below `confidence_threshold` are dropped.
pub fn decode_predictions(
    output: ArrayView2<f32>,
    confidence_threshold: f32,
    letterbox: &Letterbox,
) -> Result<Vec<Detection>, ProviderError> {
    if output.nrows() <= 4 {
        return Err(ProviderError::Inference(format!(
            "unexpected output shape {:?}",
            output.shape()
        )));
    }

    let mut detections = Vec::new();
    for anchor in output.axis_iter(Axis(1)) {
        let (class_id, confidence) = anchor
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .fold((0usize, f32::MIN), |best, (index, score)| {
                if score > best.1 { (index, score) } else { best }
            });
        if confidence < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
        let bbox = letterbox.restore(BoundingBox::new(
            cx - w / 2.0,
            cy - h / 2.0,
            cx + w / 2.0,
            cy + h / 2.0,
        ));
        if bbox.area() <= 0.0 {
            continue;
        }
        detections.push(Detection {
            class_id: class_id as u32,
            confidence,
            bbox,
        });
    }
    Ok(detections)
}

/// Per-class non-maximum suppression; the result is ordered by confidence.
pub fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept.iter().any(|winner| {
            winner.class_id == candidate.class_id
                && winner.bbox.intersection_over_union(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
