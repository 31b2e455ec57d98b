use ndarray::Array2;
use std::path::Path;
use tch::{CModule, Device, Kind, Tensor};

use super::postprocess::{decode_predictions, letterbox_image, non_maximum_suppression, Letterbox};
use super::provider::{ClassLabels, Detection, DetectionProvider, ProviderError};
use super::shared_model::SharedModel;
use crate::config::ModelConfig;

/// YOLOv8 detector exported to TorchScript.
pub struct YoloModel {
    model: SharedModel<CModule>,
    device: Device,
    class_labels: ClassLabels,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl YoloModel {
    pub fn load(config: &ModelConfig) -> Result<Self, ProviderError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(&config.path, device)
            .map_err(|e| ProviderError::ModelLoad(e.to_string()))?;
        log::info!(
            "Loaded YOLO model from {} on {:?}",
            config.path.display(),
            device
        );

        Ok(Self {
            model: SharedModel::new(model),
            device,
            class_labels: config.class_labels(),
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
        })
    }

    fn preprocess(&self, image_path: &Path) -> Result<(Tensor, Letterbox), ProviderError> {
        let image = image::open(image_path)
            .map_err(|e| ProviderError::Image(e.to_string()))?
            .to_rgb8();
        let (canvas, letterbox) = letterbox_image(&image, self.input_size);

        let size = i64::from(self.input_size);
        let pixels = Tensor::from_slice(canvas.as_raw())
            .view([size, size, 3])
            .permute([2, 0, 1])
            .to_kind(Kind::Float);
        let tensor = (pixels / 255.0).unsqueeze(0).to_device(self.device);
        Ok((tensor, letterbox))
    }

    fn forward(&self, input: &Tensor) -> Result<Array2<f32>, ProviderError> {
        let output = self
            .model
            .with(|model| tch::no_grad(|| model.forward_ts(&[input])))
            .map_err(|e| ProviderError::Inference(e.to_string()))?;

        let output = output
            .squeeze_dim(0)
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .contiguous();
        let shape = output.size();
        if shape.len() != 2 {
            return Err(ProviderError::Inference(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }

        let data: Vec<f32> = output
            .view([-1])
            .try_into()
            .map_err(|e: tch::TchError| ProviderError::Inference(e.to_string()))?;
        Array2::from_shape_vec((shape[0] as usize, shape[1] as usize), data)
            .map_err(|e| ProviderError::Inference(e.to_string()))
    }
}

impl DetectionProvider for YoloModel {
    fn name(&self) -> &'static str {
        "yolov8-torchscript"
    }

    fn infer(&self, image_path: &Path) -> Result<Vec<Detection>, ProviderError> {
        let (input, letterbox) = self.preprocess(image_path)?;
        let output = self.forward(&input)?;
        let detections = decode_predictions(output.view(), self.confidence_threshold, &letterbox)?;
        Ok(non_maximum_suppression(detections, self.iou_threshold))
    }

    fn class_labels(&self) -> &ClassLabels {
        &self.class_labels
    }
}
