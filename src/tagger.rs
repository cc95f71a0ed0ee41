//! This module provides the `TaggerModel` struct for running ONNX-based image tagging models.
//!
//! It includes functionality for:
//! - Loading models from local paths or Hugging Face repositories.
//! - Selecting execution providers (e.g., CPU, CUDA).
//! - Running predictions on batches of prepared image buffers.
//!
//! The `Inference` trait is the boundary the ingestion pipeline talks to, so the
//! pipeline can be driven by any classifier that honors the batch contract.

use std::path::Path;

use ndarray::{Array, Axis, Ix4};
use ort::{execution_providers::CPUExecutionProvider, session::Session, value::Tensor};
use tracing::info;

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

#[cfg(feature = "tensorrt")]
use ort::execution_providers::TensorRTExecutionProvider;

#[cfg(feature = "coreml")]
use ort::execution_providers::CoreMLExecutionProvider;

use crate::{
    error::{Result, TaggerError},
    file::{ModelSource, TaggerModelFile},
};

/// A multi-label classifier that scores a whole batch in one synchronous call.
///
/// `input` has shape `[batch, height, width, channels]`. The returned vector has
/// exactly one probability vector per input image, in input order, each as long
/// as the label taxonomy.
pub trait Inference {
    fn predict(&mut self, input: Array<f32, Ix4>) -> Result<Vec<Vec<f32>>>;
}

/// Represents the execution device for the ONNX model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    /// Use the CPU for inference.
    Cpu,
    /// Use the CUDA execution provider.
    #[cfg(feature = "cuda")]
    Cuda(i32),
    /// Use the TensorRT execution provider.
    #[cfg(feature = "tensorrt")]
    TensorRT(i32),
    /// Use the CoreML execution provider (for macOS).
    #[cfg(feature = "coreml")]
    CoreML,
}

impl Device {
    /// Creates a list of `Device` instances for CPU execution.
    pub fn cpu() -> Vec<Self> {
        vec![Self::Cpu]
    }

    /// The best device compiled in, always backed by the CPU.
    ///
    /// ONNX Runtime skips a provider that fails to register, so the CPU entry
    /// is what runs on machines without an accelerator.
    pub fn auto() -> Vec<Self> {
        #[allow(unused_mut)]
        let mut devices = Vec::new();
        #[cfg(feature = "tensorrt")]
        devices.push(Self::TensorRT(0));
        #[cfg(feature = "cuda")]
        devices.push(Self::Cuda(0));
        #[cfg(feature = "coreml")]
        devices.push(Self::CoreML);
        devices.push(Self::Cpu);
        devices
    }
}

/// A wrapper around an ONNX Runtime session for image tagging.
#[derive(Debug)]
pub struct TaggerModel {
    session: Session,
    input_name: String,
    output_name: String,
}

impl TaggerModel {
    /// Initializes the ONNX Runtime with a list of execution providers.
    ///
    /// This function should be called once before creating any `TaggerModel` instances.
    pub fn init(devices: Vec<Device>) -> Result<()> {
        let mut providers = Vec::new();
        for device in devices {
            let provider = match device {
                Device::Cpu => CPUExecutionProvider::default().build(),
                #[cfg(feature = "cuda")]
                Device::Cuda(device_id) => CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                #[cfg(feature = "tensorrt")]
                Device::TensorRT(device_id) => TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                #[cfg(feature = "coreml")]
                Device::CoreML => CoreMLExecutionProvider::default().build(),
            };
            providers.push(provider);
        }

        ort::init()
            .with_name("aen")
            .with_execution_providers(providers)
            .commit()
            .map_err(|e| TaggerError::Ort(e.to_string()))?;
        Ok(())
    }

    /// Loads a model from a local file path.
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(threads))
            .and_then(|b| b.commit_from_file(model_path.as_ref()))
            .map_err(|e| TaggerError::Ort(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| TaggerError::Ort("Model has no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| TaggerError::Ort("Model has no outputs".to_string()))?;

        info!("Loaded tagger model from {:?}", model_path.as_ref());
        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }

    /// Loads a model from a Hugging Face repository or a local model directory.
    pub async fn from_source(source: &ModelSource) -> Result<Self> {
        let model_path = TaggerModelFile::new(source).get().await?;
        Self::load(&model_path)
    }
}

impl Inference for TaggerModel {
    fn predict(&mut self, input_tensor: Array<f32, Ix4>) -> Result<Vec<Vec<f32>>> {
        let input_tensor =
            Tensor::from_array(input_tensor).map_err(|e| TaggerError::Ort(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| TaggerError::Ort(e.to_string()))?;

        let preds = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| TaggerError::Ort(e.to_string()))?;

        let preds_vec = preds
            .axis_iter(Axis(0))
            .map(|row| row.iter().copied().collect::<Vec<_>>())
            .collect();

        Ok(preds_vec)
    }
}
