use ndarray::Array4;
use std::path::Path;
use std::sync::Arc;

use super::InferenceError;
use crate::config::{ModelBackend, ModelConfig};

/// A frozen image classifier. Implementations take a `(1, 150, 150, 3)`
/// tensor and return the raw output vector of the model.
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;

    fn name(&self) -> &str;
}

pub fn load(config: &ModelConfig) -> Result<Arc<dyn Classifier>, InferenceError> {
    let backend = match config.backend {
        ModelBackend::Auto => backend_for_path(&config.path),
        backend => backend,
    };
    log::info!(
        "Loading {:?} model from {}",
        backend,
        config.path.display()
    );

    match backend {
        #[cfg(feature = "onnx")]
        ModelBackend::Onnx => Ok(Arc::new(onnx::OnnxClassifier::load(&config.path)?)),
        #[cfg(feature = "torch")]
        ModelBackend::Torch => Ok(Arc::new(torch::TorchClassifier::load(&config.path)?)),
        other => Err(InferenceError::Load {
            path: config.path.display().to_string(),
            reason: format!("{:?} backend is not compiled into this binary", other),
        }),
    }
}

fn backend_for_path(path: &Path) -> ModelBackend {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("pt") | Some("pth") => ModelBackend::Torch,
        _ => ModelBackend::Onnx,
    }
}

#[cfg(feature = "onnx")]
pub mod onnx {
    use super::*;
    use crate::inference::preprocess::{CHANNELS, IMAGE_SIZE};
    use tract_onnx::prelude::*;

    type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

    pub struct OnnxClassifier {
        plan: Plan,
        name: String,
    }

    fn input_shape() -> [usize; 4] {
        let side = IMAGE_SIZE as usize;
        [1, side, side, CHANNELS]
    }

    impl OnnxClassifier {
        pub fn load(path: &Path) -> Result<Self, InferenceError> {
            let model = tract_onnx::onnx()
                .model_for_path(path)
                .map_err(|e| InferenceError::Load {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            Self::from_model(model, path.display().to_string())
        }

        /// Pins the input to a single NHWC image and compiles the graph.
        pub fn from_model(model: InferenceModel, name: String) -> Result<Self, InferenceError> {
            let plan = model
                .with_input_fact(0, f32::fact(input_shape()).into())
                .and_then(|model| model.into_optimized())
                .and_then(|model| model.into_runnable())
                .map_err(|e| InferenceError::Load {
                    path: name.clone(),
                    reason: e.to_string(),
                })?;

            Ok(Self { plan, name })
        }
    }

    impl Classifier for OnnxClassifier {
        fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            let data: Vec<f32> = input.iter().copied().collect();
            let tensor = Tensor::from_shape(input.shape(), &data)
                .map_err(|e| InferenceError::Model(e.to_string()))?;
            let outputs = self
                .plan
                .run(tvec!(tensor.into()))
                .map_err(|e| InferenceError::Model(e.to_string()))?;
            let output = outputs
                .first()
                .ok_or_else(|| InferenceError::InvalidOutput("model produced no outputs".into()))?;
            let view = output
                .to_array_view::<f32>()
                .map_err(|e| InferenceError::Model(e.to_string()))?;
            Ok(view.iter().copied().collect())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

#[cfg(feature = "torch")]
pub mod torch {
    use super::*;
    use std::sync::Mutex;
    use tch::{CModule, Device, Kind, Tensor};

    /// TorchScript classifier pinned to the CPU. libtorch modules are not
    /// safe for concurrent forward passes, so calls are serialized.
    pub struct TorchClassifier {
        model: Mutex<CModule>,
        name: String,
    }

    impl TorchClassifier {
        pub fn load(path: &Path) -> Result<Self, InferenceError> {
            let mut model = CModule::load_on_device(path, Device::Cpu).map_err(|e| {
                InferenceError::Load {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?;
            model.set_eval();
            Ok(Self {
                model: Mutex::new(model),
                name: path.display().to_string(),
            })
        }
    }

    impl Classifier for TorchClassifier {
        fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
            let data: Vec<f32> = input.iter().copied().collect();
            let tensor = Tensor::from_slice(&data).view(shape.as_slice());

            let model = self
                .model
                .lock()
                .map_err(|_| InferenceError::Model("model lock poisoned".into()))?;
            let output = tch::no_grad(|| model.forward_ts(&[tensor]))?;

            let output_flat = output.to_kind(Kind::Float).view([-1]);
            let num_elements = output_flat.size()[0] as usize;
            let mut output_vec = vec![0.0f32; num_elements];
            output_flat.copy_data(&mut output_vec, num_elements);
            Ok(output_vec)
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}
