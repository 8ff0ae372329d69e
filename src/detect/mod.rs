mod backend;
mod backends;
mod classes;
mod result;

use std::path::Path;

use anyhow::{anyhow, Result};

pub use backend::InferenceAdapter;
pub use backends::{StubAdapter, MAX_DETECTIONS};
#[cfg(feature = "backend-tract")]
pub use backends::TractAdapter;
pub use classes::{ClassNames, CocoClasses, UNKNOWN_CLASS};
pub use result::{BoundingBox, CoordinateSpace, Detection};

/// Fixed model location, relative to the working directory.
pub const MODEL_PATH: &str = "./model/yolov5.onnx";

/// Inference canvas size expected by the model.
pub const MODEL_INPUT_WIDTH: u32 = 640;
pub const MODEL_INPUT_HEIGHT: u32 = 640;

/// Adapter backends selectable from configuration.
pub const KNOWN_BACKENDS: &[&str] = &["stub", "tract"];

/// Load the named adapter, reading the model from `model_path`.
pub fn load_adapter(backend: &str, model_path: &Path) -> Result<Box<dyn InferenceAdapter>> {
    match backend {
        "stub" => Ok(Box::new(StubAdapter::new(
            MODEL_INPUT_WIDTH,
            MODEL_INPUT_HEIGHT,
        ))),
        "tract" => load_tract(model_path),
        other => Err(anyhow!(
            "unknown detection backend '{}'; expected one of {:?}",
            other,
            KNOWN_BACKENDS
        )),
    }
}

#[cfg(feature = "backend-tract")]
fn load_tract(model_path: &Path) -> Result<Box<dyn InferenceAdapter>> {
    Ok(Box::new(TractAdapter::new(
        model_path,
        MODEL_INPUT_WIDTH,
        MODEL_INPUT_HEIGHT,
    )?))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(model_path: &Path) -> Result<Box<dyn InferenceAdapter>> {
    Err(anyhow!(
        "cannot load {}: built without the backend-tract feature",
        model_path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_stub_and_rejects_unknown() {
        let adapter = load_adapter("stub", Path::new(MODEL_PATH)).expect("stub adapter");
        assert_eq!(adapter.name(), "stub");
        assert_eq!(adapter.input_size(), (640, 640));
        assert!(load_adapter("rknn", Path::new(MODEL_PATH)).is_err());
    }

    #[cfg(feature = "backend-tract")]
    #[test]
    fn tract_reports_missing_model() {
        let err = load_adapter("tract", Path::new("./no/such/model.onnx"))
            .err()
            .expect("missing model must fail");
        assert!(format!("{:#}", err).contains("model.onnx"));
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn tract_requires_feature() {
        assert!(load_adapter("tract", Path::new(MODEL_PATH)).is_err());
    }
}
