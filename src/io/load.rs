//! Checkpoint loading

use super::format::CheckpointFormat;
use super::model::{Checkpoint, CheckpointMetadata, CheckpointState};
use crate::{Error, Result, Tensor};
use std::path::Path;

/// Load a checkpoint; the format follows the file extension
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = path.as_ref();
    let format = CheckpointFormat::from_path(path).ok_or_else(|| {
        Error::Serialization(format!(
            "unsupported checkpoint extension: {}",
            path.display()
        ))
    })?;

    let state: CheckpointState = match format {
        CheckpointFormat::SafeTensors => return load_safetensors(path),
        CheckpointFormat::Json => serde_json::from_str(&std::fs::read_to_string(path)?)
            .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?,
        CheckpointFormat::Yaml => serde_yaml::from_str(&std::fs::read_to_string(path)?)
            .map_err(|e| Error::Serialization(format!("YAML deserialization failed: {e}")))?,
    };

    Checkpoint::from_state(state)
}

fn load_safetensors(path: &Path) -> Result<Checkpoint> {
    let data = std::fs::read(path)?;

    let (_, header) = safetensors::SafeTensors::read_metadata(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;
    let custom = header.metadata().clone().unwrap_or_default();
    let field = |key: &str| custom.get(key).cloned().unwrap_or_else(|| "unknown".to_string());

    let mut metadata = CheckpointMetadata::new(field("name"), field("architecture"), field("label"));
    if let Some(dim) = custom.get("input_dim") {
        metadata.input_dim = dim
            .parse()
            .map_err(|e| Error::Checkpoint(format!("invalid input_dim '{dim}': {e}")))?;
    }
    if let Some(dims) = custom.get("feature_dims") {
        metadata.feature_dims = serde_json::from_str(dims)
            .map_err(|e| Error::Checkpoint(format!("invalid feature_dims '{dims}': {e}")))?;
    }

    let tensors = safetensors::SafeTensors::deserialize(&data)
        .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

    let parameters = tensors
        .names()
        .into_iter()
        .map(|name| {
            let view = tensors
                .tensor(name)
                .map_err(|e| Error::Serialization(format!("tensor '{name}': {e}")))?;
            if view.dtype() != safetensors::tensor::Dtype::F32 {
                return Err(Error::Checkpoint(format!(
                    "tensor '{name}' has dtype {:?}, expected F32",
                    view.dtype()
                )));
            }
            // Byte-wise decode: the tensor slice is not guaranteed to be f32-aligned
            let values: Vec<f32> = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Ok((name.to_string(), Tensor::from_vec(values, false)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Checkpoint::new(metadata, parameters))
}
