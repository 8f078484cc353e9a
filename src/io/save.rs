//! Checkpoint saving

use super::format::CheckpointFormat;
use super::model::Checkpoint;
use crate::{Error, Result};
use safetensors::tensor::{Dtype, TensorView};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Save a checkpoint; the format follows the file extension
///
/// # Example
///
/// ```no_run
/// use posekd::io::{save_checkpoint, Checkpoint, CheckpointMetadata};
/// # use posekd::Tensor;
///
/// let params = vec![("hidden.0.bias".to_string(), Tensor::from_vec(vec![0.0, 1.0], true))];
/// let checkpoint = Checkpoint::new(CheckpointMetadata::new("G", "mlp", "latest"), params);
///
/// save_checkpoint(&checkpoint, "latest_net_G.json").unwrap();
/// ```
pub fn save_checkpoint(checkpoint: &Checkpoint, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let format = CheckpointFormat::from_path(path).ok_or_else(|| {
        Error::Serialization(format!(
            "unsupported checkpoint extension: {}",
            path.display()
        ))
    })?;

    let text = match format {
        CheckpointFormat::SafeTensors => return save_safetensors(checkpoint, path),
        CheckpointFormat::Json => serde_json::to_string_pretty(&checkpoint.to_state())
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?,
        CheckpointFormat::Yaml => serde_yaml::to_string(&checkpoint.to_state())
            .map_err(|e| Error::Serialization(format!("YAML serialization failed: {e}")))?,
    };

    let mut file = File::create(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

fn save_safetensors(checkpoint: &Checkpoint, path: &Path) -> Result<()> {
    let buffers: Vec<(&str, Vec<u8>, Vec<usize>)> = checkpoint
        .parameters
        .iter()
        .map(|(name, tensor)| {
            let values: Vec<f32> = tensor.data().to_vec();
            (
                name.as_str(),
                bytemuck::cast_slice(&values).to_vec(),
                vec![tensor.len()],
            )
        })
        .collect();

    let views = buffers
        .iter()
        .map(|(name, bytes, shape)| {
            TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map(|view| (*name, view))
                .map_err(|e| Error::Serialization(format!("invalid tensor '{name}': {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let meta = &checkpoint.metadata;
    let feature_dims = serde_json::to_string(&meta.feature_dims)
        .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?;
    let mut metadata = HashMap::new();
    metadata.insert("name".to_string(), meta.name.clone());
    metadata.insert("architecture".to_string(), meta.architecture.clone());
    metadata.insert("label".to_string(), meta.label.clone());
    metadata.insert("input_dim".to_string(), meta.input_dim.to_string());
    metadata.insert("feature_dims".to_string(), feature_dims);

    let bytes = safetensors::serialize(views, &Some(metadata))
        .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))?;
    std::fs::write(path, bytes)?;
    Ok(())
}
