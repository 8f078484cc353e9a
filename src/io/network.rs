//! Network-level checkpoint helpers

use super::format::CheckpointFormat;
use super::load::load_checkpoint;
use super::model::{Checkpoint, CheckpointMetadata};
use super::save::save_checkpoint;
use crate::network::PoseNetwork;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of a network checkpoint: `{label}_net_{name}.{ext}`
pub fn network_filename(label: &str, name: &str, format: CheckpointFormat) -> String {
    format!("{label}_net_{name}.{}", format.extension())
}

/// Write every parameter of `net` to `dir`, creating the directory if needed
///
/// Returns the path written.
pub fn save_network(
    net: &dyn PoseNetwork,
    dir: impl AsRef<Path>,
    label: &str,
    name: &str,
    format: CheckpointFormat,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(network_filename(label, name, format));

    let mut metadata = CheckpointMetadata::new(name, net.name(), label);
    metadata.input_dim = net.input_dim();
    metadata.feature_dims = net.feature_dims();

    save_checkpoint(&Checkpoint::new(metadata, net.named_parameters()), &path)?;
    info!(path = %path.display(), label, "saved network checkpoint");
    Ok(path)
}

/// Restore `net` from a checkpoint written by [`save_network`]
///
/// The architecture and input width recorded in the checkpoint must match the
/// network; parameters are matched by name and size.
pub fn load_network(net: &mut dyn PoseNetwork, path: impl AsRef<Path>) -> Result<CheckpointMetadata> {
    let path = path.as_ref();
    let checkpoint = load_checkpoint(path)?;
    let meta = &checkpoint.metadata;

    if meta.architecture != "unknown" && meta.architecture != net.name() {
        return Err(Error::Checkpoint(format!(
            "{} holds a '{}' network, expected '{}'",
            path.display(),
            meta.architecture,
            net.name()
        )));
    }
    if meta.input_dim != 0 && meta.input_dim != net.input_dim() {
        return Err(Error::ShapeMismatch {
            expected: vec![net.input_dim()],
            got: vec![meta.input_dim],
        });
    }

    net.load_named(&checkpoint.parameters)?;
    info!(path = %path.display(), "loaded network checkpoint");
    Ok(checkpoint.metadata)
}
