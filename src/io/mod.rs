//! Checkpoint I/O
//!
//! Networks are stored as named flat parameter lists plus metadata. The format
//! is picked from the file extension: JSON and YAML for inspection, SafeTensors
//! for compact binary dumps.

mod format;
mod load;
mod model;
mod network;
mod save;

pub use format::CheckpointFormat;
pub use load::load_checkpoint;
pub use model::{Checkpoint, CheckpointMetadata, CheckpointState, ParameterInfo};
pub use network::{load_network, network_filename, save_network};
pub use save::save_checkpoint;
