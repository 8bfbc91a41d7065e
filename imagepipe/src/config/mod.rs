//! Pipeline configuration.
//!
//! [`PipelineConfig`] is what the pipeline is built from. [`ConfigFile`]
//! persists it as INI at `~/.imagepipe/config.ini`:
//!
//! ```text
//! [cache]
//! directory = ~/.cache/imagepipe
//! bitmap_memory_size = 256MB
//! disk_size = 512MB
//!
//! [executor]
//! network_workers = 3
//!
//! [progressive]
//! enabled = true
//! throttle_ms = 100
//! ```

mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFile, ConfigFileError};
pub use settings::{PipelineConfig, ProgressiveConfig, DEFAULT_PROGRESSIVE_THROTTLE_MS};
pub use size::{format_size, parse_size, SizeParseError};
