//! Types and helpers shared across CLI commands.

use clap::{Args, ValueEnum};
use imagepipe::config::ConfigFile;
use imagepipe::pipeline::ImagePipeline;
use imagepipe::request::{CacheChoice, ImageRequest, Priority, RequestLevel, ResizeOptions};
use std::path::Path;
use std::time::Duration;

use crate::error::CliError;

/// How long to wait for staged disk writes before exiting.
pub const DISK_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Deepest tier a request may reach, for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LevelArg {
    /// Fetch from the source when nothing is cached
    Full,
    /// Stop at the disk cache
    Disk,
    /// Stop at the encoded memory cache
    Encoded,
    /// Stop at the decoded memory cache
    Bitmap,
}

impl From<LevelArg> for RequestLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Full => RequestLevel::FullFetch,
            LevelArg::Disk => RequestLevel::DiskCache,
            LevelArg::Encoded => RequestLevel::EncodedMemoryCache,
            LevelArg::Bitmap => RequestLevel::BitmapMemoryCache,
        }
    }
}

/// Request priority for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PriorityArg {
    Low,
    Normal,
    High,
}

impl From<PriorityArg> for Priority {
    fn from(priority: PriorityArg) -> Self {
        match priority {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
        }
    }
}

/// Request options shared by `fetch` and `prefetch`.
#[derive(Debug, Clone, Args)]
pub struct RequestArgs {
    /// Downscale to fit this width (requires --height)
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Downscale to fit this height (requires --width)
    #[arg(long, requires = "width")]
    pub height: Option<u32>,

    /// Store in the small-image disk partition
    #[arg(long)]
    pub small: bool,

    /// Deepest tier the request may reach
    #[arg(long, value_enum, default_value = "full")]
    pub level: LevelArg,

    /// Request priority
    #[arg(long, value_enum, default_value = "normal")]
    pub priority: PriorityArg,

    /// Bypass the disk cache entirely
    #[arg(long)]
    pub no_disk_cache: bool,
}

impl RequestArgs {
    /// Build the request for `uri` from these options.
    pub fn to_request(&self, uri: &str) -> Result<ImageRequest, CliError> {
        let mut request = ImageRequest::new(uri)
            .with_lowest_permitted_level(self.level.into())
            .with_priority(self.priority.into())
            .with_disk_cache_enabled(!self.no_disk_cache);

        if self.small {
            request = request.with_cache_choice(CacheChoice::Small);
        }

        match (self.width, self.height) {
            (Some(0), _) | (_, Some(0)) => {
                return Err(CliError::InvalidArgs(
                    "--width and --height must be greater than zero".to_string(),
                ))
            }
            (Some(width), Some(height)) => {
                request = request.with_resize(ResizeOptions::new(width, height));
            }
            _ => {}
        }

        Ok(request)
    }
}

/// Load the config file, from `path` if given.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Build a pipeline from the loaded configuration.
pub fn build_pipeline(config: ConfigFile) -> Result<ImagePipeline, CliError> {
    Ok(ImagePipeline::builder(config.pipeline).build()?)
}

/// Wait for staged disk writes so cached bytes survive process exit.
pub async fn finish(pipeline: &ImagePipeline) {
    pipeline.flush_disk_writes(DISK_FLUSH_TIMEOUT).await;
    pipeline.log_stats();
    pipeline.shutdown();
}
