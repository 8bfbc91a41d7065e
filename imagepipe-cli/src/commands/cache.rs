//! Cache management CLI commands.

use clap::Subcommand;
use imagepipe::pipeline::ImagePipeline;
use imagepipe::request::{CacheChoice, ImageRequest};

use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show per-tier cache statistics
    Stats,
    /// Clear every cache tier, including both disk partitions
    Clear,
    /// Remove one image from every tier
    Evict {
        /// Image URI
        uri: String,
        /// The image was cached in the small-image partition
        #[arg(long)]
        small: bool,
    },
}

/// Run a cache subcommand.
pub async fn run(action: CacheAction, pipeline: &ImagePipeline) -> Result<(), CliError> {
    let directory = &pipeline.config().cache.directory;

    match action {
        CacheAction::Stats => {
            println!("Cache directory: {}", directory.display());
            println!();
            print!("{}", pipeline.cache_stats().format());
            Ok(())
        }
        CacheAction::Clear => {
            println!("Clearing caches at: {}", directory.display());
            pipeline.clear_caches().await?;
            println!("Done");
            Ok(())
        }
        CacheAction::Evict { uri, small } => {
            let mut request = ImageRequest::new(uri.as_str());
            if small {
                request = request.with_cache_choice(CacheChoice::Small);
            }
            let on_disk = pipeline.is_in_disk_cache(&request);
            pipeline.evict_from_cache(&request).await?;
            if on_disk {
                println!("Evicted {}", uri);
            } else {
                println!("{} was not in the disk cache", uri);
            }
            Ok(())
        }
    }
}
