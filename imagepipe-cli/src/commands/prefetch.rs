//! `prefetch`: warm the caches for a batch of images.

use clap::{Args, ValueEnum};
use futures::future::join_all;
use imagepipe::pipeline::ImagePipeline;
use tracing::warn;

use super::common::RequestArgs;
use crate::error::CliError;

/// Which tier to warm.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PrefetchTarget {
    /// Encoded bytes on disk
    Disk,
    /// Decoded images in memory
    Bitmap,
}

#[derive(Debug, Args)]
pub struct PrefetchArgs {
    /// Image URIs to prefetch
    #[arg(required = true)]
    pub uris: Vec<String>,

    /// Cache tier to fill
    #[arg(long, value_enum, default_value = "disk")]
    pub target: PrefetchTarget,

    #[command(flatten)]
    pub request: RequestArgs,
}

pub async fn run(args: PrefetchArgs, pipeline: &ImagePipeline) -> Result<(), CliError> {
    let mut sources = Vec::with_capacity(args.uris.len());
    for uri in &args.uris {
        let request = args.request.to_request(uri)?;
        let source = match args.target {
            PrefetchTarget::Disk => pipeline.prefetch_to_disk_cache(request, None),
            PrefetchTarget::Bitmap => pipeline.prefetch_to_bitmap_cache(request, None),
        };
        sources.push(source.result());
    }

    println!("Prefetching {} images...", args.uris.len());
    let results = join_all(sources).await;

    let mut failed = 0usize;
    for (uri, result) in args.uris.iter().zip(results) {
        if let Err(error) = result {
            warn!(uri = %uri, %error, "Prefetch failed");
            println!("  FAILED {}: {}", uri, error);
            failed += 1;
        }
    }

    let coalescing = pipeline.coalescing_stats();
    println!(
        "Prefetched {} of {} ({} requests coalesced)",
        args.uris.len() - failed,
        args.uris.len(),
        coalescing.encoded.coalesced_requests + coalescing.decoded.coalesced_requests
    );

    if failed > 0 {
        return Err(CliError::InvalidArgs(format!(
            "{} of {} prefetches failed",
            failed,
            args.uris.len()
        )));
    }
    Ok(())
}
