//! `fetch`: run one request through the pipeline.

use clap::Args;
use imagepipe::artifact::{DecodedImage, EncodedImage};
use imagepipe::config::format_size;
use imagepipe::pipeline::{ImagePipeline, PipelineEvent};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::common::RequestArgs;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Image URI: http(s) URL, file URL, path, or data URI
    pub uri: String,

    /// Write the result here (PNG for decoded images, raw bytes with --encoded)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Stop after fetching; do not decode
    #[arg(long)]
    pub encoded: bool,

    /// Report partial results of progressive JPEGs
    #[arg(long)]
    pub progressive: bool,

    #[command(flatten)]
    pub request: RequestArgs,
}

pub async fn run(args: FetchArgs, pipeline: &ImagePipeline) -> Result<(), CliError> {
    let request = args
        .request
        .to_request(&args.uri)?
        .with_progressive_rendering(args.progressive);

    println!("Fetching: {}", args.uri);

    if args.encoded {
        let image = pipeline
            .fetch_encoded_image(request, None)
            .result()
            .await
            .map_err(|error| CliError::Request {
                uri: args.uri.clone(),
                error,
            })?
            .ok_or_else(|| CliError::NotFound {
                uri: args.uri.clone(),
            })?;
        report_encoded(&image);
        if let Some(path) = &args.output {
            write_encoded(&image, path)?;
            println!("  Saved: {}", path.display());
        }
        return Ok(());
    }

    let mut source = pipeline.fetch_decoded_image(request, None);
    let mut intermediates = 0usize;
    let mut final_image = None;

    while let Some(event) = source.next_event().await {
        match event {
            PipelineEvent::Progress(progress) => {
                print!("\r  Progress: {:>3.0}%", progress * 100.0);
                let _ = io::stdout().flush();
            }
            PipelineEvent::Intermediate(_) => intermediates += 1,
            PipelineEvent::Final(image) => final_image = image,
            PipelineEvent::Failure(error) => {
                println!();
                return Err(CliError::Request {
                    uri: args.uri.clone(),
                    error,
                });
            }
            PipelineEvent::Cancelled => {
                println!();
                return Err(CliError::Request {
                    uri: args.uri.clone(),
                    error: imagepipe::PipelineError::Cancelled,
                });
            }
        }
    }
    println!();

    let handle = final_image.ok_or_else(|| CliError::NotFound {
        uri: args.uri.clone(),
    })?;
    let image = handle.get().ok_or_else(|| CliError::Request {
        uri: args.uri.clone(),
        error: imagepipe::resource::ResourceError::AlreadyClosed.into(),
    })?;

    report_decoded(image, intermediates);
    if let Some(path) = &args.output {
        write_decoded(image, path)?;
        println!("  Saved: {}", path.display());
    }
    Ok(())
}

fn report_encoded(image: &EncodedImage) {
    println!("  Format: {:?}", image.format());
    println!("  Size:   {}", format_size(image.size() as u64));
    if let Some((width, height)) = image.dimensions() {
        println!("  Dimensions: {}x{}", width, height);
    }
}

fn report_decoded(image: &DecodedImage, intermediates: usize) {
    println!("  Format:     {:?}", image.format());
    println!("  Dimensions: {}x{}", image.width(), image.height());
    println!("  Rotation:   {} degrees", image.rotation_angle());
    println!("  Memory:     {}", format_size(image.size_in_bytes() as u64));
    if intermediates > 0 {
        println!("  Partial results: {}", intermediates);
    }
}

fn write_encoded(image: &EncodedImage, path: &Path) -> Result<(), CliError> {
    let bytes = image.bytes().ok_or_else(|| CliError::FileWrite {
        path: path.to_path_buf(),
        message: "image buffer already released".to_string(),
    })?;
    fs::write(path, bytes).map_err(|e| CliError::FileWrite {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn write_decoded(image: &DecodedImage, path: &Path) -> Result<(), CliError> {
    image
        .pixels()
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| CliError::FileWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}
