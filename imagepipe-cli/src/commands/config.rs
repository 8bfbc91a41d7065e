//! Configuration file management.

use clap::Subcommand;
use imagepipe::config::{config_file_path, format_size, ConfigFile};
use std::path::{Path, PathBuf};

use crate::error::CliError;

/// Config action subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Write a default config file if none exists
    Init,
    /// Print the config file path
    Path,
    /// Print the effective configuration
    Show,
}

/// Run a config subcommand. `path` overrides the default location.
pub fn run(action: ConfigAction, path: Option<&Path>) -> Result<(), CliError> {
    let path: PathBuf = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);

    match action {
        ConfigAction::Init => {
            if path.exists() {
                println!("Config already exists: {}", path.display());
            } else {
                ConfigFile::default().save_to(&path)?;
                println!("Created {}", path.display());
            }
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = ConfigFile::load_from(&path)?;
            let pipeline = &config.pipeline;
            println!("[cache]");
            println!("  directory           {}", pipeline.cache.directory.display());
            println!(
                "  bitmap memory       {} ({} entries)",
                format_size(pipeline.cache.bitmap_memory_size as u64),
                pipeline.cache.bitmap_max_entries
            );
            println!(
                "  encoded memory      {} ({} entries)",
                format_size(pipeline.cache.encoded_memory_size as u64),
                pipeline.cache.encoded_max_entries
            );
            println!("  disk                {}", format_size(pipeline.cache.disk_size));
            println!("  small disk          {}", format_size(pipeline.cache.small_disk_size));
            println!("[executor]");
            println!("  network workers     {}", pipeline.executor.network_workers);
            println!("  disk io workers     {}", pipeline.executor.disk_io_workers);
            println!("  decode workers      {}", pipeline.executor.decode_workers);
            println!("  light workers       {}", pipeline.executor.light_workers);
            println!("[progressive]");
            println!("  enabled             {}", pipeline.progressive.enabled);
            println!("  throttle            {}ms", pipeline.progressive.throttle_ms);
            Ok(())
        }
    }
}
