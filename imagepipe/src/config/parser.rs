//! INI parsing: the single place where INI key names map to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::{ConfigFile, ConfigFileError};
use super::size::parse_size;

const SIZE_HINT: &str = "expected a byte count or a size like '512MB' or '2GB'";

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();
    let pipeline = &mut config.pipeline;

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                pipeline.cache.directory = expand_tilde(v);
            }
        }
        if let Some(v) = memory_size(section, "cache", "bitmap_memory_size")? {
            pipeline.cache.bitmap_memory_size = v;
        }
        if let Some(v) = count(section, "cache", "bitmap_max_entries")? {
            pipeline.cache.bitmap_max_entries = v;
        }
        if let Some(v) = memory_size(section, "cache", "encoded_memory_size")? {
            pipeline.cache.encoded_memory_size = v;
        }
        if let Some(v) = count(section, "cache", "encoded_max_entries")? {
            pipeline.cache.encoded_max_entries = v;
        }
        if let Some(v) = size(section, "cache", "disk_size")? {
            pipeline.cache.disk_size = v;
        }
        if let Some(v) = size(section, "cache", "small_disk_size")? {
            pipeline.cache.small_disk_size = v;
        }
    }

    // [executor] section
    if let Some(section) = ini.section(Some("executor")) {
        if let Some(v) = count(section, "executor", "network_workers")? {
            pipeline.executor.network_workers = v;
        }
        if let Some(v) = count(section, "executor", "disk_io_workers")? {
            pipeline.executor.disk_io_workers = v;
        }
        if let Some(v) = count(section, "executor", "decode_workers")? {
            pipeline.executor.decode_workers = v;
        }
        if let Some(v) = count(section, "executor", "light_workers")? {
            pipeline.executor.light_workers = v;
        }
    }

    // [progressive] section
    if let Some(section) = ini.section(Some("progressive")) {
        if let Some(v) = section.get("enabled") {
            pipeline.progressive.enabled = parse_bool(v).ok_or_else(|| {
                invalid("progressive", "enabled", v, "must be 'true' or 'false'")
            })?;
        }
        if let Some(v) = section.get("throttle_ms") {
            pipeline.progressive.throttle_ms = u64::from_str(v.trim()).map_err(|_| {
                invalid("progressive", "throttle_ms", v, "must be a non-negative integer")
            })?;
        }
    }

    Ok(config)
}

fn size(section: &Properties, name: &str, key: &str) -> Result<Option<u64>, ConfigFileError> {
    section
        .get(key)
        .map(|v| parse_size(v).map_err(|_| invalid(name, key, v, SIZE_HINT)))
        .transpose()
}

/// In-memory budgets must also fit the address space.
fn memory_size(
    section: &Properties,
    name: &str,
    key: &str,
) -> Result<Option<usize>, ConfigFileError> {
    size(section, name, key)?
        .map(|bytes| {
            usize::try_from(bytes).map_err(|_| {
                let value = section.get(key).unwrap_or_default();
                invalid(name, key, value, "too large for this platform's memory")
            })
        })
        .transpose()
}

/// Worker and entry counts must be at least 1.
fn count(section: &Properties, name: &str, key: &str) -> Result<Option<usize>, ConfigFileError> {
    section
        .get(key)
        .map(|v| match usize::from_str(v.trim()) {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(invalid(name, key, v, "must be a positive integer")),
        })
        .transpose()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
        None => PathBuf::from(path),
    }
}
