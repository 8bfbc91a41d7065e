//! INI serialization: produces the commented `config.ini`.

use super::file::ConfigFile;
use super::size::format_size;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let cache = &config.pipeline.cache;
    let executor = &config.pipeline.executor;
    let progressive = &config.pipeline.progressive;

    format!(
        r#"[cache]
; Root directory for the disk cache. Partitions live in <directory>/default and <directory>/small
directory = {}
; Decoded image memory cache budget and entry limit
; Supports: KB, MB, GB suffixes (e.g., 64MB, 1GB)
bitmap_memory_size = {}
bitmap_max_entries = {}
; Encoded bytes memory cache budget and entry limit
encoded_memory_size = {}
encoded_max_entries = {}
; Disk budget of the default partition
disk_size = {}
; Disk budget of the small-image partition
small_disk_size = {}

[executor]
; Concurrent network fetches
network_workers = {}
; Concurrent blocking disk operations
disk_io_workers = {}
; Concurrent decodes (default: number of CPUs)
decode_workers = {}
; Concurrent lightweight tasks such as cache lookups and postprocessing
light_workers = {}

[progressive]
; Deliver partial JPEG results while downloading (requests must also opt in)
enabled = {}
; Minimum milliseconds between partial results
throttle_ms = {}
"#,
        cache.directory.to_string_lossy(),
        format_size(cache.bitmap_memory_size as u64),
        cache.bitmap_max_entries,
        format_size(cache.encoded_memory_size as u64),
        cache.encoded_max_entries,
        format_size(cache.disk_size),
        format_size(cache.small_disk_size),
        executor.network_workers,
        executor.disk_io_workers,
        executor.decode_workers,
        executor.light_workers,
        progressive.enabled,
        progressive.throttle_ms,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_section_written() {
        let content = to_config_string(&ConfigFile::default());
        assert!(content.contains("[cache]"));
        assert!(content.contains("[executor]"));
        assert!(content.contains("[progressive]"));
        assert!(content.contains("bitmap_memory_size = 256MB"));
        assert!(content.contains("throttle_ms = 100"));
    }
}
