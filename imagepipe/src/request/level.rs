//! Request levels, cache partitions and priorities.

/// The deepest tier a request is allowed to reach.
///
/// Ordered from the most expensive tier to the cheapest, so a request whose
/// lowest permitted level is `>=` a stage's tier must not pass that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RequestLevel {
    /// Fetch from the source if needed.
    #[default]
    FullFetch = 0,
    /// Read from disk, but do not fetch.
    DiskCache = 1,
    /// Serve from encoded memory only.
    EncodedMemoryCache = 2,
    /// Serve from decoded memory only.
    BitmapMemoryCache = 3,
}

impl RequestLevel {
    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::FullFetch,
            1 => Self::DiskCache,
            2 => Self::EncodedMemoryCache,
            _ => Self::BitmapMemoryCache,
        }
    }

    /// Returns the shallower (more restrictive) of two levels.
    pub fn max_of(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Disk partition a request's encoded bytes live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheChoice {
    #[default]
    Default,
    Small,
}

/// Scheduling priority of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl Priority {
    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Low,
            1 => Self::Normal,
            _ => Self::High,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(RequestLevel::FullFetch < RequestLevel::DiskCache);
        assert!(RequestLevel::DiskCache < RequestLevel::EncodedMemoryCache);
        assert!(RequestLevel::EncodedMemoryCache < RequestLevel::BitmapMemoryCache);
        assert_eq!(
            RequestLevel::DiskCache.max_of(RequestLevel::FullFetch),
            RequestLevel::DiskCache
        );
    }

    #[test]
    fn test_u8_roundtrip() {
        for level in [
            RequestLevel::FullFetch,
            RequestLevel::DiskCache,
            RequestLevel::EncodedMemoryCache,
            RequestLevel::BitmapMemoryCache,
        ] {
            assert_eq!(RequestLevel::from_u8(level.as_u8()), level);
        }
        for priority in [Priority::Low, Priority::Normal, Priority::High] {
            assert_eq!(Priority::from_u8(priority.as_u8()), priority);
        }
    }
}
