//! Collector configuration.

/// Tunables accepted by [`crate::GarbageCollector::start_ext`].
///
/// Defaults (used by [`crate::GarbageCollector::start`]):
/// `initial_capacity = min_capacity = 1024`, `downsize_load_factor = 0.2`,
/// `upsize_load_factor = 0.8`, `sweep_factor = 0.5`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcConfig {
    /// Floor on the registry's starting bucket count (rounded up to prime).
    pub initial_capacity: u64,
    /// Floor below which the registry is never downsized (rounded up to
    /// prime; `capacity >= min_capacity` always holds).
    pub min_capacity: u64,
    /// Load factor below which a removal-triggered rehash shrinks the
    /// table.
    pub downsize_load_factor: f64,
    /// Load factor above which an insertion-triggered rehash grows the
    /// table.
    pub upsize_load_factor: f64,
    /// Fraction of `capacity` at which `size` triggers an allocator-site
    /// collection.
    pub sweep_factor: f64,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            initial_capacity: 1024,
            min_capacity: 1024,
            downsize_load_factor: 0.2,
            upsize_load_factor: 0.8,
            sweep_factor: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference() {
        let config = GcConfig::default();
        assert_eq!(config.initial_capacity, 1024);
        assert_eq!(config.min_capacity, 1024);
        assert_eq!(config.downsize_load_factor, 0.2);
        assert_eq!(config.upsize_load_factor, 0.8);
        assert_eq!(config.sweep_factor, 0.5);
    }
}
