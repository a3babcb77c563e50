//! Thread configuration for the compute pool
//!
//! The forward pass parallelizes over token rows and `(batch, head)` work
//! items on the rayon global pool. By default rayon sizes that pool from
//! the machine's logical CPU count; [`configure_thread_pool`] lets
//! deployments pin it explicitly before the first forward call.

/// Thread pool configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadConfig {
    /// Worker thread count; `None` lets rayon decide
    pub num_threads: Option<usize>,
}

impl ThreadConfig {
    /// Use rayon's default sizing
    #[must_use]
    pub fn auto() -> Self {
        Self { num_threads: None }
    }

    /// Pin an explicit thread count
    #[must_use]
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Thread count the host reports for parallel work
#[must_use]
pub fn optimal_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Configure the rayon global pool from a [`ThreadConfig`]
///
/// Best effort: the global pool can only be built once per process, so a
/// second call (or one after rayon was already used) leaves the existing
/// pool in place and logs at warn level. Returns whether the configuration
/// was applied.
pub fn configure_thread_pool(config: &ThreadConfig) -> bool {
    let num_threads = config.num_threads.unwrap_or_else(optimal_thread_count);

    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        Ok(()) => {
            log::debug!("compute pool configured with {num_threads} threads");
            true
        }
        Err(e) => {
            log::warn!("compute pool already initialized, keeping it: {e}");
            false
        }
    }
}
