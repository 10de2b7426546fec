pub mod abstraction;
pub mod config;
pub mod fixed_math;
pub mod maps;

// ============================================================================
// Profiling Macros
// ============================================================================

/// Conditionally log progress every 100 iterations when the perf_stats feature is enabled.
///
/// When the perf_stats feature is disabled, this macro compiles to nothing:
/// even the arguments are not evaluated.
///
/// # Example
/// ```ignore
/// profile_log!(edit_index, "Applied {} edits, {} regions live", edit_index, live);
/// ```
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($count:expr, $($arg:tt)*) => {
        if $count % 100 == 0 {
            tracing::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($count:expr, $($arg:tt)*) => {};
}
