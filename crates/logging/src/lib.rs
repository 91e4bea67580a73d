use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[doc(hidden)]
pub use tracing;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info") // fallback log level
    });

    // may be called more than once
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
                .with_target(false)
                .with_level(true)
                .with_thread_names(false)
                .with_line_number(false)
                .with_file(false)
                .compact(),
        )
        .with(filter)
        .try_init();
}

/// Evaluate a block and log how long it took under the given label.
///
/// ```ignore
/// let rows = timeit!(format!("Transferred {}", name), {
///     transfer(&unit).await?
/// });
/// ```
#[macro_export]
macro_rules! timeit {
    ($label:expr, $body:block) => {{
        let __timeit_start = ::std::time::Instant::now();
        let __timeit_result = $body;
        $crate::tracing::info!("{} in {:.2?}", $label, __timeit_start.elapsed());
        __timeit_result
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn timeit_returns_block_value() {
        let value = timeit!("Computed answer", { 40 + 2 });
        assert_eq!(value, 42);
    }

    #[test]
    fn init_logger_is_idempotent() {
        super::init_logger();
        super::init_logger();
    }
}
