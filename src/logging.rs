//! Log subscriber setup
//!
//! The library only emits `tracing` events. Binaries and tests call
//! [`init`] once to print them; `RUST_LOG` overrides the default filter.

use tracing_subscriber::EnvFilter;

/// Default directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Install a formatting subscriber filtered by `RUST_LOG`, or `info`.
///
/// Returns `false` if a global subscriber was already installed; calling it
/// more than once is harmless.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

/// Install a formatting subscriber with an explicit filter directive,
/// e.g. `"trueno_pipeline=debug"`.
pub fn init_with_filter(directive: &str) -> bool {
    install(EnvFilter::new(directive))
}

fn install(filter: EnvFilter) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _ = init_with_filter("debug");
        assert!(!init());
        assert!(!init_with_filter("warn"));
    }
}
