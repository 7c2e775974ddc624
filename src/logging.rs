//! Logger setup for binaries and integration harnesses.
//!
//! Library code only emits through the `log` facade with a subsystem prefix
//! (`rescore:`, `thesis_fit:`, `hubspot:`). Hosts that already install a
//! logger never need to call [`init`].

use std::sync::Once;

static INIT: Once = Once::new();

/// Install an env_logger reading `RUST_LOG`, defaulting to `info` for this
/// crate and `warn` elsewhere. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        let result = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("warn,dealscore_lib=info"),
        )
        .format_timestamp_millis()
        .try_init();
        if result.is_err() {
            log::debug!("logging: a global logger was already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
        log::info!("logging: initialized twice without panicking");
    }
}
