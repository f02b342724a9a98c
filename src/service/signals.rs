//! SIGINT/SIGTERM handling.

use tracing::{info, warn};

use crate::domain::CancelToken;

/// Cancel `shutdown` on SIGINT or SIGTERM.
///
/// The handler only flips the flag; the supervisor does all teardown work
/// after observing it. Further signals are logged and ignored.
pub fn install_signal_handler(shutdown: &CancelToken) -> Result<(), ctrlc::Error> {
    let token = shutdown.clone();
    ctrlc::set_handler(move || {
        if token.cancel() {
            info!("Shutdown signal received");
        } else {
            warn!("Shutdown already in progress, signal ignored");
        }
    })
}
