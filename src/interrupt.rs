// src/interrupt.rs

//! Cooperative interrupt flag.
//!
//! The token is polled, never pre-empting: a hook that is already running
//! always runs to completion, and the lifecycle checks the flag only at phase
//! boundaries (after init, after execute, after finalize, and before a run
//! starts).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, warn};

/// Shared, clonable interrupt flag.
///
/// Clones observe the same underlying flag, so the token handed to a signal
/// handler and the one held by the controller stay in sync.
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    flag: Arc<AtomicBool>,
}

impl InterruptToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is already interrupted (handy for deterministic tests).
    pub fn interrupted() -> Self {
        let token = Self::new();
        token.interrupt();
        token
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Spawn a background task that sets `token` when Ctrl-C is received.
///
/// Must be called from within a Tokio runtime.
pub fn install_ctrl_c_handler(token: InterruptToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        warn!("SIGINT (^C) received; remaining work will stop at the next phase boundary");
        token.interrupt();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = InterruptToken::new();
        let other = token.clone();
        assert!(!other.is_interrupted());

        token.interrupt();
        assert!(other.is_interrupted());

        other.reset();
        assert!(!token.is_interrupted());
    }

    #[test]
    fn pre_set_token_starts_interrupted() {
        assert!(InterruptToken::interrupted().is_interrupted());
    }
}
