use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::debug;

/// Shared stop flag checked by a running session.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    /// Sets the token when the process receives SIGINT or SIGTERM. A second
    /// signal while the token is already set exits with `exit_code`.
    pub fn install_signal_handlers(&self, exit_code: i32) -> io::Result<()> {
        for signal in [SIGINT, SIGTERM] {
            // Must be registered before the flag so it sees the previous value.
            signal_hook::flag::register_conditional_shutdown(signal, exit_code, Arc::clone(&self.flag))?;
            signal_hook::flag::register(signal, Arc::clone(&self.flag))?;
            debug!(signal, "registered cancellation signal");
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
