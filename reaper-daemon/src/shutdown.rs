//! Shutdown signal shared between the monitor loop and its stop triggers.
//!
//! The loop only ever reads the signal; Ctrl-C, SIGTERM and the operator
//! quit key are the writers and live in this module too.

use std::io::{BufRead, IsTerminal};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Result of an interruptible wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration elapsed
    Expired,

    /// The signal fired before the duration elapsed
    Signalled,
}

/// Single-use stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Create an unset signal
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Set the signal. Returns true only for the call that actually set it.
    pub fn set(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Check whether the signal has been set
    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Sleep for `duration`, waking early if the signal is set
    pub async fn wait_or_set(&self, duration: Duration) -> WaitOutcome {
        tokio::select! {
            biased;

            _ = self.token.cancelled() => WaitOutcome::Signalled,
            _ = tokio::time::sleep(duration) => WaitOutcome::Expired,
        }
    }

    /// Wait until the signal is set
    #[cfg(any(test, not(unix)))]
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}

/// Set the signal on Ctrl-C
pub async fn listen_for_interrupt(signal: ShutdownSignal) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
        return;
    }
    info!("Received interrupt signal");
    signal.set();
}

/// Set the signal on SIGTERM (host stop)
#[cfg(unix)]
pub async fn listen_for_terminate(signal: ShutdownSignal) {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut term = match unix_signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!("Failed to listen for SIGTERM: {}", e);
            return;
        }
    };
    if term.recv().await.is_some() {
        info!("Received terminate signal");
        signal.set();
    }
}

#[cfg(not(unix))]
pub async fn listen_for_terminate(signal: ShutdownSignal) {
    signal.wait().await;
}

/// How the operator stops the monitor from the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitKey {
    /// Interactive terminal: a line containing only `q`
    Q,

    /// Redirected input: any line
    Enter,
}

impl QuitKey {
    /// Pick the quit key for the current stdin
    pub fn detect() -> Self {
        if std::io::stdin().is_terminal() {
            QuitKey::Q
        } else {
            QuitKey::Enter
        }
    }

    /// Prompt shown to the operator
    pub fn prompt(&self) -> &'static str {
        match self {
            QuitKey::Q => "Press Q then Enter to stop monitoring...",
            QuitKey::Enter => "Input is redirected. Press Enter to stop monitoring...",
        }
    }

    /// Whether an input line should stop the monitor
    pub fn matches(&self, line: &str) -> bool {
        match self {
            QuitKey::Q => line.trim().eq_ignore_ascii_case("q"),
            QuitKey::Enter => true,
        }
    }
}

/// Set the signal when the operator enters the quit key on stdin.
///
/// Runs on its own thread: a blocking stdin read cannot be cancelled, and the
/// thread must not hold up runtime shutdown. EOF disables the trigger; it does
/// not stop the monitor.
pub fn spawn_quit_key_listener(signal: ShutdownSignal, key: QuitKey) -> std::io::Result<()> {
    println!("{}", key.prompt());

    std::thread::Builder::new()
        .name("quit-key".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if key.matches(&line) => {
                        info!("Stop requested from console");
                        signal.set();
                        return;
                    }
                    Ok(_) if signal.is_set() => return,
                    Ok(_) => continue,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        return;
                    }
                }
            }
            debug!("stdin closed, console stop key disabled");
        })?;
    Ok(())
}
