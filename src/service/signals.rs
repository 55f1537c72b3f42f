use futures::stream::StreamExt;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Exit status used when a second signal interrupts a running cycle
const FORCED_EXIT_CODE: i32 = 130;

/// Translates process signals into the shutdown channel.
///
/// The first SIGTERM, SIGINT or SIGQUIT requests a graceful shutdown; a second
/// one exits immediately. SIGHUP is logged and ignored.
pub struct SignalHandler {
    signals: Signals,
    handle: Handle,
}

impl SignalHandler {
    /// Register the signal handlers
    pub fn new() -> crate::Result<Self> {
        let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|e| crate::Error::Service(format!("Failed to register signals: {e}")))?;
        let handle = signals.handle();

        Ok(Self { signals, handle })
    }

    /// Handle that stops signal delivery when closed
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Spawn the task forwarding signals to `shutdown_tx`
    #[instrument(skip_all)]
    pub fn spawn(self, shutdown_tx: watch::Sender<bool>) -> JoinHandle<()> {
        let mut signals = self.signals;

        tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                match signal {
                    SIGTERM | SIGINT | SIGQUIT => {
                        if *shutdown_tx.borrow() {
                            warn!(
                                "Received {} during shutdown - exiting immediately",
                                signal_name(signal)
                            );
                            std::process::exit(FORCED_EXIT_CODE);
                        }
                        info!(
                            "Received {} - finishing current work and shutting down",
                            signal_name(signal)
                        );
                        shutdown_tx.send_replace(true);
                    }
                    SIGHUP => {
                        info!("Received SIGHUP - configuration is read at startup, restart to apply changes");
                    }
                    _ => {
                        warn!("Received unexpected signal: {}", signal);
                    }
                }
            }

            info!("Signal handler task exiting");
        })
    }
}

fn signal_name(signal: i32) -> &'static str {
    match signal {
        SIGTERM => "SIGTERM",
        SIGINT => "SIGINT",
        SIGQUIT => "SIGQUIT",
        SIGHUP => "SIGHUP",
        _ => "signal",
    }
}

impl std::fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHandler")
            .field("signals_registered", &!self.handle.is_closed())
            .finish()
    }
}
