//! Termination signal handling for watch mode.

use std::future::Future;

use rolldown_lib::watch::ShutdownTrigger;
use tracing::{debug, warn};

/// Exit code used when a second signal interrupts a shutdown in progress.
const FORCED_EXIT_CODE: i32 = 130;

/// Spawns a task that requests a clean shutdown (exit code 0) on Ctrl-C or SIGTERM.
///
/// A second signal exits the process immediately, without waiting for the
/// watcher to finish closing.
pub fn forward_termination(trigger: ShutdownTrigger) {
  tokio::spawn(escalate(
    terminated,
    move || trigger.request(None),
    || {
      std::process::exit(FORCED_EXIT_CODE);
    },
  ));
}

async fn escalate<S, F>(mut next_signal: S, graceful: impl FnOnce(), forced: impl FnOnce())
where
  S: FnMut() -> F,
  F: Future<Output = ()>,
{
  next_signal().await;
  debug!("termination signal received");
  graceful();

  next_signal().await;
  warn!("second termination signal, exiting without closing the watcher");
  forced();
}

async fn terminated() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      warn!(error = %e, "failed to listen for Ctrl-C");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let term = async {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
      Ok(mut stream) => {
        stream.recv().await;
      }
      Err(e) => {
        warn!(error = %e, "failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let term = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {}
    _ = term => {}
  }
}
