//! Guaranteed release of engine handles.

use tracing::{debug, warn};

use super::{Close, EngineError};

/// Owns an engine handle and makes sure it is closed exactly once.
///
/// The normal path is an explicit [`CloseGuard::close`] so the caller can
/// observe the result. If the guard is dropped while still holding the handle
/// (early return, panic, or the owning future being cancelled), the close is
/// handed to the current tokio runtime instead.
pub struct CloseGuard<T: ?Sized + Close + 'static> {
  inner: Option<Box<T>>,
  what: &'static str,
}

impl<T: ?Sized + Close + 'static> CloseGuard<T> {
  pub fn new(inner: Box<T>, what: &'static str) -> Self {
    Self {
      inner: Some(inner),
      what,
    }
  }

  /// Borrows the handle. `None` only after the guard has been closed.
  pub fn get_mut(&mut self) -> Option<&mut T> {
    self.inner.as_deref_mut()
  }

  pub fn is_open(&self) -> bool {
    self.inner.is_some()
  }

  /// Closes the handle now. Subsequent calls are no-ops.
  pub async fn close(&mut self) -> Result<(), EngineError> {
    match self.inner.take() {
      Some(mut inner) => {
        debug!(handle = self.what, "closing");
        inner.close().await
      }
      None => Ok(()),
    }
  }
}

impl<T: ?Sized + Close + 'static> Drop for CloseGuard<T> {
  fn drop(&mut self) {
    let Some(mut inner) = self.inner.take() else {
      return;
    };
    let what = self.what;

    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        debug!(handle = what, "dropped while open, closing in background");
        handle.spawn(async move {
          if let Err(e) = inner.close().await {
            warn!(handle = what, error = %e, "failed to close dropped handle");
          }
        });
      }
      Err(_) => {
        warn!(handle = what, "dropped outside of a runtime, handle was not closed");
      }
    }
  }
}
