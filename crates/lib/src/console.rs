//! User-facing message sink.
//!
//! Progress lines such as "Rebuilt ... in ..." are meant for the person at the
//! terminal, not for the tracing log. The orchestrator writes them through this
//! trait so the binary decides how they look and tests can capture them.

use std::sync::Arc;

pub trait Console: Send + Sync {
  /// A plain informational line.
  fn log(&self, message: &str);

  /// A line reporting something that finished successfully.
  fn success(&self, message: &str);

  /// A line reporting a failure.
  fn error(&self, message: &str);
}

impl<C: Console + ?Sized> Console for Arc<C> {
  fn log(&self, message: &str) {
    (**self).log(message)
  }

  fn success(&self, message: &str) {
    (**self).success(message)
  }

  fn error(&self, message: &str) {
    (**self).error(message)
  }
}
