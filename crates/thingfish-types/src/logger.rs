//! Injected logging handle.
//!
//! Store backends log through a [`Logger`] handed to their constructor
//! instead of whatever subscriber happens to be installed globally. The
//! default handle discards everything.

use std::fmt;

use tracing::Dispatch;

/// A `tracing` dispatch that backend code runs its events under.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    /// A logger that discards all events.
    pub fn none() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    /// Capture the dispatcher that is current on the calling thread.
    pub fn current() -> Self {
        Self {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Run `f` with this logger's dispatcher as the thread default.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_returns_closure_value() {
        let logger = Logger::default();
        let n = logger.scope(|| {
            tracing::debug!("discarded");
            41 + 1
        });
        assert_eq!(n, 42);
    }

    #[test]
    fn current_can_be_cloned_and_used() {
        let logger = Logger::current();
        let copy = logger.clone();
        assert_eq!(copy.scope(|| "ok"), "ok");
        assert!(format!("{logger:?}").contains("Logger"));
    }
}
