use crate::{Error, Result};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Runs a user callback, turning a panic into [`Error::Internal`].
///
/// Lane, ticker and list loops call every user-provided callback through
/// this wrapper so that one misbehaving callback cannot take the loop (or a
/// sibling lane) down with it.
pub(crate) fn invoke<R>(site: &'static str, f: impl FnOnce() -> Result<R>) -> Result<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(res) => res,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            #[cfg(feature = "tracing")]
            tracing::error!("{site} callback panicked: {reason}");
            Err(Error::Internal {
                reason: format!("{site}: {reason}"),
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
