//! Error reporting hook
//!
//! Every failure path reports `(kind, context)` here before the error is
//! returned to the caller. Hosts replace the default to forward errors to
//! their own logging or crash reporting.

use crate::errors::{ErrorKind, TandemError};

pub trait ErrorHook: Send + Sync {
    fn report(&self, kind: ErrorKind, context: &str);
}

impl<F> ErrorHook for F
where
    F: Fn(ErrorKind, &str) + Send + Sync,
{
    fn report(&self, kind: ErrorKind, context: &str) {
        self(kind, context)
    }
}

/// Default hook: logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorHook;

impl ErrorHook for TracingErrorHook {
    fn report(&self, kind: ErrorKind, context: &str) {
        tracing::error!(err_code = kind.code(), context, "tandem operation failed");
    }
}

/// Report `err` to `hook` and hand it back for returning
pub(crate) fn reported(hook: &dyn ErrorHook, err: TandemError) -> TandemError {
    hook.report(err.kind(), &err.context());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closure_hook_receives_kind_and_context() {
        let seen: Arc<Mutex<Vec<(ErrorKind, String)>>> = Arc::default();
        let sink = seen.clone();
        let hook = move |kind: ErrorKind, context: &str| {
            sink.lock().unwrap().push((kind, context.to_string()));
        };

        let err = reported(
            &hook,
            TandemError::new(ErrorKind::StoreNotFound)
                .with_op("detach_store")
                .with_message("unknown store"),
        );

        assert_eq!(err.kind(), ErrorKind::StoreNotFound);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, ErrorKind::StoreNotFound);
        assert_eq!(seen[0].1, "detach_store: unknown store");
    }
}
