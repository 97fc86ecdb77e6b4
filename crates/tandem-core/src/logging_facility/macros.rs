//! Canonical logging macros
//!
//! Every stack operation that touches store topology or persists changes is
//! bracketed by exactly one start event and one end (or end_error) event.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use tandem_core::log_op_start;
/// log_op_start!("attach_store");
/// log_op_start!("attach_store", configuration = "Default");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = tandem_core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = tandem_core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use tandem_core::log_op_end;
/// log_op_end!("attach_store", duration_ms = 42);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = tandem_core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = tandem_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// `$err` must be a `TandemError` (or a reference to one).
///
/// # Example
///
/// ```
/// # use tandem_core::log_op_error;
/// # use tandem_core::errors::{ErrorKind, TandemError};
/// let err = TandemError::new(ErrorKind::StoreNotFound);
/// log_op_error!("detach_store", err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let err: &$crate::errors::TandemError = &$err;
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = tandem_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?err.kind(),
            err_code = err.code(),
            err_message = err.message(),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let err: &$crate::errors::TandemError = &$err;
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = tandem_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err_kind = ?err.kind(),
            err_code = err.code(),
            err_message = err.message(),
            $($field)*
        );
    }};
}
