//! Canonical schema constants for structured logging and events
//!
//! These constants ensure consistency across all logging and error reporting.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Store and context identifiers
pub const FIELD_STORE_ID: &str = "store_id";
pub const FIELD_CONTEXT_ID: &str = "context_id";
pub const FIELD_CONFIGURATION: &str = "configuration";
pub const FIELD_LOCATION: &str = "location";

// Save bookkeeping
pub const FIELD_GENERATION: &str = "generation";
pub const FIELD_CHANGE_COUNT: &str = "change_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
