//! Execution contexts
//!
//! - [`WriteContext`]: sole persister, serialized on the write queue
//! - [`ReadContext`]: foreground reads of saved state, fed by merge notifications
//! - [`ChildContext`]: isolated unit of work saved into the write context

mod child;
mod notification;
mod read;
mod write;

pub use child::ChildContext;
pub use notification::{MergeNotification, SaveSummary};
pub use read::ReadContext;
pub use write::{WriteContext, WriteScope};
