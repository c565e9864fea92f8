//! Durable lead state: what was delivered and what is waiting for a retry.
//!
//! ```text
//! <state-dir>/sent_log.json     - numbers accepted by the endpoint
//! <state-dir>/retry_queue.json  - leads whose delivery failed, head first
//! ```
//!
//! Both files are rewritten in full on every mutation (temp file + fsync +
//! rename + dir fsync), so a crash leaves either the old or the new snapshot.

pub mod drain;
pub mod retry_queue;
pub mod sent_log;

pub use drain::{DrainReport, QueueDrainer};
pub use retry_queue::{QueueError, RETRY_QUEUE_FILE, RetryQueue};
pub use sent_log::{SENT_LOG_FILE, SentLog, SentLogError};
