//! Lead delivery: the pipeline, its outcomes, and the HTTP transport.

pub mod outcome;
pub mod pipeline;
pub mod transport;

pub use outcome::{DeliveryFailure, DeliveryOutcome, FailureKind, LeadOrigin, SubmitResponse};
pub use pipeline::{DeliveryPipeline, build_payload};
pub use transport::{ResponseBody, TransportError, WebhookClient};
