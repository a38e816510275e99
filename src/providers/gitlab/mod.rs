mod events;
mod identifiers;
mod links;
mod status;
mod timestamp;
mod types;

pub use events::{build_span, SpanOutcome, SpanSource};
pub use status::StatusPolicy;
pub use types::{decode, JobNotification, PipelineNotification};
