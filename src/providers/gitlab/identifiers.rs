use super::types::{JobNotification, PipelineNotification};
use crate::span::SpanIds;

/// Derives the trace identity of the span a notification describes.
///
/// A pipeline is the root of its trace and uses its own id for both the trace
/// and the span. Jobs hang directly off their pipeline.
pub trait TraceIdentity {
    fn span_ids(&self) -> SpanIds;
}

impl TraceIdentity for PipelineNotification {
    fn span_ids(&self) -> SpanIds {
        let id = self.object_attributes.id.to_string();
        SpanIds {
            trace_id: id.clone(),
            span_id: id,
            parent_id: None,
        }
    }
}

impl TraceIdentity for JobNotification {
    fn span_ids(&self) -> SpanIds {
        let pipeline_id = self.pipeline_id.to_string();
        SpanIds {
            trace_id: pipeline_id.clone(),
            span_id: job_span_id(&self.build_name),
            parent_id: Some(pipeline_id),
        }
    }
}

/// Hex-encoded MD5 of the job name.
///
/// `build_id` changes on every retry, the name does not, so a retried job
/// replaces its previous span instead of adding a sibling. Two jobs sharing a
/// name in one pipeline collide.
pub fn job_span_id(build_name: &str) -> String {
    format!("{:x}", md5::compute(build_name.as_bytes()))
}
