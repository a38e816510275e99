use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;

use super::identifiers::TraceIdentity;
use super::links::{job_url, pipeline_url};
use super::status::{Status, StatusPolicy};
use super::timestamp;
use super::types::{JobNotification, PipelineNotification};
use crate::config::Config;
use crate::error::BuildEventsError;
use crate::span::SpanRecord;

/// Result of turning one notification into a span.
#[derive(Debug)]
pub enum SpanOutcome {
    /// The status policy filtered the notification out; nothing to send.
    Suppressed,
    Built(SpanRecord),
    /// Everything but the start time was built. The record is stamped with
    /// the time it was built at.
    Untimed {
        record: SpanRecord,
        error: BuildEventsError,
    },
}

impl SpanOutcome {
    pub fn into_parts(self) -> (Option<SpanRecord>, Option<BuildEventsError>) {
        match self {
            Self::Suppressed => (None, None),
            Self::Built(record) => (Some(record), None),
            Self::Untimed { record, error } => (Some(record), Some(error)),
        }
    }
}

/// A webhook notification that can be rendered as a span.
pub trait SpanSource: TraceIdentity {
    /// `service_name` of the emitted span
    const SERVICE_NAME: &'static str;

    /// `object_kind` of the payload (`pipeline` or `build`)
    fn object_kind(&self) -> &str;

    fn status(&self) -> &Status;

    /// Raw start time as sent by GitLab
    fn started_at(&self) -> &str;

    /// Adds the span name and the CI provenance fields.
    fn describe(&self, record: &mut SpanRecord);

    /// `(duration_ms, queued_duration_ms)`
    fn durations_ms(&self) -> (Value, Value);
}

impl SpanSource for PipelineNotification {
    const SERVICE_NAME: &'static str = "pipeline";

    fn object_kind(&self) -> &str {
        &self.object_kind
    }

    fn status(&self) -> &Status {
        &self.object_attributes.status
    }

    fn started_at(&self) -> &str {
        &self.object_attributes.created_at
    }

    fn describe(&self, record: &mut SpanRecord) {
        let attrs = &self.object_attributes;

        record.add("name", format!("build {}", attrs.id));
        record.add("branch", attrs.ref_.as_str());
        record.add("build_num", attrs.id);
        record.add("build_url", pipeline_url(&self.project.web_url, attrs.id));
        record.add("repo", self.project.web_url.as_str());
        if !attrs.sha.is_empty() {
            record.add("commit", attrs.sha.as_str());
        }
        if !attrs.source.is_empty() {
            record.add("source", attrs.source.as_str());
        }

        if let Some(mr) = &self.merge_request {
            record.add("pr_number", mr.iid);
            record.add("pr_branch", mr.source_branch.as_str());
            record.add("pr_repo", mr.source_project_id);
        }
    }

    fn durations_ms(&self) -> (Value, Value) {
        let attrs = &self.object_attributes;
        (
            Value::from(attrs.duration.saturating_mul(1000)),
            Value::from(attrs.queued_duration.saturating_mul(1000)),
        )
    }
}

impl SpanSource for JobNotification {
    const SERVICE_NAME: &'static str = "job";

    fn object_kind(&self) -> &str {
        &self.object_kind
    }

    fn status(&self) -> &Status {
        &self.build_status
    }

    fn started_at(&self) -> &str {
        &self.build_started_at
    }

    fn describe(&self, record: &mut SpanRecord) {
        record.add("name", self.build_name.as_str());
        record.add("branch", self.ref_.as_str());
        record.add("build_num", self.pipeline_id);
        record.add("build_id", self.build_id);
        record.add("build_url", job_url(&self.repository.homepage, self.build_id));
        record.add("repo", self.repository.homepage.as_str());
        if !self.build_stage.is_empty() {
            record.add("build_stage", self.build_stage.as_str());
        }
    }

    fn durations_ms(&self) -> (Value, Value) {
        (
            Value::from(self.build_duration * 1000.0),
            Value::from(self.build_queued_duration * 1000.0),
        )
    }
}

/// Builds the span for a pipeline or job notification.
///
/// Returns [`SpanOutcome::Suppressed`] when `policy` filters the status out.
/// Otherwise the record carries the trace identity, the CI provenance fields
/// and, for terminal statuses only, `duration_ms` and `queued_duration_ms`.
/// The built record is logged before it is returned.
pub fn build_span<N: SpanSource>(
    config: &Config,
    notification: &N,
    policy: StatusPolicy,
) -> SpanOutcome {
    let status = notification.status();
    if policy.suppresses(status) {
        debug!(
            "Skipping {} event ({:?}) with status {status}",
            N::SERVICE_NAME,
            notification.object_kind()
        );
        return SpanOutcome::Suppressed;
    }

    let mut record = SpanRecord::new(Utc::now());
    record.extend(&config.extra_fields);
    record.add("ci_provider", config.ci_provider.as_str());
    record.add("meta.version", env!("CARGO_PKG_VERSION"));
    record.add("service_name", N::SERVICE_NAME);
    record.set_ids(notification.span_ids());
    notification.describe(&mut record);
    record.add("status", status.as_str());

    // Independent of `policy`: durations are meaningless until the span ends
    if status.is_terminal() {
        let (duration_ms, queued_duration_ms) = notification.durations_ms();
        record.add("duration_ms", duration_ms);
        record.add("queued_duration_ms", queued_duration_ms);
    }

    match timestamp::resolve(notification.started_at()) {
        Ok(started_at) => {
            record.timestamp = started_at;
            info!("{record}");
            SpanOutcome::Built(record)
        }
        Err(error) => {
            warn!("Failed to parse timestamp: {error}");
            info!("{record}");
            SpanOutcome::Untimed { record, error }
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    use crate::providers::gitlab::types::{decode, MergeRequest};

    fn pipeline(status: &str) -> PipelineNotification {
        let mut pipeline = PipelineNotification::default();
        pipeline.object_attributes.id = 42;
        pipeline.object_attributes.status = Status::from(status.to_string());
        pipeline.object_attributes.ref_ = "main".to_string();
        pipeline.object_attributes.created_at = "2024-01-02 03:04:05 UTC".to_string();
        pipeline.object_attributes.duration = 10;
        pipeline.object_attributes.queued_duration = 2;
        pipeline.project.web_url = "https://gitlab.com/group/project".to_string();
        pipeline
    }

    fn job(status: &str) -> JobNotification {
        JobNotification {
            build_name: "test".to_string(),
            build_id: 1977,
            build_stage: "verify".to_string(),
            build_status: Status::from(status.to_string()),
            build_started_at: "2024-01-02 03:04:05 +0000".to_string(),
            build_duration: 12.5,
            build_queued_duration: 0.25,
            pipeline_id: 42,
            ref_: "main".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_in_progress_statuses_are_suppressed() {
        let config = Config::default();

        for status in ["created", "running"] {
            let outcome = build_span(&config, &pipeline(status), StatusPolicy::TerminalOnly);
            assert!(matches!(outcome, SpanOutcome::Suppressed));

            let outcome = build_span(&config, &job(status), StatusPolicy::TerminalOnly);
            assert!(matches!(outcome, SpanOutcome::Suppressed));
        }
    }

    #[test]
    fn test_pipeline_span() {
        // Arrange
        let config = Config::default();
        let mut notification = pipeline("success");
        notification.merge_request = Some(MergeRequest {
            iid: 5,
            source_branch: "feature".to_string(),
            source_project_id: 99,
        });

        // Act
        let outcome = build_span(&config, &notification, StatusPolicy::TerminalOnly);

        // Assert
        let SpanOutcome::Built(record) = outcome else {
            panic!("expected a built span");
        };
        assert_eq!(record.trace_id(), Some("42"));
        assert_eq!(record.span_id(), Some("42"));
        assert_eq!(record.parent_id(), None);
        assert_eq!(record.get("service_name"), Some(&json!("pipeline")));
        assert_eq!(record.get("name"), Some(&json!("build 42")));
        assert_eq!(record.get("duration_ms"), Some(&json!(10000)));
        assert_eq!(record.get("queued_duration_ms"), Some(&json!(2000)));
        assert_eq!(record.get("status"), Some(&json!("success")));
        assert_eq!(record.get("branch"), Some(&json!("main")));
        assert_eq!(record.get("ci_provider"), Some(&json!("GitLab-CI")));
        assert_eq!(
            record.get("build_url"),
            Some(&json!("https://gitlab.com/group/project/-/pipelines/42"))
        );
        assert_eq!(record.get("pr_number"), Some(&json!(5)));
        assert_eq!(record.get("pr_branch"), Some(&json!("feature")));
        assert_eq!(record.get("pr_repo"), Some(&json!(99)));
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
    }

    #[test]
    fn test_pipeline_without_merge_request_has_no_pr_fields() {
        let outcome = build_span(&Config::default(), &pipeline("failed"), StatusPolicy::All);
        let record = outcome.into_parts().0.unwrap();

        assert!(record.get("pr_number").is_none());
        assert!(record.get("pr_branch").is_none());
    }

    #[test]
    fn test_job_span() {
        let outcome = build_span(&Config::default(), &job("failed"), StatusPolicy::TerminalOnly);

        let SpanOutcome::Built(record) = outcome else {
            panic!("expected a built span");
        };
        assert_eq!(record.trace_id(), Some("42"));
        assert_eq!(record.parent_id(), Some("42"));
        assert_eq!(record.span_id(), Some("098f6bcd4621d373cade4e832627b4f6"));
        assert_eq!(record.get("service_name"), Some(&json!("job")));
        assert_eq!(record.get("name"), Some(&json!("test")));
        assert_eq!(record.get("build_id"), Some(&json!(1977)));
        assert_eq!(record.get("build_num"), Some(&json!(42)));
        assert_eq!(record.get("build_stage"), Some(&json!("verify")));
        assert_eq!(record.get("status"), Some(&json!("failed")));
        assert_eq!(
            record.get("duration_ms").and_then(Value::as_f64),
            Some(12_500.0)
        );
        assert_eq!(
            record.get("queued_duration_ms").and_then(Value::as_f64),
            Some(250.0)
        );
    }

    #[test]
    fn test_huge_pipeline_duration_saturates() {
        let body = r#"{
            "object_attributes": {
                "id": 1,
                "status": "success",
                "created_at": "2024-01-02 03:04:05 UTC",
                "duration": 9223372036854775807,
                "queued_duration": -9223372036854775808
            }
        }"#;
        let notification = decode::<PipelineNotification>(body.as_bytes()).unwrap();

        let outcome = build_span(&Config::default(), &notification, StatusPolicy::TerminalOnly);
        let record = outcome.into_parts().0.unwrap();

        assert_eq!(record.get("duration_ms"), Some(&json!(i64::MAX)));
        assert_eq!(record.get("queued_duration_ms"), Some(&json!(i64::MIN)));
    }

    #[test]
    fn test_unknown_status_is_not_suppressed() {
        let outcome = build_span(
            &Config::default(),
            &pipeline("waiting_for_callback"),
            StatusPolicy::TerminalOnly,
        );
        let record = outcome.into_parts().0.unwrap();

        assert_eq!(record.get("status"), Some(&json!("waiting_for_callback")));
        assert!(record.get("duration_ms").is_some());
    }

    #[test]
    fn test_durations_are_gated_on_status_not_policy() {
        // With suppression off, a running pipeline still gets no durations
        let outcome = build_span(&Config::default(), &pipeline("running"), StatusPolicy::All);
        let record = outcome.into_parts().0.unwrap();

        assert_eq!(record.get("status"), Some(&json!("running")));
        assert!(record.get("duration_ms").is_none());
        assert!(record.get("queued_duration_ms").is_none());
    }

    #[test]
    fn test_bad_timestamp_still_returns_record() {
        let mut notification = job("success");
        notification.build_started_at = "2024-01-02T03:04:05Z".to_string();

        let (record, error) = build_span(&Config::default(), &notification, StatusPolicy::All)
            .into_parts();

        let record = record.unwrap();
        assert_eq!(record.trace_id(), Some("42"));
        assert!(record.get("duration_ms").is_some());
        assert!(matches!(error, Some(BuildEventsError::Timestamp(_))));
    }

    #[test]
    fn test_extra_fields_are_added_but_never_override() {
        let mut config = Config::default();
        config
            .extra_fields
            .insert("team".to_string(), json!("platform"));
        config
            .extra_fields
            .insert("service_name".to_string(), json!("spoofed"));

        let outcome = build_span(&config, &pipeline("success"), StatusPolicy::TerminalOnly);
        let record = outcome.into_parts().0.unwrap();

        assert_eq!(record.get("team"), Some(&json!("platform")));
        assert_eq!(record.get("service_name"), Some(&json!("pipeline")));
    }
}
