use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use super::status::Status;
use crate::error::Result;

/// Deserializes a field GitLab may send as `null`, falling back to its default.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A `Pipeline Hook` webhook notification.
///
/// Only the fields needed to build a span are decoded; everything else in the
/// payload is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineNotification {
    #[serde(default, deserialize_with = "nullable")]
    pub object_kind: String,
    #[serde(default, deserialize_with = "nullable")]
    pub object_attributes: PipelineAttributes,
    /// Present only for merge request pipelines
    #[serde(default)]
    pub merge_request: Option<MergeRequest>,
    #[serde(default, deserialize_with = "nullable")]
    pub project: Project,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineAttributes {
    #[serde(default, deserialize_with = "nullable")]
    pub id: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub status: Status,
    /// Branch or tag the pipeline ran for
    #[serde(default, rename = "ref", deserialize_with = "nullable")]
    pub ref_: String,
    #[serde(default, deserialize_with = "nullable")]
    pub sha: String,
    #[serde(default, deserialize_with = "nullable")]
    pub source: String,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    /// Total pipeline duration in seconds
    #[serde(default, deserialize_with = "nullable")]
    pub duration: i64,
    /// Time spent waiting for runners in seconds
    #[serde(default, deserialize_with = "nullable")]
    pub queued_duration: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeRequest {
    #[serde(default, deserialize_with = "nullable")]
    pub iid: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub source_branch: String,
    #[serde(default, deserialize_with = "nullable")]
    pub source_project_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Project {
    #[serde(default, deserialize_with = "nullable")]
    pub web_url: String,
}

/// A `Job Hook` webhook notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobNotification {
    #[serde(default, deserialize_with = "nullable")]
    pub object_kind: String,
    /// Job name as defined in .gitlab-ci.yml
    #[serde(default, deserialize_with = "nullable")]
    pub build_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub build_id: i64,
    #[serde(default, deserialize_with = "nullable")]
    pub build_stage: String,
    #[serde(default, deserialize_with = "nullable")]
    pub build_status: Status,
    /// `null` until a runner picks the job up
    #[serde(default, deserialize_with = "nullable")]
    pub build_started_at: String,
    /// Job execution duration in (fractional) seconds
    #[serde(default, deserialize_with = "nullable")]
    pub build_duration: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub build_queued_duration: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub pipeline_id: i64,
    #[serde(default, rename = "ref", deserialize_with = "nullable")]
    pub ref_: String,
    #[serde(default, deserialize_with = "nullable")]
    pub repository: Repository,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Repository {
    #[serde(default, deserialize_with = "nullable")]
    pub homepage: String,
}

/// Decodes a webhook request body into a notification.
///
/// Unknown fields are ignored and missing or `null` ones take their default.
///
/// # Errors
///
/// Returns [`crate::error::BuildEventsError::Decode`] if the body is not JSON
/// of the expected shape.
pub fn decode<N: DeserializeOwned>(body: &[u8]) -> Result<N> {
    Ok(serde_json::from_slice(body)?)
}
