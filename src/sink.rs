use std::sync::Arc;

use log::{debug, info, warn};
use reqwest::Client;
use tokio_util::task::TaskTracker;
use url::Url;

use crate::config::Config;
use crate::error::{BuildEventsError, Result};
use crate::span::SpanRecord;

/// Destination for finished spans.
///
/// `send` must not block: delivery happens in the background and its outcome
/// is never reported back to the caller.
pub trait EventSink: Send + Sync {
    fn send(&self, record: SpanRecord);
}

/// Picks the sink for this process: the events API when an API key is
/// configured, stdout otherwise.
///
/// Background deliveries are spawned on `tracker`; see [`drain`].
///
/// # Errors
///
/// Returns an error if the API host cannot be turned into an events URL or the
/// HTTP client cannot be built.
pub fn from_config(config: &Config, tracker: &TaskTracker) -> Result<Arc<dyn EventSink>> {
    match &config.api_key {
        Some(api_key) => {
            let sink = HoneycombSink::new(config, api_key, tracker.clone())?;
            info!("Sending events to {}", sink.events_url);
            Ok(Arc::new(sink))
        }
        None => {
            info!("No API key configured, writing events to stdout");
            Ok(Arc::new(WriterSink))
        }
    }
}

/// Waits for every delivery spawned on `tracker` to finish.
///
/// No new deliveries can be spawned afterwards.
pub async fn drain(tracker: &TaskTracker) {
    tracker.close();
    if !tracker.is_empty() {
        info!("Waiting for {} pending event deliveries", tracker.len());
    }
    tracker.wait().await;
}

/// Sends each span as a single event to the Honeycomb events API.
#[derive(Clone)]
pub struct HoneycombSink {
    client: Client,
    events_url: Url,
    api_key: String,
    tracker: TaskTracker,
}

impl HoneycombSink {
    pub fn new(config: &Config, api_key: &str, tracker: TaskTracker) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!(
                "buildevents/{} ({})",
                env!("CARGO_PKG_VERSION"),
                config.ci_provider
            ))
            .build()
            .map_err(|e| BuildEventsError::Config(format!("Failed to create HTTP client: {e}")))?;

        let events_url = events_url(&config.api_host, &config.dataset)?;

        Ok(Self {
            client,
            events_url,
            api_key: api_key.to_string(),
            tracker,
        })
    }

    /// Posts one event and waits for the API to accept it.
    pub async fn deliver(&self, record: &SpanRecord) -> Result<()> {
        let response = self
            .client
            .post(self.events_url.clone())
            .header("X-Honeycomb-Team", &self.api_key)
            .header("X-Honeycomb-Event-Time", record.timestamp.to_rfc3339())
            .json(&record.fields)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(BuildEventsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Delivered event to {}", self.events_url);
        Ok(())
    }
}

impl EventSink for HoneycombSink {
    fn send(&self, record: SpanRecord) {
        let sink = self.clone();
        self.tracker.spawn(async move {
            if let Err(e) = sink.deliver(&record).await {
                warn!("Failed to send event: {e}");
            }
        });
    }
}

/// `<api host>/1/events/<dataset>`, with the dataset percent-encoded.
fn events_url(api_host: &str, dataset: &str) -> Result<Url> {
    let mut url = Url::parse(api_host)
        .map_err(|e| BuildEventsError::Config(format!("Invalid API host: {e}")))?;

    url.path_segments_mut()
        .map_err(|()| BuildEventsError::Config(format!("API host cannot be a base URL: {api_host}")))?
        .pop_if_empty()
        .extend(["1", "events", dataset]);

    Ok(url)
}

/// Prints each span as one JSON line on stdout.
pub struct WriterSink;

impl EventSink for WriterSink {
    fn send(&self, record: SpanRecord) {
        println!("{record}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;
    use serde_json::json;

    fn record() -> SpanRecord {
        let mut record = SpanRecord::new(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        record.add("trace.trace_id", "42");
        record.add("duration_ms", 10_000);
        record
    }

    #[test]
    fn test_events_url() {
        let url = events_url("https://api.honeycomb.io", "buildevents").unwrap();
        assert_eq!(url.as_str(), "https://api.honeycomb.io/1/events/buildevents");

        let url = events_url("https://proxy.internal/honeycomb/", "ci traces").unwrap();
        assert_eq!(
            url.as_str(),
            "https://proxy.internal/honeycomb/1/events/ci%20traces"
        );
    }

    #[test]
    fn test_events_url_rejects_non_base_host() {
        assert!(events_url("mailto:ops@example.com", "buildevents").is_err());
    }

    #[tokio::test]
    async fn test_deliver_posts_event() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/1/events/buildevents")
            .match_header("x-honeycomb-team", "secret")
            .match_header("x-honeycomb-event-time", "2024-01-02T03:04:05+00:00")
            .match_header("user-agent", Matcher::Regex(r"^buildevents/.+ \(GitLab-CI\)$".to_string()))
            .match_body(Matcher::Json(json!({
                "trace.trace_id": "42",
                "duration_ms": 10000
            })))
            .with_status(200)
            .create_async()
            .await;

        let config = Config {
            api_host: server.url(),
            ..Default::default()
        };
        let sink = HoneycombSink::new(&config, "secret", TaskTracker::new()).unwrap();

        sink.deliver(&record()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_deliver_reports_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/1/events/buildevents")
            .with_status(401)
            .with_body("unknown API key")
            .create_async()
            .await;

        let config = Config {
            api_host: server.url(),
            ..Default::default()
        };
        let sink = HoneycombSink::new(&config, "wrong", TaskTracker::new()).unwrap();

        let err = sink.deliver(&record()).await.unwrap_err();
        assert!(matches!(
            err,
            BuildEventsError::Api { status: 401, ref message } if message == "unknown API key"
        ));
    }

    #[tokio::test]
    async fn test_drain_waits_for_background_delivery() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/1/events/buildevents")
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let config = Config {
            api_key: Some("secret".to_string()),
            api_host: server.url(),
            ..Default::default()
        };
        let tracker = TaskTracker::new();
        let sink = from_config(&config, &tracker).unwrap();

        sink.send(record());
        sink.send(record());
        drain(&tracker).await;

        assert!(tracker.is_empty());
        mock.assert_async().await;
    }

    #[test]
    fn test_sink_selection_without_key() {
        // Only checks construction; WriterSink has no state to inspect
        assert!(from_config(&Config::default(), &TaskTracker::new()).is_ok());
    }
}
