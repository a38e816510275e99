use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

pub const TRACE_ID: &str = "trace.trace_id";
pub const SPAN_ID: &str = "trace.span_id";
pub const PARENT_ID: &str = "trace.parent_id";

/// Trace identity of a single span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanIds {
    pub trace_id: String,
    pub span_id: String,
    /// `None` for the root span of a trace
    pub parent_id: Option<String>,
}

/// One trace span, ready for transmission.
///
/// Fields are kept in insertion order so that logged records read the same way
/// every time.
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    /// Span start
    pub timestamp: DateTime<Utc>,
    pub fields: IndexMap<String, Value>,
}

impl SpanRecord {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            fields: IndexMap::new(),
        }
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Adds every field, overwriting existing keys.
    pub fn extend<'a>(&mut self, fields: impl IntoIterator<Item = (&'a String, &'a Value)>) {
        for (key, value) in fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    pub fn set_ids(&mut self, ids: SpanIds) {
        self.add(TRACE_ID, ids.trace_id);
        self.add(SPAN_ID, ids.span_id);
        if let Some(parent_id) = ids.parent_id {
            self.add(PARENT_ID, parent_id);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.get_str(TRACE_ID)
    }

    pub fn span_id(&self) -> Option<&str> {
        self.get_str(SPAN_ID)
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.get_str(PARENT_ID)
    }
}

impl std::fmt::Display for SpanRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_root_span_has_no_parent() {
        let mut record = SpanRecord::new(Utc::now());
        record.set_ids(SpanIds {
            trace_id: "1".to_string(),
            span_id: "1".to_string(),
            parent_id: None,
        });

        assert_eq!(record.trace_id(), Some("1"));
        assert_eq!(record.span_id(), Some("1"));
        assert_eq!(record.parent_id(), None);
        assert!(record.get(PARENT_ID).is_none());
    }

    #[test]
    fn test_extend_overwrites_and_keeps_order() {
        let mut record = SpanRecord::new(Utc::now());
        record.add("a", 1);
        record.add("b", "two");

        let extra: IndexMap<String, Value> =
            [("b".to_string(), Value::from(2)), ("c".to_string(), Value::from(true))]
                .into_iter()
                .collect();
        record.extend(&extra);

        let keys: Vec<_> = record.fields.keys().map(String::as_str).collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(record.get("b"), Some(&Value::from(2)));
    }

    #[test]
    fn test_display_is_json() {
        let mut record = SpanRecord::new(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        record.add("name", "build 42");

        let json: Value = serde_json::from_str(&record.to_string()).unwrap();
        assert_eq!(json["timestamp"], "2024-01-02T03:04:05Z");
        assert_eq!(json["fields"]["name"], "build 42");
    }
}
