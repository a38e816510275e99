use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// GitLab pipeline/job status as reported by webhooks.
///
/// Unknown values are kept verbatim in [`Status::Other`] so that new upstream
/// statuses pass through to the emitted span unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Created,
    WaitingForResource,
    Preparing,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Scheduled,
    Other(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::WaitingForResource => "waiting_for_resource",
            Self::Preparing => "preparing",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Other(raw) => raw,
        }
    }

    /// Whether the span described by this status has finished its timing.
    ///
    /// Only `created` and `running` are treated as incomplete; every other
    /// status, including unrecognised ones, counts as terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Created | Self::Running)
    }
}

/// An absent status decodes as an empty, unrecognised one.
impl Default for Status {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for Status {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "created" => Self::Created,
            "waiting_for_resource" => Self::WaitingForResource,
            "preparing" => Self::Preparing,
            "pending" => Self::Pending,
            "running" => Self::Running,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            "skipped" => Self::Skipped,
            "manual" => Self::Manual,
            "scheduled" => Self::Scheduled,
            _ => Self::Other(raw),
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides which notifications produce a span at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StatusPolicy {
    /// Emit spans only for terminal statuses.
    #[default]
    TerminalOnly,
    /// Emit a span for every notification.
    All,
}

impl StatusPolicy {
    pub fn suppresses(self, status: &Status) -> bool {
        match self {
            Self::TerminalOnly => !status.is_terminal(),
            Self::All => false,
        }
    }
}
