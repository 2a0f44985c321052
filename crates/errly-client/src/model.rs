//! Records exchanged with the ingestion service

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use errly_core::{ExceptionParsed, StructuredException};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    #[default]
    Error,
    Warning,
    Info,
    Debug,
}

/// One event as accepted by `POST /api/v1/ingest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestEvent {
    pub message: String,
    pub environment: String,
    #[serde(default)]
    pub level: ErrorLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
    /// Capture time, not send time
    #[serde(with = "errly_core::wire::timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl IngestEvent {
    pub fn new(message: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            environment: environment.into(),
            level: ErrorLevel::Error,
            stack_trace: None,
            release_version: None,
            user_id: None,
            user_email: None,
            user_ip: None,
            browser: None,
            os: None,
            url: None,
            tags: BTreeMap::new(),
            extra: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Project a parsed exception into an ingest event.
    pub fn from_parsed(event: &ExceptionParsed, environment: impl Into<String>) -> Self {
        let data = &event.data;

        let mut ingest = Self::new(data.message(), environment)
            .with_level(ErrorLevel::Error)
            .with_timestamp(event.captured_at)
            .with_tag("integration", event.integration.as_str())
            .with_extra("frame_count", data.frames().len())
            .with_extra("event_id", event.event_id.to_string());

        ingest.stack_trace = render_stack_trace(data);

        if let (Some(outermost), Some(innermost)) = (data.outermost_frame(), data.innermost_frame()) {
            ingest = ingest
                .with_tag("first_file", outermost.filename())
                .with_tag("last_file", innermost.filename())
                .with_tag("error_function", innermost.function());
        }

        if let Some(exception_type) = data.exception_type() {
            ingest = ingest.with_tag("exception_type", exception_type);
        }

        if let Some(request) = &event.request {
            ingest = ingest
                .with_url(request.url.clone())
                .with_tag("http_method", request.method.clone());
        }

        ingest
    }

    pub fn with_level(mut self, level: ErrorLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_release_version(mut self, release_version: impl Into<String>) -> Self {
        self.release_version = Some(release_version.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_user_email(mut self, user_email: impl Into<String>) -> Self {
        self.user_email = Some(user_email.into());
        self
    }

    pub fn with_user_ip(mut self, user_ip: impl Into<String>) -> Self {
        self.user_ip = Some(user_ip.into());
        self
    }

    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = Some(browser.into());
        self
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Human-readable stack, outermost frame first. `None` without frames.
pub fn render_stack_trace(exception: &StructuredException) -> Option<String> {
    if exception.frames().is_empty() {
        return None;
    }

    let mut rendered = String::new();
    for (index, frame) in exception.frames().iter().enumerate() {
        if index > 0 {
            rendered.push('\n');
        }
        let _ = write!(
            rendered,
            "  File \"{}\", line {}, in {}",
            frame.filename(),
            frame.line_number(),
            frame.function()
        );
        if let Some(source_line) = frame.source_line() {
            let _ = write!(rendered, "\n    {}", source_line);
        }
    }

    Some(rendered)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    pub events: Vec<IngestEvent>,
}

impl IngestRequest {
    pub fn new(events: Vec<IngestEvent>) -> Self {
        Self { events }
    }

    pub fn single(event: IngestEvent) -> Self {
        Self {
            events: vec![event],
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Body of a successful ingest call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub processed_count: u64,
    pub project_id: Uuid,
    /// Unix seconds
    pub timestamp: i64,
}

/// Body of a rejected ingest call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}
