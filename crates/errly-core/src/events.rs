//! Events published by integrations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exception::StructuredException;
use crate::integration::IntegrationKind;

/// Request context attached to exceptions captured by a web integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
}

/// An exception was captured and parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionParsed {
    pub event_id: Uuid,
    pub integration: IntegrationKind,
    #[serde(with = "crate::wire::timestamp")]
    pub captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestInfo>,
    pub data: StructuredException,
}

impl ExceptionParsed {
    pub fn new(integration: IntegrationKind, data: StructuredException) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            integration,
            captured_at: Utc::now(),
            request: None,
            data,
        }
    }

    pub fn with_request(mut self, request: Option<RequestInfo>) -> Self {
        self.request = request;
        self
    }
}

/// An integration finished setup and is now capturing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationInitialized {
    pub event_id: Uuid,
    pub integration: IntegrationKind,
}

impl IntegrationInitialized {
    pub fn new(integration: IntegrationKind) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            integration,
        }
    }
}
