use std::sync::Arc;

use errly_core::{ExceptionParsed, Subscriber};

use crate::client::DeliveryClient;
use crate::model::{IngestEvent, IngestRequest};

/// Fields stamped on every delivered event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDefaults {
    pub environment: String,
    pub release_version: Option<String>,
}

impl Default for EventDefaults {
    fn default() -> Self {
        Self::new("production")
    }
}

impl EventDefaults {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            release_version: None,
        }
    }

    pub fn with_release_version(mut self, release_version: Option<String>) -> Self {
        self.release_version = release_version;
        self
    }
}

/// Bus handler that projects each parsed exception and delivers it.
pub fn delivery_subscriber(
    client: Arc<dyn DeliveryClient>,
    defaults: EventDefaults,
) -> Subscriber<ExceptionParsed> {
    Arc::new(move |event: &ExceptionParsed| -> anyhow::Result<()> {
        let mut ingest = IngestEvent::from_parsed(event, defaults.environment.clone());
        if let Some(release) = &defaults.release_version {
            ingest = ingest.with_release_version(release.clone());
        }

        client.deliver(IngestRequest::single(ingest));
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::model::IngestResponse;
    use async_trait::async_trait;
    use errly_core::{IntegrationKind, StructuredException};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<IngestRequest>>,
    }

    #[async_trait]
    impl DeliveryClient for Recorder {
        async fn send(&self, _request: &IngestRequest) -> Result<IngestResponse, ClientError> {
            Err(ClientError::Runtime("not used".to_string()))
        }

        fn deliver(&self, request: IngestRequest) {
            self.requests.lock().unwrap().push(request);
        }
    }

    #[test]
    fn test_subscriber_stamps_defaults() {
        let recorder = Arc::new(Recorder::default());
        let subscriber = delivery_subscriber(
            recorder.clone(),
            EventDefaults::new("staging").with_release_version(Some("1.4.2".to_string())),
        );

        let event = ExceptionParsed::new(IntegrationKind::PanicHook, StructuredException::new("boom"));
        subscriber(&event).unwrap();

        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let delivered = &requests[0].events[0];
        assert_eq!(delivered.message, "boom");
        assert_eq!(delivered.environment, "staging");
        assert_eq!(delivered.release_version.as_deref(), Some("1.4.2"));
    }
}
