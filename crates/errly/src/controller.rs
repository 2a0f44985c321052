//! Initialization entry point and the controller it returns

use std::sync::Arc;

use errly_client::{delivery_subscriber, DeliveryClient, EventDefaults, HttpClient};
use errly_core::scope::CaptureGuard;
use errly_core::{
    ErrlyError, EventBus, ExceptionParsed, Integration, IntegrationInitialized, IntegrationKind,
    IntegrationRegistry, LifecycleState, RaisedException, SetupContext, StructuredException,
    Subscriber,
};
use errly_panic::PanicHookIntegration;
use tracing::{debug, info};

use crate::config::ErrlyConfig;
use crate::error::InitError;

/// Top-level entry point
#[derive(Debug, Clone, Copy)]
pub struct Errly;

impl Errly {
    pub fn builder(config: ErrlyConfig) -> ErrlyBuilder {
        ErrlyBuilder::new(config)
    }

    /// Initialize with the default integrations: the panic hook, plus axum
    /// when the `axum` feature is enabled.
    pub fn init(config: ErrlyConfig) -> Result<ModuleController, InitError> {
        Self::builder(config).with_default_integrations().init()
    }
}

pub struct ErrlyBuilder {
    config: ErrlyConfig,
    integrations: Vec<Arc<dyn Integration>>,
    initialized_events: Arc<EventBus<IntegrationInitialized>>,
    subscribers: Vec<Subscriber<ExceptionParsed>>,
    delivery_client: Option<Arc<dyn DeliveryClient>>,
}

impl std::fmt::Debug for ErrlyBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrlyBuilder")
            .field("config", &self.config)
            .field(
                "integrations",
                &self.integrations.iter().map(|i| i.kind()).collect::<Vec<_>>(),
            )
            .field("subscribers", &self.subscribers.len())
            .field("custom_delivery_client", &self.delivery_client.is_some())
            .finish()
    }
}

impl ErrlyBuilder {
    pub fn new(config: ErrlyConfig) -> Self {
        Self {
            config,
            integrations: Vec::new(),
            initialized_events: Arc::new(EventBus::new()),
            subscribers: Vec::new(),
            delivery_client: None,
        }
    }

    pub fn with_integration(mut self, integration: Arc<dyn Integration>) -> Self {
        self.integrations.push(integration);
        self
    }

    pub fn with_default_integrations(mut self) -> Self {
        self.integrations.push(Arc::new(PanicHookIntegration::new()));
        #[cfg(feature = "axum")]
        self.integrations
            .push(Arc::new(errly_axum::AxumIntegration::new()));
        self
    }

    /// Run `handler` each time an integration finishes setup.
    pub fn on_integration_initialized<F>(self, handler: F) -> Self
    where
        F: Fn(&IntegrationInitialized) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.initialized_events.subscribe(handler);
        self
    }

    /// Run `handler` for every parsed exception, after delivery.
    pub fn on_exception<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ExceptionParsed) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribers.push(Arc::new(handler));
        self
    }

    /// Replace the HTTP client built from the configuration.
    pub fn delivery_client(mut self, client: Arc<dyn DeliveryClient>) -> Self {
        self.delivery_client = Some(client);
        self
    }

    pub fn init(self) -> Result<ModuleController, InitError> {
        self.config.validate()?;

        let client: Arc<dyn DeliveryClient> = match self.delivery_client {
            Some(client) => client,
            None => Arc::new(HttpClient::new(
                self.config.base_url.clone(),
                self.config.api_key.clone(),
                self.config.timeout(),
            )?),
        };

        let defaults = EventDefaults::new(self.config.environment.clone())
            .with_release_version(self.config.release.clone());

        let mut context = SetupContext::new(self.config.base_url.clone(), self.config.api_key.clone())
            .with_environment(self.config.environment.clone())
            .with_initialized_events(self.initialized_events.clone())
            .with_subscriber(delivery_subscriber(client, defaults));
        for subscriber in self.subscribers {
            context = context.with_subscriber(subscriber);
        }

        let mut registry = IntegrationRegistry::new();
        for integration in &self.integrations {
            let kind = integration.kind();
            if registry.get(kind).is_some() {
                return Err(ErrlyError::integration(kind, "registered more than once").into());
            }
            registry.register(integration.clone());
        }

        let attempted = registry.kinds();
        for kind in &attempted {
            let state = registry
                .get(*kind)
                .map(|integration| integration.setup(&context))
                .unwrap_or(LifecycleState::Uninitialized);

            if state == LifecycleState::Uninitialized {
                debug!("Integration {} did not initialize", kind);
                registry.remove(*kind);
            }
        }

        if registry.is_empty() {
            let attempted: Vec<&str> = attempted.iter().map(IntegrationKind::as_str).collect();
            return Err(InitError::configuration(format!(
                "no integration could be initialized (attempted: [{}])",
                attempted.join(", ")
            )));
        }

        info!(
            "Errly initialized for {} with {} integrations: {:?}",
            self.config.environment,
            registry.len(),
            registry.kinds()
        );

        Ok(ModuleController {
            config: self.config,
            registry,
            initialized_events: self.initialized_events,
        })
    }
}

/// Holds every initialized integration and reverts them together
#[derive(Debug)]
pub struct ModuleController {
    config: ErrlyConfig,
    registry: IntegrationRegistry,
    initialized_events: Arc<EventBus<IntegrationInitialized>>,
}

impl ModuleController {
    pub fn init(config: ErrlyConfig) -> Result<Self, InitError> {
        Errly::init(config)
    }

    pub fn config(&self) -> &ErrlyConfig {
        &self.config
    }

    /// Initialized integrations, in setup order
    pub fn integrations(&self) -> impl Iterator<Item = &Arc<dyn Integration>> {
        self.registry.iter()
    }

    pub fn kinds(&self) -> Vec<IntegrationKind> {
        self.registry.kinds()
    }

    pub fn get(&self, kind: IntegrationKind) -> Option<Arc<dyn Integration>> {
        self.registry.get(kind).cloned()
    }

    pub fn panic_hook(&self) -> Option<Arc<PanicHookIntegration>> {
        self.get(IntegrationKind::PanicHook)?
            .into_any()
            .downcast::<PanicHookIntegration>()
            .ok()
    }

    #[cfg(feature = "axum")]
    pub fn axum(&self) -> Option<Arc<errly_axum::AxumIntegration>> {
        self.get(IntegrationKind::Axum)?
            .into_any()
            .downcast::<errly_axum::AxumIntegration>()
            .ok()
    }

    pub fn initialized_events(&self) -> &Arc<EventBus<IntegrationInitialized>> {
        &self.initialized_events
    }

    /// Report an error value that was handled by the application.
    ///
    /// Returns `None` when no integration is active or when called from
    /// inside the SDK's own capture path.
    pub fn capture_error<E>(&self, error: &E) -> Option<StructuredException>
    where
        E: std::error::Error + ?Sized,
    {
        let _capturing = CaptureGuard::enter()?;
        let integration = self
            .get(IntegrationKind::PanicHook)
            .or_else(|| self.registry.iter().next().cloned())?;

        if integration.state() != LifecycleState::Initialized {
            return None;
        }

        Some(integration.invoke(&RaisedException::from_error(error)))
    }

    /// Revert every integration, last initialized first.
    pub fn revert(&self) -> UninitializedModuleController {
        for integration in self.registry.iter().rev() {
            integration.revert();
        }
        self.initialized_events.unsubscribe_all();
        info!("Errly reverted {} integrations", self.registry.len());

        UninitializedModuleController::new(self.config.clone())
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

/// Controller after [`ModuleController::revert`]; can be initialized again
#[derive(Debug, Clone)]
pub struct UninitializedModuleController {
    config: ErrlyConfig,
}

impl UninitializedModuleController {
    pub fn new(config: ErrlyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ErrlyConfig {
        &self.config
    }

    pub fn init(self) -> Result<ModuleController, InitError> {
        Errly::init(self.config)
    }
}
