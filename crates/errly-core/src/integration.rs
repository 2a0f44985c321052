//! Integration trait, lifecycle state machine and registry
//!
//! Every integration moves between two states:
//!
//! ```text
//! Uninitialized --setup (host present)--> Initialized
//! Uninitialized --setup (host absent)---> Uninitialized
//! Initialized   --revert--------------->  Uninitialized
//! ```
//!
//! [`Lifecycle`] implements these transitions once so each integration only
//! supplies the install and uninstall steps.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Subscriber};
use crate::events::{ExceptionParsed, IntegrationInitialized, RequestInfo};
use crate::exception::{CallbackChain, RaisedException, StructuredException};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    /// Process-wide panic hook
    PanicHook,
    /// axum request middleware
    Axum,
}

impl IntegrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PanicHook => "panic_hook",
            Self::Axum => "axum",
        }
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
}

/// Reports whether the host an integration attaches to is available
pub type HostProbe = fn() -> bool;

/// Mutex-guarded two-state lifecycle shared by all integrations
pub struct Lifecycle {
    kind: IntegrationKind,
    state: Mutex<LifecycleState>,
    probe: HostProbe,
    host_present: OnceLock<bool>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("host_present", &self.host_present.get())
            .finish()
    }
}

impl Lifecycle {
    pub fn new(kind: IntegrationKind, probe: HostProbe) -> Self {
        Self {
            kind,
            state: Mutex::new(LifecycleState::Uninitialized),
            probe,
            host_present: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> IntegrationKind {
        self.kind
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == LifecycleState::Initialized
    }

    /// Probe result, evaluated on first use and cached
    pub fn host_present(&self) -> bool {
        *self.host_present.get_or_init(self.probe)
    }

    /// Move to `Initialized`, running `install` at most once.
    ///
    /// `install` returning false leaves the lifecycle uninitialized. The
    /// state lock is held across the check and the install so concurrent
    /// callers cannot install twice.
    pub fn transition_up<F>(&self, install: F) -> LifecycleState
    where
        F: FnOnce() -> bool,
    {
        self.transition(install).0
    }

    /// [`Lifecycle::transition_up`], then announce on `context` if this call
    /// did the install.
    ///
    /// The announcement runs after the state lock is released, so
    /// `IntegrationInitialized` subscribers may query the integration.
    pub fn setup<F>(&self, context: &SetupContext, install: F) -> LifecycleState
    where
        F: FnOnce() -> bool,
    {
        let (state, installed) = self.transition(install);
        if installed {
            context.announce(self.kind);
        }
        state
    }

    fn transition<F>(&self, install: F) -> (LifecycleState, bool)
    where
        F: FnOnce() -> bool,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if *state == LifecycleState::Initialized {
            debug!("Integration {} already initialized", self.kind);
            return (*state, false);
        }

        if !self.host_present() {
            debug!("Host for integration {} not present, skipping", self.kind);
            return (*state, false);
        }

        if !install() {
            warn!("Integration {} could not be installed", self.kind);
            return (*state, false);
        }

        *state = LifecycleState::Initialized;
        info!("Integration {} initialized", self.kind);
        (*state, true)
    }

    /// Move to `Uninitialized`, running `uninstall` only if initialized.
    pub fn transition_down<F>(&self, uninstall: F) -> LifecycleState
    where
        F: FnOnce(),
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if *state == LifecycleState::Uninitialized {
            debug!("Integration {} not initialized, nothing to revert", self.kind);
            return *state;
        }

        uninstall();
        *state = LifecycleState::Uninitialized;
        info!("Integration {} reverted", self.kind);
        *state
    }
}

/// Everything an integration receives when it is set up
#[derive(Clone)]
pub struct SetupContext {
    pub endpoint: String,
    pub credential: String,
    pub environment: String,
    /// Handlers attached to the integration's parsed-exception bus
    pub subscribers: Vec<Subscriber<ExceptionParsed>>,
    pub initialized_events: Arc<EventBus<IntegrationInitialized>>,
}

impl fmt::Debug for SetupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupContext")
            .field("endpoint", &self.endpoint)
            .field("credential", &"<redacted>")
            .field("environment", &self.environment)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl SetupContext {
    pub fn new(endpoint: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: credential.into(),
            environment: "production".to_string(),
            subscribers: Vec::new(),
            initialized_events: Arc::new(EventBus::new()),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_subscriber(mut self, subscriber: Subscriber<ExceptionParsed>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn with_initialized_events(mut self, bus: Arc<EventBus<IntegrationInitialized>>) -> Self {
        self.initialized_events = bus;
        self
    }

    /// Attach the configured subscribers to `bus`.
    pub fn attach_subscribers(&self, bus: &EventBus<ExceptionParsed>) {
        for subscriber in &self.subscribers {
            bus.subscribe_shared(subscriber.clone());
        }
    }

    /// Publish that `kind` finished setup.
    pub fn announce(&self, kind: IntegrationKind) {
        self.initialized_events
            .notify(&IntegrationInitialized::new(kind));
    }
}

/// A host hook point wired into the capture pipeline
pub trait Integration: Send + Sync + 'static {
    fn kind(&self) -> IntegrationKind;

    fn state(&self) -> LifecycleState;

    /// Install the hook if the host is present. Calling it again once
    /// initialized changes nothing.
    fn setup(&self, context: &SetupContext) -> LifecycleState;

    /// Remove the hook and drop every subscriber. Safe to call repeatedly.
    fn revert(&self) -> LifecycleState;

    /// Run the pipeline on `exception` and publish the result.
    fn invoke(&self, exception: &RaisedException) -> StructuredException;

    fn parsed_events(&self) -> &EventBus<ExceptionParsed>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Build the structured exception and publish it on `events`.
pub fn capture_and_publish(
    chain: &CallbackChain,
    events: &EventBus<ExceptionParsed>,
    kind: IntegrationKind,
    exception: &RaisedException,
    request: Option<RequestInfo>,
) -> StructuredException {
    let data = chain.run(exception);
    let event = ExceptionParsed::new(kind, data.clone()).with_request(request);

    let report = events.notify(&event);
    debug!(
        "Published exception {} from {} to {} subscribers ({} failed)",
        event.event_id,
        kind,
        report.invoked,
        report.failures.len()
    );

    data
}

/// Ordered set of integrations, one per kind
#[derive(Clone, Default)]
pub struct IntegrationRegistry {
    entries: Vec<(IntegrationKind, Arc<dyn Integration>)>,
}

impl fmt::Debug for IntegrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(kind, integration)| (kind, integration.state())))
            .finish()
    }
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `integration` unless its kind is already registered.
    ///
    /// Returns the instance that is registered for the kind afterwards.
    pub fn register(&mut self, integration: Arc<dyn Integration>) -> Arc<dyn Integration> {
        let kind = integration.kind();
        if let Some(existing) = self.get(kind) {
            debug!("Integration {} already registered, keeping existing instance", kind);
            return existing.clone();
        }
        self.entries.push((kind, integration.clone()));
        integration
    }

    pub fn get(&self, kind: IntegrationKind) -> Option<&Arc<dyn Integration>> {
        self.entries
            .iter()
            .find(|(registered, _)| *registered == kind)
            .map(|(_, integration)| integration)
    }

    pub fn remove(&mut self, kind: IntegrationKind) -> Option<Arc<dyn Integration>> {
        let position = self.entries.iter().position(|(registered, _)| *registered == kind)?;
        Some(self.entries.remove(position).1)
    }

    /// Integrations in registration order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<dyn Integration>> {
        self.entries.iter().map(|(_, integration)| integration)
    }

    pub fn kinds(&self) -> Vec<IntegrationKind> {
        self.entries.iter().map(|(kind, _)| *kind).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
