use std::any::Any;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::Router;
use errly_core::{
    capture_and_publish, CallbackChain, EventBus, ExceptionParsed, HostProbe, Integration,
    IntegrationKind, Lifecycle, LifecycleState, RaisedException, SetupContext,
    StructuredException,
};
use tracing::debug;

use crate::middleware::{capture_panics, HookSlot, RequestCapture};

fn axum_present() -> bool {
    true
}

/// Reports panics raised while axum handles a request.
///
/// Routers built with [`AxumIntegration::attach`] keep the middleware for
/// their whole life; reverting the integration disarms it instead.
pub struct AxumIntegration {
    lifecycle: Lifecycle,
    chain: CallbackChain,
    events: Arc<EventBus<ExceptionParsed>>,
    slot: HookSlot,
}

impl Default for AxumIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AxumIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AxumIntegration")
            .field("lifecycle", &self.lifecycle)
            .field("slot", &self.slot)
            .field("subscribers", &self.events.len())
            .finish()
    }
}

impl AxumIntegration {
    pub fn new() -> Self {
        Self::with_chain(CallbackChain::new())
    }

    pub fn with_chain(chain: CallbackChain) -> Self {
        Self::with_host_probe(chain, axum_present)
    }

    pub fn with_host_probe(chain: CallbackChain, probe: HostProbe) -> Self {
        Self {
            lifecycle: Lifecycle::new(IntegrationKind::Axum, probe),
            chain,
            events: Arc::new(EventBus::new()),
            slot: HookSlot::default(),
        }
    }

    /// Add the capture middleware to `router`.
    pub fn attach<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let slot = self.slot.clone();
        router.layer(middleware::from_fn(move |request: Request, next: Next| {
            let slot = slot.clone();
            async move { capture_panics(slot, request, next).await }
        }))
    }

    pub fn hook_slot(&self) -> HookSlot {
        self.slot.clone()
    }
}

impl Integration for AxumIntegration {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Axum
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn setup(&self, context: &SetupContext) -> LifecycleState {
        self.lifecycle.setup(context, || {
            context.attach_subscribers(&self.events);
            self.slot.store(Some(Arc::new(RequestCapture {
                chain: self.chain.clone(),
                events: self.events.clone(),
            })));
            debug!("axum capture middleware armed");
            true
        })
    }

    fn revert(&self) -> LifecycleState {
        self.lifecycle.transition_down(|| {
            self.slot.store(None);
            self.events.unsubscribe_all();
            debug!("axum capture middleware disarmed");
        })
    }

    fn invoke(&self, exception: &RaisedException) -> StructuredException {
        capture_and_publish(&self.chain, &self.events, IntegrationKind::Axum, exception, None)
    }

    fn parsed_events(&self) -> &EventBus<ExceptionParsed> {
        &self.events
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_arms_and_revert_disarms_slot() {
        let integration = AxumIntegration::new();
        let slot = integration.hook_slot();
        assert!(!slot.is_armed());

        integration.setup(&SetupContext::new("https://errly.test", "key"));
        assert!(slot.is_armed());

        integration.revert();
        assert!(!slot.is_armed());
    }

    #[test]
    fn test_absent_framework_is_not_an_error() {
        let integration = AxumIntegration::with_host_probe(CallbackChain::new(), || false);

        let state = integration.setup(&SetupContext::new("https://errly.test", "key"));

        assert_eq!(state, LifecycleState::Uninitialized);
        assert!(!integration.hook_slot().is_armed());
        assert_eq!(integration.revert(), LifecycleState::Uninitialized);
    }
}
