use std::any::Any;
use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use errly_core::scope::{self, CaptureGuard};
use errly_core::{
    capture_and_publish, CallbackChain, EventBus, ExceptionParsed, HostProbe, Integration,
    IntegrationKind, Lifecycle, LifecycleState, RaisedException, SetupContext,
    StructuredException,
};
use tracing::{debug, warn};

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// Set while some [`PanicHookIntegration`] owns the process panic hook
static HOOK_OWNED: AtomicBool = AtomicBool::new(false);

fn panic_runtime_present() -> bool {
    true
}

struct HookState {
    chain: CallbackChain,
    events: EventBus<ExceptionParsed>,
    original: RwLock<Option<PanicHook>>,
}

impl HookState {
    fn handle(&self, info: &PanicHookInfo<'_>) {
        if let Some(_capturing) = CaptureGuard::enter() {
            let exception = RaisedException::from_panic(info);

            // Inside a request scope the web integration reports the panic.
            match scope::stash_in_scope(exception) {
                Ok(()) => debug!("Panic parked in request capture scope"),
                Err(exception) => {
                    capture_and_publish(
                        &self.chain,
                        &self.events,
                        IntegrationKind::PanicHook,
                        &exception,
                        None,
                    );
                }
            }
        }

        let original = self.original.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(hook) = original.as_ref() {
            hook(info);
        }
    }
}

/// Reports every panic in the process, then runs the hook it replaced.
///
/// Only one instance can own the process hook at a time; setting up a second
/// instance while the first is initialized leaves the second uninitialized.
pub struct PanicHookIntegration {
    lifecycle: Lifecycle,
    state: Arc<HookState>,
}

impl Default for PanicHookIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PanicHookIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanicHookIntegration")
            .field("lifecycle", &self.lifecycle)
            .field("chain", &self.state.chain)
            .field("subscribers", &self.state.events.len())
            .finish()
    }
}

impl PanicHookIntegration {
    pub fn new() -> Self {
        Self::with_chain(CallbackChain::new())
    }

    pub fn with_chain(chain: CallbackChain) -> Self {
        Self::with_host_probe(chain, panic_runtime_present)
    }

    pub fn with_host_probe(chain: CallbackChain, probe: HostProbe) -> Self {
        Self {
            lifecycle: Lifecycle::new(IntegrationKind::PanicHook, probe),
            state: Arc::new(HookState {
                chain,
                events: EventBus::new(),
                original: RwLock::new(None),
            }),
        }
    }

    fn install(&self, context: &SetupContext) -> bool {
        if HOOK_OWNED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Process panic hook is already owned by another Errly integration");
            return false;
        }

        context.attach_subscribers(&self.state.events);

        let previous = panic::take_hook();
        *self
            .state
            .original
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(previous);

        let state = self.state.clone();
        panic::set_hook(Box::new(move |info| state.handle(info)));
        debug!("Panic hook installed");
        true
    }

    fn uninstall(&self) {
        let original = self
            .state
            .original
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match original {
            Some(hook) => panic::set_hook(hook),
            None => drop(panic::take_hook()),
        }

        self.state.events.unsubscribe_all();
        HOOK_OWNED.store(false, Ordering::SeqCst);
        debug!("Panic hook restored");
    }
}

impl Integration for PanicHookIntegration {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::PanicHook
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn setup(&self, context: &SetupContext) -> LifecycleState {
        self.lifecycle.setup(context, || self.install(context))
    }

    fn revert(&self) -> LifecycleState {
        self.lifecycle.transition_down(|| self.uninstall())
    }

    fn invoke(&self, exception: &RaisedException) -> StructuredException {
        capture_and_publish(
            &self.state.chain,
            &self.state.events,
            IntegrationKind::PanicHook,
            exception,
            None,
        )
    }

    fn parsed_events(&self) -> &EventBus<ExceptionParsed> {
        &self.state.events
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
