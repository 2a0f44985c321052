use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use errly_core::scope::{run_in_capture_scope, CaptureSlot};
use errly_core::{
    capture_and_publish, CallbackChain, EventBus, ExceptionParsed, IntegrationKind,
    RaisedException, RequestInfo, StructuredException, Traceback,
};
use errly_core::exception::payload_message;
use futures::FutureExt;
use tracing::debug;

/// Capture state the middleware reports through while armed
pub(crate) struct RequestCapture {
    pub(crate) chain: CallbackChain,
    pub(crate) events: Arc<EventBus<ExceptionParsed>>,
}

impl RequestCapture {
    fn capture(&self, exception: &RaisedException, request: RequestInfo) -> StructuredException {
        capture_and_publish(
            &self.chain,
            &self.events,
            IntegrationKind::Axum,
            exception,
            Some(request),
        )
    }
}

/// Shared, swappable reference from a router's middleware to its integration.
///
/// An empty slot turns the middleware into a pass-through.
#[derive(Clone, Default)]
pub struct HookSlot {
    inner: Arc<RwLock<Option<Arc<RequestCapture>>>>,
}

impl std::fmt::Debug for HookSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSlot")
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl HookSlot {
    pub fn is_armed(&self) -> bool {
        self.load().is_some()
    }

    pub(crate) fn load(&self) -> Option<Arc<RequestCapture>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn store(&self, capture: Option<Arc<RequestCapture>>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = capture;
    }
}

/// Run the rest of the stack, reporting a panic that unwinds out of it.
///
/// The panic is resumed after capture so outer layers handle it as if the
/// middleware were not there.
pub async fn capture_panics(slot: HookSlot, request: Request, next: Next) -> Response {
    let Some(capture) = slot.load() else {
        return next.run(request).await;
    };

    let info = RequestInfo {
        method: request.method().to_string(),
        url: request.uri().to_string(),
    };

    let parked = CaptureSlot::default();
    let outcome = run_in_capture_scope(
        parked.clone(),
        AssertUnwindSafe(next.run(request)).catch_unwind(),
    )
    .await;

    match outcome {
        Ok(response) => response,
        Err(payload) => {
            let escaped = payload_message(payload.as_ref());
            let exception = parked
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .filter(|parked| parked.value() == escaped)
                .unwrap_or_else(|| {
                    debug!("No panic hook trace for {} {}, using catch point", info.method, info.url);
                    RaisedException::from_panic_payload(payload.as_ref(), Traceback::capture())
                });

            capture.capture(&exception, info);
            std::panic::resume_unwind(payload)
        }
    }
}
