//! Per-request and per-thread capture state
//!
//! Two pieces of state keep a single failure from being reported twice:
//!
//! - the capture scope, a task-local slot set up by request-level
//!   integrations; a panic inside it is parked in the slot instead of being
//!   reported by the process-wide hook
//! - the capture guard, a thread-local flag raised while the SDK itself is
//!   capturing or delivering, so failures inside that work are not captured
//!
//! [`catch_isolated`] runs SDK-internal work so that a panic inside it never
//! escapes, even when called from a panic hook.

use std::any::Any;
use std::cell::Cell;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crate::exception::RaisedException;

/// Slot holding the exception raised inside the current capture scope
pub type CaptureSlot = Arc<Mutex<Option<RaisedException>>>;

tokio::task_local! {
    static CAPTURE_SCOPE: CaptureSlot;
}

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
}

/// Run `future` with `slot` as its capture scope.
pub async fn run_in_capture_scope<F>(slot: CaptureSlot, future: F) -> F::Output
where
    F: Future,
{
    CAPTURE_SCOPE.scope(slot, future).await
}

pub fn in_capture_scope() -> bool {
    CAPTURE_SCOPE.try_with(|_| ()).is_ok()
}

/// Park `exception` in the enclosing capture scope.
///
/// Hands the exception back when no scope is active. A later panic replaces
/// an earlier one: a panic the handler recovered from is superseded by the
/// one that escapes the scope.
pub fn stash_in_scope(exception: RaisedException) -> Result<(), RaisedException> {
    let mut pending = Some(exception);
    let stored = CAPTURE_SCOPE.try_with(|slot| {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = pending.take();
    });

    match (stored, pending) {
        (Err(_), Some(exception)) => Err(exception),
        _ => Ok(()),
    }
}

/// Marks the current thread as busy capturing.
///
/// Dropping the guard clears the mark.
#[derive(Debug)]
pub struct CaptureGuard {
    _private: (),
}

impl CaptureGuard {
    /// `None` when the thread is already capturing.
    pub fn enter() -> Option<Self> {
        CAPTURING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(Self { _private: () })
            }
        })
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURING.with(|flag| flag.set(false));
    }
}

pub fn is_capturing() -> bool {
    CAPTURING.with(Cell::get)
}

/// Run `work`, catching any panic it raises.
///
/// Unwinding while the thread is already panicking aborts the process, so
/// from a panic hook or a `Drop` during unwind the work runs on a helper
/// thread marked as capturing.
pub fn catch_isolated<R, F>(work: F) -> std::thread::Result<R>
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    if !std::thread::panicking() {
        return catch_unwind(AssertUnwindSafe(work));
    }

    std::thread::scope(|scope| {
        let helper = std::thread::Builder::new()
            .name("errly-isolated".to_string())
            .spawn_scoped(scope, move || {
                let _capturing = CaptureGuard::enter();
                catch_unwind(AssertUnwindSafe(work))
            });

        match helper {
            Ok(handle) => handle.join().unwrap_or_else(Err),
            Err(e) => {
                let payload: Box<dyn Any + Send> =
                    Box::new(format!("unable to start helper thread: {}", e));
                Err(payload)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::Traceback;

    fn exception(value: &str) -> RaisedException {
        RaisedException::new("panic", value, Traceback::empty())
    }

    #[test]
    fn test_guard_is_not_reentrant() {
        assert!(!is_capturing());
        let guard = CaptureGuard::enter().expect("first entry");
        assert!(is_capturing());
        assert!(CaptureGuard::enter().is_none());

        drop(guard);
        assert!(!is_capturing());
        assert!(CaptureGuard::enter().is_some());
    }

    #[test]
    fn test_stash_outside_scope_returns_exception() {
        assert!(!in_capture_scope());
        let returned = stash_in_scope(exception("lost")).unwrap_err();
        assert_eq!(returned.value(), "lost");
    }

    #[tokio::test]
    async fn test_latest_stashed_exception_wins() {
        let slot = CaptureSlot::default();

        run_in_capture_scope(slot.clone(), async {
            assert!(in_capture_scope());
            assert!(stash_in_scope(exception("recovered")).is_ok());
            assert!(stash_in_scope(exception("escaped")).is_ok());
        })
        .await;

        let stored = slot.lock().unwrap().take().unwrap();
        assert_eq!(stored.value(), "escaped");
        assert!(!in_capture_scope());
    }

    #[test]
    fn test_catch_isolated_returns_value() {
        assert_eq!(catch_isolated(|| 7).unwrap(), 7);
    }

    struct IsolateOnDrop(Arc<Mutex<Option<(bool, String)>>>);

    impl Drop for IsolateOnDrop {
        fn drop(&mut self) {
            let outcome = catch_isolated::<(), _>(|| panic!("failed during unwind"));
            let message = outcome
                .map(|_| String::new())
                .unwrap_or_else(|payload| crate::exception::payload_message(payload.as_ref()));
            *self.0.lock().unwrap() = Some((std::thread::panicking(), message));
        }
    }

    #[test]
    fn test_catch_isolated_survives_panic_while_unwinding() {
        let seen = Arc::new(Mutex::new(None));
        let guard = IsolateOnDrop(seen.clone());

        let result = std::panic::catch_unwind(AssertUnwindSafe(move || {
            let _guard = guard;
            panic!("outer failure");
        }));

        assert!(result.is_err());
        let (was_panicking, message) = seen.lock().unwrap().take().expect("drop ran");
        assert!(was_panicking);
        assert_eq!(message, "failed during unwind");
        assert!(!is_capturing());
    }
}
