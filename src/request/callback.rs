//! The request/callback contract every adapter builds on.
//!
//! An issuer receives a `Callback<T>` and must invoke exactly one of
//! `on_success`/`on_response`/`on_failure`. Extra invocations, and invocations
//! after `cancel()`, are dropped. Transports register abort hooks with
//! `on_cancel` to stop in-flight work when the awaiting side goes away.

use super::completion::HandlePhase;
use super::envelope::{ApiResponse, FailureEnvelope};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Outcome delivered through a callback
#[derive(Debug)]
pub enum Delivery<T> {
    Success(ApiResponse<T>),
    Failure(FailureEnvelope),
}

type Sink<T> = Box<dyn FnOnce(Delivery<T>) + Send>;
type CancelHook = Box<dyn FnOnce() + Send>;

struct CallbackState<T> {
    phase: HandlePhase,
    sink: Option<Sink<T>>,
    cancel_hooks: Vec<CancelHook>,
}

/// Single-use callback handed to a request issuer
pub struct Callback<T> {
    state: Arc<Mutex<CallbackState<T>>>,
}

impl<T> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("phase", &self.phase())
            .finish()
    }
}

impl<T: Send + 'static> Callback<T> {
    /// Create a callback routing its single delivery into `sink`
    pub fn new(sink: impl FnOnce(Delivery<T>) + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(CallbackState {
                phase: HandlePhase::Active,
                sink: Some(Box::new(sink)),
                cancel_hooks: Vec::new(),
            })),
        }
    }

    /// Deliver a payload plus optional continuation metadata
    pub fn on_success(&self, payload: T, continuation: Option<String>) -> bool {
        self.deliver(Delivery::Success(
            ApiResponse::new(payload).with_next_url(continuation),
        ))
    }

    /// Deliver a full response envelope (status, headers, continuation)
    pub fn on_response(&self, response: ApiResponse<T>) -> bool {
        self.deliver(Delivery::Success(response))
    }

    pub fn on_failure(&self, failure: FailureEnvelope) -> bool {
        self.deliver(Delivery::Failure(failure))
    }

    fn deliver(&self, delivery: Delivery<T>) -> bool {
        let sink = {
            let mut state = self.state.lock();
            if state.phase != HandlePhase::Active {
                debug!(phase = %state.phase, "Dropping late callback delivery");
                return false;
            }
            state.phase = HandlePhase::Completed;
            state.cancel_hooks.clear();
            state.sink.take()
        };
        match sink {
            Some(sink) => {
                sink(delivery);
                true
            }
            None => false,
        }
    }

    /// Register a best-effort abort hook; runs immediately if already cancelled
    pub fn on_cancel(&self, hook: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        let phase = state.phase;
        match phase {
            HandlePhase::Active => state.cancel_hooks.push(Box::new(hook)),
            HandlePhase::Cancelled => {
                drop(state);
                hook();
            }
            HandlePhase::Completed => {}
        }
    }

    /// Cancel the request; the sink is released and abort hooks run
    pub fn cancel(&self) -> bool {
        cancel_state(&self.state)
    }

    /// Weak cancellation handle that does not keep the callback alive
    pub fn cancel_handle(&self) -> CancelHandle {
        let weak: Weak<Mutex<CallbackState<T>>> = Arc::downgrade(&self.state);
        CancelHandle { target: weak }
    }
}

impl<T> Callback<T> {
    pub fn phase(&self) -> HandlePhase {
        self.state.lock().phase
    }

    pub fn is_active(&self) -> bool {
        self.phase() == HandlePhase::Active
    }

    pub fn is_cancelled(&self) -> bool {
        self.phase() == HandlePhase::Cancelled
    }
}

fn cancel_state<T>(state: &Mutex<CallbackState<T>>) -> bool {
    let (sink, hooks) = {
        let mut state = state.lock();
        if state.phase != HandlePhase::Active {
            return false;
        }
        state.phase = HandlePhase::Cancelled;
        (state.sink.take(), std::mem::take(&mut state.cancel_hooks))
    };
    // Dropping the sink releases whatever the awaiting side is parked on
    drop(sink);
    for hook in hooks {
        hook();
    }
    true
}

/// Type-erased cancellation target
pub trait Cancellable: Send + Sync {
    fn cancel(&self) -> bool;
}

impl<T: Send> Cancellable for Mutex<CallbackState<T>> {
    fn cancel(&self) -> bool {
        cancel_state(self)
    }
}

/// Weak handle used by sessions to cancel outstanding callbacks
#[derive(Clone)]
pub struct CancelHandle {
    target: Weak<dyn Cancellable>,
}

impl CancelHandle {
    /// Cancel if the callback is still alive and unresolved
    pub fn cancel(&self) -> bool {
        self.target
            .upgrade()
            .map(|target| target.cancel())
            .unwrap_or(false)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("alive", &(self.target.strong_count() > 0))
            .finish()
    }
}

/// Cancels the wrapped callback when dropped unless disarmed first
pub(crate) struct CancelOnDrop {
    handle: Option<CancelHandle>,
}

impl CancelOnDrop {
    pub(crate) fn new(handle: CancelHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub(crate) fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.cancel() {
                debug!("Awaiting side dropped; cancelled in-flight request");
            }
        }
    }
}

/// Issues one request and resolves the callback exactly once
pub trait RequestIssuer<T>: FnOnce(Callback<T>) + Send + 'static {}

impl<T, F> RequestIssuer<T> for F where F: FnOnce(Callback<T>) + Send + 'static {}
