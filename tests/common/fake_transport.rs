//! Scripted request issuers standing in for a real network client.

use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use weave_core::pagination::PageRequest;
use weave_core::request::{Callback, FailureEnvelope, RawResponse, RequestRef};

/// How a scripted request resolves its callback
#[derive(Debug, Clone)]
pub enum Script<T> {
    /// Resolve before the issuer returns
    Succeed(T, Option<String>),
    /// Resolve from another thread after a delay
    SucceedAfter(Duration, T, Option<String>),
    /// Fail with this status before the issuer returns
    Fail(u16),
    /// Fail with this status from another thread after a delay
    FailAfter(Duration, u16),
    /// Keep the callback alive and never resolve it
    Never,
}

#[derive(Default)]
struct TransportStats {
    issued: AtomicUsize,
    cancelled: AtomicUsize,
}

/// Counts issues and cancels across every issuer it hands out
#[derive(Clone, Default)]
pub struct FakeTransport {
    stats: Arc<TransportStats>,
    parked: Arc<Mutex<Vec<Box<dyn Any + Send>>>>,
}

pub fn failure(status: u16) -> FailureEnvelope {
    FailureEnvelope::from_response(RawResponse::new(status).with_body(r#"{"error":"scripted"}"#))
        .with_request(RequestRef::new("GET", "https://lms.example/api/v1/fake"))
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> usize {
        self.stats.issued.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.stats.cancelled.load(Ordering::SeqCst)
    }

    /// Callbacks held by `Script::Never` issuers, in issue order
    pub fn parked<T: 'static>(&self) -> Vec<Callback<T>> {
        self.parked
            .lock()
            .iter()
            .filter_map(|callback| callback.downcast_ref::<Callback<T>>().cloned())
            .collect()
    }

    pub fn issuer<T>(&self, script: Script<T>) -> impl FnOnce(Callback<T>) + Send + 'static
    where
        T: Send + 'static,
    {
        let transport = self.clone();
        move |callback: Callback<T>| transport.deliver(script, callback)
    }

    /// Unified page issuer serving `pages` in order, each after `delay`
    pub fn pages<T>(
        &self,
        pages: Vec<(T, Option<String>)>,
        delay: Option<Duration>,
    ) -> impl FnMut(&PageRequest, Callback<T>) + Send + 'static
    where
        T: Clone + Send + 'static,
    {
        let transport = self.clone();
        move |request: &PageRequest, callback: Callback<T>| {
            let script = match pages.get(request.index()) {
                Some((payload, next)) => match delay {
                    Some(delay) => Script::SucceedAfter(delay, payload.clone(), next.clone()),
                    None => Script::Succeed(payload.clone(), next.clone()),
                },
                None => Script::Fail(404),
            };
            transport.deliver(script, callback);
        }
    }

    fn deliver<T: Send + 'static>(&self, script: Script<T>, callback: Callback<T>) {
        self.stats.issued.fetch_add(1, Ordering::SeqCst);
        let stats = Arc::clone(&self.stats);
        callback.on_cancel(move || {
            stats.cancelled.fetch_add(1, Ordering::SeqCst);
        });

        match script {
            Script::Succeed(payload, next) => {
                callback.on_success(payload, next);
            }
            Script::SucceedAfter(delay, payload, next) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    callback.on_success(payload, next);
                });
            }
            Script::Fail(status) => {
                callback.on_failure(failure(status));
            }
            Script::FailAfter(delay, status) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    callback.on_failure(failure(status));
                });
            }
            Script::Never => self.parked.lock().push(Box::new(callback)),
        }
    }
}
