//! # Parallel Join
//!
//! Builder-style fan-out/join. Registrations are collected first, then issued
//! together when [`ParallelJoin::run`] is awaited. The session completes once
//! every registration has succeeded or been recovered, and fails fast on the
//! first unrecoverable failure, cancelling every other outstanding request.
//!
//! All session state lives behind one per-session lock; callbacks may arrive
//! concurrently from any thread.

use crate::error::{WeaveError, WeaveResult};
use crate::request::{
    completion, CancelHandle, Callback, CompletionHandle, Delivery, FailureClassifier,
    RequestIssuer, StatusClassifier,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Recoverable = Arc<dyn Fn(&WeaveError) -> bool + Send + Sync>;

/// Issue thunk plus the weak cancel handle of its callback
struct ArmedRequest {
    cancel: CancelHandle,
    issue: Box<dyn FnOnce() + Send>,
}

type Arm = Box<dyn FnOnce(&Arc<JoinSession>, usize) -> ArmedRequest + Send>;

struct JoinState {
    pending: HashSet<usize>,
    cancels: Vec<(usize, CancelHandle)>,
    finished: bool,
}

struct JoinSession {
    id: Uuid,
    state: Mutex<JoinState>,
    handle: CompletionHandle<WeaveResult<()>>,
    classifier: Arc<dyn FailureClassifier>,
}

impl JoinSession {
    fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    fn succeed(&self, index: usize, on_success: impl FnOnce()) {
        let done = {
            let mut state = self.state.lock();
            if state.finished {
                debug!(session = %self.id, registration = index, "Ignoring delivery for finished join");
                return;
            }
            on_success();
            state.pending.remove(&index);
            if state.pending.is_empty() {
                state.finished = true;
            }
            state.finished
        };
        if done {
            debug!(session = %self.id, "All registrations resolved");
            self.handle.resolve(Ok(()));
        }
    }

    fn fail(&self, index: usize, error: WeaveError, recoverable: Option<&Recoverable>) {
        let siblings = {
            let mut state = self.state.lock();
            if state.finished {
                debug!(session = %self.id, registration = index, "Ignoring failure for finished join");
                return;
            }
            if recoverable.is_some_and(|predicate| predicate(&error)) {
                debug!(session = %self.id, registration = index, error = %error, "Recovered failure counts as resolved");
                state.pending.remove(&index);
                if state.pending.is_empty() {
                    state.finished = true;
                    drop(state);
                    self.handle.resolve(Ok(()));
                }
                return;
            }
            state.finished = true;
            std::mem::take(&mut state.cancels)
        };

        warn!(
            session = %self.id,
            registration = index,
            error = %error,
            "Parallel join failed fast; cancelling outstanding requests"
        );
        for (sibling, cancel) in siblings {
            if sibling != index {
                cancel.cancel();
            }
        }
        self.handle.resolve(Err(error));
    }

    fn cancel_all(&self) {
        let outstanding = {
            let mut state = self.state.lock();
            if state.finished {
                return;
            }
            state.finished = true;
            std::mem::take(&mut state.cancels)
        };
        info!(session = %self.id, outstanding = outstanding.len(), "Parallel join cancelled");
        for (_, cancel) in outstanding {
            cancel.cancel();
        }
        self.handle.cancel();
    }
}

/// Fails the session if a callback's sink is dropped without ever firing
struct AbandonGuard {
    session: Arc<JoinSession>,
    index: usize,
    fired: bool,
}

impl AbandonGuard {
    fn fire(mut self) -> Arc<JoinSession> {
        self.fired = true;
        Arc::clone(&self.session)
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.fired && !self.session.is_finished() {
            self.session.fail(self.index, WeaveError::Abandoned, None);
        }
    }
}

/// Cancels the whole session if the awaiting future is dropped
struct SessionGuard(Option<Arc<JoinSession>>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.0.take() {
            session.cancel_all();
        }
    }
}

/// Open-ended fan-out/join builder
pub struct ParallelJoin {
    registrations: Vec<Arm>,
    classifier: Arc<dyn FailureClassifier>,
}

impl Default for ParallelJoin {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParallelJoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelJoin")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

impl ParallelJoin {
    pub fn new() -> Self {
        Self::with_classifier(Arc::new(StatusClassifier::default()))
    }

    pub fn with_classifier(classifier: Arc<dyn FailureClassifier>) -> Self {
        Self {
            registrations: Vec::new(),
            classifier,
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Register a request whose failure fails the whole join
    pub fn await_api<T, I, S>(&mut self, issuer: I, on_success: S) -> &mut Self
    where
        T: Send + 'static,
        I: RequestIssuer<T>,
        S: FnOnce(T) + Send + 'static,
    {
        self.register(issuer, None, on_success)
    }

    /// Register a request whose failures matching `recoverable` count as resolved
    pub fn await_api_recoverable<T, I, R, S>(
        &mut self,
        issuer: I,
        recoverable: R,
        on_success: S,
    ) -> &mut Self
    where
        T: Send + 'static,
        I: RequestIssuer<T>,
        R: Fn(&WeaveError) -> bool + Send + Sync + 'static,
        S: FnOnce(T) + Send + 'static,
    {
        self.register(issuer, Some(Arc::new(recoverable)), on_success)
    }

    fn register<T, I, S>(
        &mut self,
        issuer: I,
        recoverable: Option<Recoverable>,
        on_success: S,
    ) -> &mut Self
    where
        T: Send + 'static,
        I: RequestIssuer<T>,
        S: FnOnce(T) + Send + 'static,
    {
        let arm: Arm = Box::new(move |session: &Arc<JoinSession>, index: usize| {
            let guard = AbandonGuard {
                session: Arc::clone(session),
                index,
                fired: false,
            };
            let callback = Callback::new(move |delivery: Delivery<T>| {
                let session = guard.fire();
                match delivery {
                    Delivery::Success(response) => {
                        session.succeed(index, move || on_success(response.body));
                    }
                    Delivery::Failure(envelope) => {
                        let error = WeaveError::classify(envelope, session.classifier.as_ref());
                        session.fail(index, error, recoverable.as_ref());
                    }
                }
            });
            ArmedRequest {
                cancel: callback.cancel_handle(),
                issue: Box::new(move || issuer(callback)),
            }
        });
        self.registrations.push(arm);
        self
    }

    /// Issue every registration and wait for the join to settle
    pub async fn run(self) -> WeaveResult<()> {
        if self.registrations.is_empty() {
            debug!("Parallel join with no registrations resolves immediately");
            return Ok(());
        }

        let (handle, done) = completion();
        let count = self.registrations.len();
        let session = Arc::new(JoinSession {
            id: Uuid::new_v4(),
            state: Mutex::new(JoinState {
                pending: (0..count).collect(),
                cancels: Vec::with_capacity(count),
                finished: false,
            }),
            handle,
            classifier: self.classifier,
        });
        debug!(session = %session.id, registrations = count, "Starting parallel join");

        let armed: Vec<ArmedRequest> = self
            .registrations
            .into_iter()
            .enumerate()
            .map(|(index, arm)| arm(&session, index))
            .collect();
        session.state.lock().cancels = armed
            .iter()
            .enumerate()
            .map(|(index, request)| (index, request.cancel.clone()))
            .collect();

        let mut guard = SessionGuard(Some(Arc::clone(&session)));
        for (index, request) in armed.into_iter().enumerate() {
            if session.is_finished() {
                debug!(session = %session.id, registration = index, "Join already settled; not issuing");
                continue;
            }
            (request.issue)();
        }

        let result = done.await;
        guard.0 = None;
        result?
    }
}

/// Build a join in `build`, then issue everything and wait
pub async fn in_parallel<F>(build: F) -> WeaveResult<()>
where
    F: FnOnce(&mut ParallelJoin),
{
    let mut join = ParallelJoin::new();
    build(&mut join);
    join.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{FailureEnvelope, RawResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_empty_join_resolves_immediately() {
        assert!(in_parallel(|_| {}).await.is_ok());
    }

    #[tokio::test]
    async fn test_on_success_fires_per_registration() {
        let total = Arc::new(AtomicUsize::new(0));
        let (t1, t2) = (Arc::clone(&total), Arc::clone(&total));
        in_parallel(|join| {
            join.await_api(
                |cb: Callback<usize>| {
                    cb.on_success(2, None);
                },
                move |v| {
                    t1.fetch_add(v, Ordering::SeqCst);
                },
            )
            .await_api(
                |cb: Callback<usize>| {
                    cb.on_success(3, None);
                },
                move |v| {
                    t2.fetch_add(v, Ordering::SeqCst);
                },
            );
        })
        .await
        .unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_synchronous_failure_skips_later_issuers() {
        let issued = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&issued);
        let result = in_parallel(|join| {
            join.await_api(
                |cb: Callback<u8>| {
                    cb.on_failure(FailureEnvelope::from_response(RawResponse::new(500)));
                },
                |_| {},
            )
            .await_api(
                move |_cb: Callback<u8>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                |_| {},
            );
        })
        .await;
        assert!(matches!(result, Err(WeaveError::Api(_))));
        assert_eq!(issued.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_callback_fails_join() {
        let result = in_parallel(|join| {
            join.await_api(|cb: Callback<u8>| drop(cb), |_| {});
        })
        .await;
        assert!(matches!(result, Err(WeaveError::Abandoned)));
    }
}
