//! # Try/Catch Combinator
//!
//! Pairs a unit of work with an error handler and a lane. Errors other than
//! the cancellation signal (and panics) are routed to the handler, which always
//! runs on the serialized foreground lane. Cancellation is expected and never
//! reaches the handler.
//!
//! Two flavors: [`try_weave`] launches a new top-level [`WeaveJob`], and
//! [`WeaveScope::try_launch`] attaches the same policy to a scope that owns its
//! children.

use super::lanes::{join_error, panic_message, Dispatcher, Lane};
use crate::error::{is_cancellation, WeaveError, WeaveResult};
use dashmap::DashMap;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Handle to a launched unit of work
pub struct WeaveJob {
    id: Uuid,
    lane: Lane,
    handle: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl fmt::Debug for WeaveJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeaveJob")
            .field("id", &self.id)
            .field("lane", &self.lane)
            .field("active", &self.is_active())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl WeaveJob {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    /// Cancel the job at its next suspension point
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            debug!(job = %self.id, lane = %self.lane, "Cancelling weave job");
        }
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Wait for the job to finish. Errors routed to a handler count as finished;
    /// a cancelled job yields `Cancelled`.
    pub async fn join(self) -> WeaveResult<()> {
        self.handle.await.map_err(join_error)
    }
}

type Handler = Box<dyn FnOnce(anyhow::Error) + Send>;

/// Run `body`, routing every non-cancellation failure to `handler` exactly once
async fn run_guarded<F>(id: Uuid, lane: Lane, dispatcher: Dispatcher, body: F, handler: Handler)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let failure = match AssertUnwindSafe(body).catch_unwind().await {
        Ok(Ok(())) => {
            debug!(job = %id, lane = %lane, "Weave job completed");
            return;
        }
        Ok(Err(error)) if is_cancellation(&error) => {
            debug!(job = %id, lane = %lane, "Weave job cancelled; not routed to handler");
            return;
        }
        Ok(Err(error)) => error,
        Err(panic) => anyhow::Error::new(WeaveError::Panicked(panic_message(panic.as_ref()))),
    };

    debug!(job = %id, lane = %lane, error = %failure, "Routing weave failure to handler");
    if lane == Lane::Foreground {
        handler(failure);
        return;
    }
    let routed = dispatcher
        .spawn(Lane::Foreground, async move { handler(failure) })
        .await;
    if let Err(join) = routed {
        error!(job = %id, error = %join, "Weave failure handler did not complete");
    }
}

fn launch<F>(dispatcher: &Dispatcher, lane: Lane, body: F, handler: Handler) -> WeaveJob
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let id = Uuid::new_v4();
    let handle = dispatcher.spawn(
        lane,
        run_guarded(id, lane, dispatcher.clone(), body, handler),
    );
    debug!(job = %id, lane = %lane, "Weave job launched");
    WeaveJob {
        id,
        lane,
        handle,
        cancelled: Arc::new(AtomicBool::new(false)),
    }
}

/// Unit of work waiting for its error handler
#[must_use = "a TryWeave does nothing until `catch` is called"]
pub struct TryWeave<F> {
    lane: Lane,
    body: F,
    dispatcher: Option<Dispatcher>,
}

impl<F> TryWeave<F>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    /// Launch on a specific dispatcher instead of the global one
    pub fn on(mut self, dispatcher: &Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher.clone());
        self
    }

    /// Attach the handler and launch as a new top-level job
    pub fn catch<H>(self, handler: H) -> WeaveJob
    where
        H: FnOnce(anyhow::Error) + Send + 'static,
    {
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Dispatcher::global().clone());
        launch(&dispatcher, self.lane, self.body, Box::new(handler))
    }
}

/// Pair `body` with a lane; the handler is attached with [`TryWeave::catch`]
pub fn try_weave<F>(lane: Lane, body: F) -> TryWeave<F>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    TryWeave {
        lane,
        body,
        dispatcher: None,
    }
}

/// Launch without a handler; failures are logged
pub fn weave<F>(lane: Lane, body: F) -> WeaveJob
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    try_weave(lane, body).catch(move |failure| {
        error!(lane = %lane, error = %failure, "Unhandled weave failure");
    })
}

/// Scope's view of a child: enough to abort it and mark its handle cancelled
struct ScopedChild {
    abort: AbortHandle,
    cancelled: Arc<AtomicBool>,
}

impl ScopedChild {
    fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.abort.abort();
    }
}

struct ScopeInner {
    id: Uuid,
    lane: Lane,
    dispatcher: Dispatcher,
    children: DashMap<Uuid, ScopedChild>,
    cancelled: AtomicBool,
}

impl ScopeInner {
    fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for child in self.children.iter() {
            if !child.value().is_finished() {
                child.value().cancel();
                cancelled += 1;
            }
        }
        self.children.clear();
        cancelled
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let cancelled = self.cancel_all();
        if cancelled > 0 {
            debug!(scope = %self.id, cancelled, "Scope dropped; cancelled children");
        }
    }
}

/// Structured scope owning the jobs launched into it.
///
/// Cancelling the scope (or dropping its last clone) cancels every child.
#[derive(Clone)]
pub struct WeaveScope {
    inner: Arc<ScopeInner>,
}

impl fmt::Debug for WeaveScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeaveScope")
            .field("id", &self.inner.id)
            .field("lane", &self.inner.lane)
            .field("active_jobs", &self.active_jobs())
            .finish()
    }
}

impl WeaveScope {
    pub fn new(lane: Lane) -> Self {
        Self::with_dispatcher(lane, Dispatcher::global())
    }

    pub fn with_dispatcher(lane: Lane, dispatcher: &Dispatcher) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: Uuid::new_v4(),
                lane,
                dispatcher: dispatcher.clone(),
                children: DashMap::new(),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    pub fn lane(&self) -> Lane {
        self.inner.lane
    }

    /// Pair `body` with this scope; the handler is attached with [`ScopedTryWeave::catch`]
    pub fn try_launch<F>(&self, body: F) -> ScopedTryWeave<'_, F>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        ScopedTryWeave { scope: self, body }
    }

    /// Cancel every running child; later launches start out cancelled
    pub fn cancel_all(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let cancelled = self.inner.cancel_all();
        info!(scope = %self.inner.id, cancelled, "Weave scope cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn active_jobs(&self) -> usize {
        self.inner
            .children
            .iter()
            .filter(|child| !child.value().is_finished())
            .count()
    }

    fn adopt(&self, job: &WeaveJob) {
        self.inner
            .children
            .retain(|_, child| !child.is_finished());
        self.inner.children.insert(
            job.id,
            ScopedChild {
                abort: job.handle.abort_handle(),
                cancelled: Arc::clone(&job.cancelled),
            },
        );
        if self.is_cancelled() {
            job.cancel();
        }
    }
}

/// Unit of work bound to a scope, waiting for its error handler
#[must_use = "a ScopedTryWeave does nothing until `catch` is called"]
pub struct ScopedTryWeave<'a, F> {
    scope: &'a WeaveScope,
    body: F,
}

impl<F> ScopedTryWeave<'_, F>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn catch<H>(self, handler: H) -> WeaveJob
    where
        H: FnOnce(anyhow::Error) + Send + 'static,
    {
        let inner = &self.scope.inner;
        let job = launch(&inner.dispatcher, inner.lane, self.body, Box::new(handler));
        self.scope.adopt(&job);
        job
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_error_routes_to_handler_on_foreground() {
        let (tx, rx) = oneshot::channel();
        let job = try_weave(Lane::Background, async { Err(anyhow::anyhow!("bad input")) }).catch(
            move |error| {
                let thread = std::thread::current().name().map(str::to_string);
                let _ = tx.send((error.to_string(), thread));
            },
        );
        job.join().await.unwrap();

        let (message, thread) = rx.await.unwrap();
        assert_eq!(message, "bad input");
        assert_eq!(thread.as_deref(), Some("weave-foreground"));
    }

    #[tokio::test]
    async fn test_cancellation_is_swallowed() {
        let (tx, rx) = oneshot::channel::<()>();
        let job = try_weave(Lane::Foreground, async {
            Err(anyhow::Error::new(WeaveError::Cancelled).context("while loading roster"))
        })
        .catch(move |_| {
            let _ = tx.send(());
        });
        job.join().await.unwrap();
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_job_reports_cancelled() {
        let job = weave(Lane::Background, async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(())
        });
        job.cancel();
        assert!(job.is_cancelled());
        assert!(matches!(job.join().await, Err(WeaveError::Cancelled)));
    }

    #[tokio::test]
    async fn test_scope_cancel_marks_children_cancelled() {
        let scope = WeaveScope::new(Lane::Background);
        let sleeper = || async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(())
        };
        let cancelled_by_scope = scope.try_launch(sleeper()).catch(|_| {});
        assert!(!cancelled_by_scope.is_cancelled());

        scope.cancel_all();
        assert!(cancelled_by_scope.is_cancelled());
        assert!(matches!(cancelled_by_scope.join().await, Err(WeaveError::Cancelled)));

        let dropped_scope = WeaveScope::new(Lane::Background);
        let orphan = dropped_scope.try_launch(sleeper()).catch(|_| {});
        drop(dropped_scope);
        assert!(orphan.is_cancelled());
        assert!(matches!(orphan.join().await, Err(WeaveError::Cancelled)));
    }
}
