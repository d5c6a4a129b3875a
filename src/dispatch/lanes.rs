//! Execution lanes.
//!
//! The foreground lane is a single-threaded runtime on a dedicated thread:
//! tasks spawned there interleave at await points but never run in parallel,
//! which makes it the place for state-mutating work. The background lane is a
//! multi-threaded runtime for parallel and blocking work. Each runtime is owned
//! by its own thread, so a `Dispatcher` can outlive the runtime that created it.

use crate::config::DispatcherConfig;
use crate::error::{WeaveError, WeaveResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info};

static GLOBAL_DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();

/// Scheduling lane for a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// Single serialized lane for shared/state-mutating work
    Foreground,
    /// Parallel lane for general compute and blocking work
    Background,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foreground => write!(f, "foreground"),
            Self::Background => write!(f, "background"),
        }
    }
}

struct LaneRuntime {
    lane: Lane,
    handle: Handle,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl LaneRuntime {
    fn start(lane: Lane, thread_name: &str, worker_threads: Option<usize>) -> WeaveResult<Self> {
        let mut builder = match lane {
            Lane::Foreground => Builder::new_current_thread(),
            Lane::Background => Builder::new_multi_thread(),
        };
        builder.enable_all().thread_name(thread_name);
        if let (Lane::Background, Some(workers)) = (lane, worker_threads) {
            builder.worker_threads(workers);
        }
        let runtime = builder
            .build()
            .map_err(|e| WeaveError::Dispatcher(format!("failed to build {lane} runtime: {e}")))?;
        let handle = runtime.handle().clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                debug!(lane = %lane, "Lane runtime stopped");
            })
            .map_err(|e| WeaveError::Dispatcher(format!("failed to start {lane} thread: {e}")))?;

        info!(lane = %lane, thread = %thread_name, "🧵 Dispatcher lane started");
        Ok(Self {
            lane,
            handle,
            shutdown: Mutex::new(Some(shutdown_tx)),
        })
    }
}

impl Drop for LaneRuntime {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.lock().take() {
            debug!(lane = %self.lane, "Signalling lane shutdown");
            let _ = shutdown.send(());
        }
    }
}

struct DispatcherInner {
    foreground: LaneRuntime,
    background: LaneRuntime,
}

/// Owner of the foreground and background lanes
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(config: &DispatcherConfig) -> WeaveResult<Self> {
        let foreground = LaneRuntime::start(Lane::Foreground, &config.foreground_thread_name, None)?;
        let background = LaneRuntime::start(
            Lane::Background,
            &config.background_thread_name,
            config.background_worker_threads,
        )?;
        Ok(Self {
            inner: Arc::new(DispatcherInner {
                foreground,
                background,
            }),
        })
    }

    /// Process-wide dispatcher, started with default settings on first use
    pub fn global() -> &'static Dispatcher {
        GLOBAL_DISPATCHER.get_or_init(|| {
            Dispatcher::new(&DispatcherConfig::default())
                .expect("Failed to start default dispatcher lanes")
        })
    }

    /// Install a configured process-wide dispatcher; fails if one is already running
    pub fn install(config: &DispatcherConfig) -> WeaveResult<&'static Dispatcher> {
        let dispatcher = Dispatcher::new(config)?;
        GLOBAL_DISPATCHER
            .set(dispatcher)
            .map_err(|_| WeaveError::Dispatcher("global dispatcher already installed".to_string()))?;
        Ok(Self::global())
    }

    pub fn handle(&self, lane: Lane) -> &Handle {
        match lane {
            Lane::Foreground => &self.inner.foreground.handle,
            Lane::Background => &self.inner.background.handle,
        }
    }

    pub fn spawn<F>(&self, lane: Lane, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle(lane).spawn(future)
    }

    /// Run blocking work on the background lane's blocking pool
    pub fn spawn_blocking<F, R>(&self, work: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.inner.background.handle.spawn_blocking(work)
    }
}

/// Aborts the wrapped task if the awaiting side is dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Await a spawned task, aborting it if this future is dropped first
pub(crate) async fn join_aborting<T>(handle: JoinHandle<T>) -> WeaveResult<T> {
    let mut guard = AbortOnDrop(handle);
    let result = (&mut guard.0).await;
    result.map_err(join_error)
}

pub(crate) fn join_error(error: JoinError) -> WeaveError {
    if error.is_cancelled() {
        return WeaveError::Cancelled;
    }
    match error.try_into_panic() {
        Ok(payload) => WeaveError::Panicked(panic_message(payload.as_ref())),
        Err(error) => WeaveError::Dispatcher(error.to_string()),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run blocking work on the background lane and await its value
pub async fn in_background<T, F>(work: F) -> WeaveResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Dispatcher::global()
        .spawn_blocking(work)
        .await
        .map_err(join_error)
}

/// Hop a future onto the serialized foreground lane and await its output
pub async fn on_foreground<F>(future: F) -> WeaveResult<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    join_aborting(Dispatcher::global().spawn(Lane::Foreground, future)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_foreground_lane_runs_on_one_thread() {
        let config = DispatcherConfig {
            foreground_thread_name: "test-foreground".to_string(),
            ..DispatcherConfig::default()
        };
        let dispatcher = Dispatcher::new(&config).unwrap();

        let mut names = Vec::new();
        for _ in 0..4 {
            let name = dispatcher
                .spawn(Lane::Foreground, async {
                    std::thread::current().name().map(str::to_string)
                })
                .await
                .unwrap();
            names.push(name);
        }
        assert!(names
            .iter()
            .all(|name| name.as_deref() == Some("test-foreground")));
    }

    #[tokio::test]
    async fn test_in_background_returns_value() {
        let value = in_background(|| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_in_background_panic_is_reported() {
        let result: WeaveResult<()> = in_background(|| panic!("boom")).await;
        assert!(matches!(result, Err(WeaveError::Panicked(message)) if message == "boom"));
    }

    #[tokio::test]
    async fn test_on_foreground() {
        let value = on_foreground(async { "hop" }).await.unwrap();
        assert_eq!(value, "hop");
    }
}
