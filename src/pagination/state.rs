//! Pagination session state and the caller-facing controller.

use crate::request::CancelHandle;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle of a pagination session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagerState {
    /// Built but the first page has not been requested yet
    AwaitingFirstPage,
    /// A page is being fetched or processed
    InFlight,
    /// Parked between pages, waiting for `next()`
    Idle,
    /// Last page delivered
    Completed,
    Failed,
    Cancelled,
}

impl PagerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for PagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingFirstPage => write!(f, "awaiting_first_page"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Idle => write!(f, "idle"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Page about to be issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    index: usize,
    token: Option<String>,
}

impl PageRequest {
    pub(crate) fn first() -> Self {
        Self {
            index: 0,
            token: None,
        }
    }

    pub(crate) fn next(&self, token: String) -> Self {
        Self {
            index: self.index + 1,
            token: Some(token),
        }
    }

    /// Zero-based page number
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_first_page(&self) -> bool {
        self.token.is_none()
    }

    /// Continuation token (next URL or cursor); `None` for the first page
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

struct PagerInner {
    state: PagerState,
    next_token: Option<String>,
    in_flight: Option<CancelHandle>,
    pages_loaded: usize,
}

/// State shared between a running page driver and its controllers
pub(crate) struct PagerShared {
    id: Uuid,
    inner: Mutex<PagerInner>,
    wake: Notify,
}

impl PagerShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            inner: Mutex::new(PagerInner {
                state: PagerState::AwaitingFirstPage,
                next_token: None,
                in_flight: None,
                pages_loaded: 0,
            }),
            wake: Notify::new(),
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn state(&self) -> PagerState {
        self.inner.lock().state
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state() == PagerState::Cancelled
    }

    /// Record the callback about to be issued; false if the session was cancelled
    pub(crate) fn begin_request(&self, cancel: CancelHandle) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == PagerState::Cancelled {
            return false;
        }
        inner.state = PagerState::InFlight;
        inner.in_flight = Some(cancel);
        true
    }

    /// The in-flight callback was delivered; false if the session was cancelled meanwhile
    pub(crate) fn end_request(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.in_flight = None;
        inner.state != PagerState::Cancelled
    }

    pub(crate) fn record_page(&self, next_token: Option<String>) {
        let mut inner = self.inner.lock();
        inner.pages_loaded += 1;
        inner.next_token = next_token;
    }

    /// Park between pages; false if the session was cancelled
    pub(crate) fn park(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == PagerState::Cancelled {
            return false;
        }
        inner.state = PagerState::Idle;
        true
    }

    /// Wait until `next()` or `cancel()`; true when the next page should be issued
    pub(crate) async fn wait_for_next(&self) -> bool {
        loop {
            let notified = self.wake.notified();
            match self.state() {
                PagerState::Idle => {}
                PagerState::Cancelled => return false,
                _ => return true,
            }
            notified.await;
        }
    }

    pub(crate) fn request_next(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state != PagerState::Idle {
                debug!(session = %self.id, state = %inner.state, "next() ignored");
                return false;
            }
            inner.state = PagerState::InFlight;
        }
        self.wake.notify_one();
        true
    }

    /// Move to a terminal state; false if cancellation got there first
    pub(crate) fn finish(&self, state: PagerState) -> bool {
        let mut inner = self.inner.lock();
        inner.in_flight = None;
        if inner.state == PagerState::Cancelled {
            return false;
        }
        inner.state = state;
        true
    }

    pub(crate) fn cancel(&self) -> bool {
        let in_flight = {
            let mut inner = self.inner.lock();
            if inner.state.is_terminal() {
                return false;
            }
            inner.state = PagerState::Cancelled;
            inner.in_flight.take()
        };
        info!(session = %self.id, "Pagination session cancelled");
        if let Some(cancel) = in_flight {
            cancel.cancel();
        }
        self.wake.notify_one();
        true
    }
}

/// Cancels the session if the driving future is dropped before it finishes
pub(crate) struct CancelSessionOnDrop(pub(crate) Option<Arc<PagerShared>>);

impl Drop for CancelSessionOnDrop {
    fn drop(&mut self) {
        if let Some(shared) = self.0.take() {
            shared.cancel();
        }
    }
}

/// Caller-facing handle to a pagination session.
///
/// Cheap to clone; every clone drives the same session.
#[derive(Clone)]
pub struct PageController {
    shared: Arc<PagerShared>,
}

impl fmt::Debug for PageController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageController")
            .field("session", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

impl PageController {
    pub(crate) fn new(shared: Arc<PagerShared>) -> Self {
        Self { shared }
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.id
    }

    /// Request the next page. A no-op (returning false) unless the session is
    /// parked between pages with a continuation available.
    pub fn next(&self) -> bool {
        self.shared.request_next()
    }

    /// Cancel the session, including the in-flight request if any
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    pub fn state(&self) -> PagerState {
        self.shared.state()
    }

    pub fn is_loading(&self) -> bool {
        self.state() == PagerState::InFlight
    }

    /// True while a continuation token is pending and the session is not terminal
    pub fn has_more(&self) -> bool {
        let inner = self.shared.inner.lock();
        !inner.state.is_terminal() && (inner.pages_loaded == 0 || inner.next_token.is_some())
    }

    pub fn pages_loaded(&self) -> usize {
        self.shared.inner.lock().pages_loaded
    }
}
