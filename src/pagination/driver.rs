//! Page driver shared by the URL stitcher and the cursor pager.
//!
//! One loop issues pages strictly one at a time: pre-request hook, issue,
//! await the delivery, hand the payload to `on_response`, read the continuation
//! from it, then decide between completing, continuing (exhaustive) or parking
//! until `next()`.

use super::state::{CancelSessionOnDrop, PageRequest, PagerShared, PagerState};
use crate::error::{WeaveError, WeaveResult};
use crate::logging::log_session_operation;
use crate::request::{completion, Callback, Delivery};
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) type PageIssuer<R> = Box<dyn FnMut(&PageRequest, Callback<R>) + Send>;

/// Turns a delivery into the payload plus the continuation carried by the
/// response metadata, if any
pub(crate) type PageInterpreter<R, T> =
    Box<dyn FnMut(Delivery<R>) -> WeaveResult<(T, Option<String>)> + Send>;

/// Reads the continuation from a payload; replaces the metadata token when set
pub(crate) type ContinuationExtractor<T> = Box<dyn Fn(&T) -> Option<String> + Send>;

/// Caller hooks; every one defaults to a no-op except `on_error`
pub(crate) struct PageHooks<T> {
    pub(crate) pre_request: Box<dyn FnMut() + Send>,
    pub(crate) on_response: Box<dyn FnMut(&T) + Send>,
    pub(crate) on_complete: Option<Box<dyn FnOnce() + Send>>,
    pub(crate) on_error: Option<Box<dyn FnOnce(WeaveError) + Send>>,
}

impl<T> Default for PageHooks<T> {
    fn default() -> Self {
        Self {
            pre_request: Box::new(|| {}),
            on_response: Box::new(|_| {}),
            on_complete: None,
            on_error: None,
        }
    }
}

pub(crate) struct PageDriver<R, T> {
    pub(crate) kind: &'static str,
    pub(crate) issue: PageIssuer<R>,
    pub(crate) interpret: PageInterpreter<R, T>,
    pub(crate) extract: Option<ContinuationExtractor<T>>,
    pub(crate) hooks: PageHooks<T>,
    pub(crate) exhaustive: bool,
    pub(crate) shared: Arc<PagerShared>,
}

impl<R, T> PageDriver<R, T>
where
    R: Send + 'static,
    T: Send + 'static,
{
    /// Drive the session to completion, failure or cancellation.
    ///
    /// Dropping this future cancels the session and its in-flight request.
    pub(crate) async fn drive(mut self) -> WeaveResult<()> {
        let mut guard = CancelSessionOnDrop(Some(Arc::clone(&self.shared)));
        log_session_operation(self.kind, self.shared.id(), "started", None);
        let result = self.drive_pages().await;
        guard.0 = None;

        let (status, details) = match &result {
            Ok(()) => (self.shared.state(), None),
            Err(error) if error.is_cancellation() => (PagerState::Cancelled, None),
            Err(error) => (PagerState::Failed, Some(error.to_string())),
        };
        log_session_operation(
            self.kind,
            self.shared.id(),
            &status.to_string(),
            details.as_deref(),
        );
        result
    }

    async fn drive_pages(&mut self) -> WeaveResult<()> {
        let mut request = PageRequest::first();
        loop {
            let (handle, done) = completion();
            let callback = Callback::new(move |delivery: Delivery<R>| {
                handle.resolve(delivery);
            });
            if !self.shared.begin_request(callback.cancel_handle()) {
                return Err(WeaveError::Cancelled);
            }

            (self.hooks.pre_request)();
            debug!(session = %self.shared.id(), page = request.index(), "Issuing page request");
            (self.issue)(&request, callback);

            let delivery = match done.await {
                Ok(delivery) => delivery,
                Err(_) if self.shared.is_cancelled() => return Err(WeaveError::Cancelled),
                Err(error) => return self.fail(error),
            };
            if !self.shared.end_request() {
                debug!(
                    session = %self.shared.id(),
                    page = request.index(),
                    "Dropping page delivered after cancellation"
                );
                return Err(WeaveError::Cancelled);
            }

            let (payload, metadata_token) = match (self.interpret)(delivery) {
                Ok(page) => page,
                Err(error) => return self.fail(error),
            };
            (self.hooks.on_response)(&payload);
            let token = match &self.extract {
                Some(extract) => extract(&payload),
                None => metadata_token,
            };
            drop(payload);

            let token = token.filter(|token| !token.trim().is_empty());
            self.shared.record_page(token.clone());
            let Some(token) = token else {
                if !self.shared.finish(PagerState::Completed) {
                    return Err(WeaveError::Cancelled);
                }
                debug!(
                    session = %self.shared.id(),
                    pages = request.index() + 1,
                    "Final page delivered"
                );
                if let Some(on_complete) = self.hooks.on_complete.take() {
                    on_complete();
                }
                return Ok(());
            };
            request = request.next(token);

            if self.exhaustive {
                if self.shared.is_cancelled() {
                    return Err(WeaveError::Cancelled);
                }
                continue;
            }
            if !self.shared.park() || !self.shared.wait_for_next().await {
                return Err(WeaveError::Cancelled);
            }
        }
    }

    fn fail(&mut self, error: WeaveError) -> WeaveResult<()> {
        if !self.shared.finish(PagerState::Failed) {
            return Err(WeaveError::Cancelled);
        }
        match self.hooks.on_error.take() {
            Some(on_error) => {
                warn!(
                    session = %self.shared.id(),
                    error = %error,
                    "Pagination failed; routed to on_error"
                );
                on_error(error);
                Ok(())
            }
            None => Err(error),
        }
    }
}
