//! # Pagination Stitcher
//!
//! Sequential page fetching over URL-style continuation. One session serves
//! both consumption styles: exhaustive (every page fetched back to back) and
//! interactive (one page per [`PageController::next`] call).
//!
//! Exactly one request mode must be configured:
//! - unified: [`StitcherBuilder::on_request`], one issuer for every page
//! - split: [`StitcherBuilder::on_request_first`] plus
//!   [`StitcherBuilder::on_request_next`], for APIs whose first page and
//!   follow-up pages are different endpoints
//!
//! The mode is checked by [`StitcherBuilder::build`], before anything is issued.

use super::driver::{ContinuationExtractor, PageDriver, PageHooks, PageInterpreter, PageIssuer};
use super::state::{PageController, PageRequest, PagerShared};
use crate::error::{WeaveError, WeaveResult};
use crate::request::{Callback, Delivery, FailureClassifier, StatusClassifier};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

type UnifiedIssuer<T> = Box<dyn FnMut(&PageRequest, Callback<T>) + Send>;
type FirstIssuer<T> = Box<dyn FnMut(Callback<T>) + Send>;
type NextIssuer<T> = Box<dyn FnMut(&str, Callback<T>) + Send>;

enum RequestMode<T> {
    Unified(UnifiedIssuer<T>),
    Split {
        first: FirstIssuer<T>,
        next: NextIssuer<T>,
    },
}

impl<T: 'static> RequestMode<T> {
    fn into_issuer(self) -> PageIssuer<T> {
        match self {
            Self::Unified(mut issuer) => {
                Box::new(move |request: &PageRequest, callback| issuer(request, callback))
            }
            Self::Split {
                mut first,
                mut next,
            } => Box::new(move |request: &PageRequest, callback| match request.token() {
                None => first(callback),
                Some(token) => next(token, callback),
            }),
        }
    }
}

/// Named-option configuration for a [`Stitcher`]
pub struct StitcherBuilder<T> {
    on_request: Option<UnifiedIssuer<T>>,
    on_request_first: Option<FirstIssuer<T>>,
    on_request_next: Option<NextIssuer<T>>,
    extract_next_url: Option<ContinuationExtractor<T>>,
    hooks: PageHooks<T>,
    exhaustive: bool,
    classifier: Arc<dyn FailureClassifier>,
}

impl<T> Default for StitcherBuilder<T> {
    fn default() -> Self {
        Self {
            on_request: None,
            on_request_first: None,
            on_request_next: None,
            extract_next_url: None,
            hooks: PageHooks::default(),
            exhaustive: false,
            classifier: Arc::new(StatusClassifier::default()),
        }
    }
}

impl<T> fmt::Debug for StitcherBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StitcherBuilder")
            .field("on_request", &self.on_request.is_some())
            .field("on_request_first", &self.on_request_first.is_some())
            .field("on_request_next", &self.on_request_next.is_some())
            .field("extract_next_url", &self.extract_next_url.is_some())
            .field("exhaustive", &self.exhaustive)
            .finish()
    }
}

impl<T: Send + 'static> StitcherBuilder<T> {
    /// Unified mode: the same issuer for every page
    pub fn on_request<F>(mut self, issuer: F) -> Self
    where
        F: FnMut(&PageRequest, Callback<T>) + Send + 'static,
    {
        self.on_request = Some(Box::new(issuer));
        self
    }

    /// Split mode: issuer for the first page
    pub fn on_request_first<F>(mut self, issuer: F) -> Self
    where
        F: FnMut(Callback<T>) + Send + 'static,
    {
        self.on_request_first = Some(Box::new(issuer));
        self
    }

    /// Split mode: issuer for every following page, given the continuation token
    pub fn on_request_next<F>(mut self, issuer: F) -> Self
    where
        F: FnMut(&str, Callback<T>) + Send + 'static,
    {
        self.on_request_next = Some(Box::new(issuer));
        self
    }

    /// Called once per page, before continuation is evaluated
    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.hooks.on_response = Box::new(hook);
        self
    }

    /// Read the continuation from the payload instead of the response metadata.
    ///
    /// Runs after `on_response` has seen the same page.
    pub fn extract_next_url<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&T) -> Option<String> + Send + 'static,
    {
        self.extract_next_url = Some(Box::new(extractor));
        self
    }

    pub fn pre_request<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.hooks.pre_request = Box::new(hook);
        self
    }

    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.on_complete = Some(Box::new(hook));
        self
    }

    /// Handle failures here instead of returning them from [`Stitcher::run`]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(WeaveError) + Send + 'static,
    {
        self.hooks.on_error = Some(Box::new(hook));
        self
    }

    pub fn exhaustive(mut self, exhaustive: bool) -> Self {
        self.exhaustive = exhaustive;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn build(self) -> WeaveResult<Stitcher<T>> {
        let mode = match (self.on_request, self.on_request_first, self.on_request_next) {
            (Some(issuer), None, None) => RequestMode::Unified(issuer),
            (None, Some(first), Some(next)) => RequestMode::Split { first, next },
            (None, None, None) => {
                return Err(WeaveError::Configuration(
                    "pagination requires on_request, or on_request_first with on_request_next"
                        .to_string(),
                ))
            }
            (Some(_), _, _) => {
                return Err(WeaveError::Configuration(
                    "on_request cannot be combined with on_request_first/on_request_next"
                        .to_string(),
                ))
            }
            (None, _, _) => {
                return Err(WeaveError::Configuration(
                    "split request mode requires both on_request_first and on_request_next"
                        .to_string(),
                ))
            }
        };

        let shared = PagerShared::new();
        debug!(session = %shared.id(), exhaustive = self.exhaustive, "Stitcher configured");
        Ok(Stitcher {
            mode,
            extract_next_url: self.extract_next_url,
            hooks: self.hooks,
            exhaustive: self.exhaustive,
            classifier: self.classifier,
            shared,
        })
    }
}

/// Configured pagination session
pub struct Stitcher<T> {
    mode: RequestMode<T>,
    extract_next_url: Option<ContinuationExtractor<T>>,
    hooks: PageHooks<T>,
    exhaustive: bool,
    classifier: Arc<dyn FailureClassifier>,
    shared: Arc<PagerShared>,
}

impl<T> fmt::Debug for Stitcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stitcher")
            .field("session", &self.shared.id())
            .field("state", &self.shared.state())
            .field("exhaustive", &self.exhaustive)
            .finish()
    }
}

impl<T: Send + 'static> Stitcher<T> {
    pub fn builder() -> StitcherBuilder<T> {
        StitcherBuilder::default()
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.id()
    }

    /// Handle for `next()`/`cancel()`; take it before awaiting [`Stitcher::run`]
    pub fn controller(&self) -> PageController {
        PageController::new(Arc::clone(&self.shared))
    }

    /// Fetch the first page and keep going until the last page, a failure or
    /// cancellation. In interactive mode this suspends between pages until
    /// [`PageController::next`] is called.
    ///
    /// Resolves `Ok` after `on_complete`, or after `on_error` handled a failure.
    /// Cancellation resolves `Err(WeaveError::Cancelled)` without calling
    /// `on_error`. Dropping the future cancels the session.
    pub async fn run(self) -> WeaveResult<()> {
        let classifier = self.classifier;
        let interpret: PageInterpreter<T, T> = Box::new(move |delivery: Delivery<T>| match delivery {
            Delivery::Success(response) => {
                let token = response.continuation();
                Ok((response.body, token))
            }
            Delivery::Failure(envelope) => Err(WeaveError::classify(envelope, classifier.as_ref())),
        });

        PageDriver {
            kind: "stitcher",
            issue: self.mode.into_issuer(),
            interpret,
            extract: self.extract_next_url,
            hooks: self.hooks,
            exhaustive: self.exhaustive,
            shared: self.shared,
        }
        .drive()
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PagerState;
    use parking_lot::Mutex;

    fn pages() -> Vec<(Vec<u32>, Option<&'static str>)> {
        vec![
            (vec![1, 2], Some("/items?page=2")),
            (vec![3, 4], Some("/items?page=3")),
            (vec![5], None),
        ]
    }

    #[tokio::test]
    async fn test_exhaustive_unified_mode() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);
        let stitcher = Stitcher::builder()
            .on_request(|request: &PageRequest, cb: Callback<Vec<u32>>| {
                let (items, next) = pages()[request.index()].clone();
                cb.on_success(items, next.map(str::to_string));
            })
            .on_response(move |items: &Vec<u32>| sink.lock().extend_from_slice(items))
            .exhaustive(true)
            .build()
            .unwrap();
        let controller = stitcher.controller();

        stitcher.run().await.unwrap();
        assert_eq!(*collected.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(controller.state(), PagerState::Completed);
        assert_eq!(controller.pages_loaded(), 3);
    }

    #[tokio::test]
    async fn test_split_mode_routes_by_token() {
        let tokens = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&tokens);
        Stitcher::builder()
            .on_request_first(|cb: Callback<u8>| {
                cb.on_success(0, Some("cursor-1".to_string()));
            })
            .on_request_next(move |token: &str, cb: Callback<u8>| {
                seen.lock().push(token.to_string());
                cb.on_success(1, None);
            })
            .exhaustive(true)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(*tokens.lock(), vec!["cursor-1".to_string()]);
    }

    #[tokio::test]
    async fn test_extractor_takes_precedence_over_metadata() {
        let issued = Arc::new(Mutex::new(0));
        let count = Arc::clone(&issued);
        Stitcher::builder()
            .on_request(move |_: &PageRequest, cb: Callback<&'static str>| {
                *count.lock() += 1;
                cb.on_success("body", Some("/ignored".to_string()));
            })
            .extract_next_url(|_| None)
            .exhaustive(true)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(*issued.lock(), 1);
    }

    #[test]
    fn test_missing_mode_is_configuration_error() {
        let result = Stitcher::<u8>::builder().exhaustive(true).build();
        assert!(matches!(result, Err(WeaveError::Configuration(_))));
    }
}
