//! Cursor-based pagination for GraphQL connections.
//!
//! Same state machine as the [`Stitcher`](super::Stitcher) with one unified
//! issuer and the continuation read from the response body. The whole session
//! (issuing, hooks and classification) runs on the foreground lane so that
//! hooks never race with each other. Each response is classified before
//! reaching `on_error`:
//!
//! | Outcome                         | Error                       |
//! |---------------------------------|-----------------------------|
//! | transport failure               | classified `FailureEnvelope`|
//! | non-empty `errors` array        | `WeaveError::GraphQl`       |
//! | no `errors` but `data` is null  | `WeaveError::MissingData`   |

use super::driver::{ContinuationExtractor, PageDriver, PageHooks, PageInterpreter, PageIssuer};
use super::state::{PageController, PageRequest, PagerShared};
use crate::dispatch::lanes::{join_aborting, Dispatcher, Lane};
use crate::error::{WeaveError, WeaveResult};
use crate::request::{Callback, Delivery, FailureClassifier, StatusClassifier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Standard GraphQL response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlResponse<D> {
    pub data: Option<D>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQlErrorEntry>,
}

impl<D> GraphQlResponse<D> {
    pub fn data(data: D) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Data if present and no business errors were reported
    pub fn into_result(self) -> WeaveResult<D> {
        if !self.errors.is_empty() {
            return Err(WeaveError::GraphQl(
                self.errors.into_iter().map(|entry| entry.message).collect(),
            ));
        }
        self.data.ok_or(WeaveError::MissingData)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlErrorEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<serde_json::Value>,
}

/// Relay-style connection page info
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl PageInfo {
    /// Cursor for the next page, only when one exists
    pub fn next_cursor(&self) -> Option<String> {
        if self.has_next_page {
            self.end_cursor.clone()
        } else {
            None
        }
    }
}

type CursorIssuer<D> = Box<dyn FnMut(Option<&str>, Callback<GraphQlResponse<D>>) + Send>;

/// Named-option configuration for a [`GraphQlPager`]
pub struct GraphQlPagerBuilder<D> {
    on_request: Option<CursorIssuer<D>>,
    extract_cursor: Option<ContinuationExtractor<D>>,
    hooks: PageHooks<D>,
    exhaustive: bool,
    classifier: Arc<dyn FailureClassifier>,
    dispatcher: Option<Dispatcher>,
}

impl<D> Default for GraphQlPagerBuilder<D> {
    fn default() -> Self {
        Self {
            on_request: None,
            extract_cursor: None,
            hooks: PageHooks::default(),
            exhaustive: false,
            classifier: Arc::new(StatusClassifier::default()),
            dispatcher: None,
        }
    }
}

impl<D> fmt::Debug for GraphQlPagerBuilder<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQlPagerBuilder")
            .field("on_request", &self.on_request.is_some())
            .field("extract_cursor", &self.extract_cursor.is_some())
            .field("exhaustive", &self.exhaustive)
            .finish()
    }
}

impl<D: Send + 'static> GraphQlPagerBuilder<D> {
    /// Issuer for every page; the cursor is `None` for the first page
    pub fn on_request<F>(mut self, issuer: F) -> Self
    where
        F: FnMut(Option<&str>, Callback<GraphQlResponse<D>>) + Send + 'static,
    {
        self.on_request = Some(Box::new(issuer));
        self
    }

    /// Read the next cursor from a page's data, usually via [`PageInfo::next_cursor`].
    /// Runs after `on_response`.
    pub fn extract_cursor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&D) -> Option<String> + Send + 'static,
    {
        self.extract_cursor = Some(Box::new(extractor));
        self
    }

    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&D) + Send + 'static,
    {
        self.hooks.on_response = Box::new(hook);
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

    /// Run on this dispatcher's foreground lane instead of the global one
    pub fn dispatcher(mut self, dispatcher: &Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher.clone());
        self
    }

    pub fn build(self) -> WeaveResult<GraphQlPager<D>> {
        let on_request = self.on_request.ok_or_else(|| {
            WeaveError::Configuration("GraphQL pagination requires on_request".to_string())
        })?;
        let extract_cursor = self.extract_cursor.ok_or_else(|| {
            WeaveError::Configuration("GraphQL pagination requires extract_cursor".to_string())
        })?;

        let shared = PagerShared::new();
        debug!(session = %shared.id(), exhaustive = self.exhaustive, "GraphQL pager configured");
        Ok(GraphQlPager {
            on_request,
            extract_cursor,
            hooks: self.hooks,
            exhaustive: self.exhaustive,
            classifier: self.classifier,
            dispatcher: self.dispatcher,
            shared,
        })
    }
}

/// Configured cursor pagination session
pub struct GraphQlPager<D> {
    on_request: CursorIssuer<D>,
    extract_cursor: ContinuationExtractor<D>,
    hooks: PageHooks<D>,
    exhaustive: bool,
    classifier: Arc<dyn FailureClassifier>,
    dispatcher: Option<Dispatcher>,
    shared: Arc<PagerShared>,
}

impl<D> fmt::Debug for GraphQlPager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQlPager")
            .field("session", &self.shared.id())
            .field("state", &self.shared.state())
            .field("exhaustive", &self.exhaustive)
            .finish()
    }
}

/// Sort a delivery into data or one of the three failure classes
fn classify_response<D>(
    delivery: Delivery<GraphQlResponse<D>>,
    classifier: &dyn FailureClassifier,
) -> WeaveResult<D> {
    match delivery {
        Delivery::Success(response) => response.body.into_result(),
        Delivery::Failure(envelope) => Err(WeaveError::classify(envelope, classifier)),
    }
}

impl<D: Send + 'static> GraphQlPager<D> {
    pub fn builder() -> GraphQlPagerBuilder<D> {
        GraphQlPagerBuilder::default()
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.id()
    }

    pub fn controller(&self) -> PageController {
        PageController::new(Arc::clone(&self.shared))
    }

    /// Drive the session on the foreground lane; same contract as
    /// [`Stitcher::run`](super::Stitcher::run)
    pub async fn run(self) -> WeaveResult<()> {
        let mut on_request = self.on_request;
        let issue: PageIssuer<GraphQlResponse<D>> =
            Box::new(move |request: &PageRequest, callback| on_request(request.token(), callback));

        let classifier = self.classifier;
        let interpret: PageInterpreter<GraphQlResponse<D>, D> =
            Box::new(move |delivery: Delivery<GraphQlResponse<D>>| {
                classify_response(delivery, classifier.as_ref()).map(|data| (data, None))
            });

        let driver = PageDriver {
            kind: "graphql_pager",
            issue,
            interpret,
            extract: Some(self.extract_cursor),
            hooks: self.hooks,
            exhaustive: self.exhaustive,
            shared: self.shared,
        };
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Dispatcher::global().clone());
        join_aborting(dispatcher.spawn(Lane::Foreground, driver.drive())).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{FailureEnvelope, RawResponse};
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Deserialize)]
    struct Roster {
        names: Vec<String>,
        #[serde(rename = "pageInfo")]
        page_info: PageInfo,
    }

    #[test]
    fn test_page_info_next_cursor() {
        let more = PageInfo {
            has_next_page: true,
            end_cursor: Some("abc".to_string()),
        };
        let done = PageInfo {
            has_next_page: false,
            end_cursor: Some("abc".to_string()),
        };
        assert_eq!(more.next_cursor().as_deref(), Some("abc"));
        assert_eq!(done.next_cursor(), None);
    }

    #[test]
    fn test_response_decoding_and_classification() {
        let body = r#"{"data":{"names":["Ada"],"pageInfo":{"hasNextPage":false,"endCursor":null}}}"#;
        let response: GraphQlResponse<Roster> = serde_json::from_str(body).unwrap();
        assert_eq!(response.into_result().unwrap().names, vec!["Ada".to_string()]);

        let failed: GraphQlResponse<Roster> =
            serde_json::from_str(r#"{"data":null,"errors":[{"message":"not enrolled"}]}"#).unwrap();
        assert!(matches!(failed.into_result(), Err(WeaveError::GraphQl(messages)) if messages == ["not enrolled"]));

        let empty: GraphQlResponse<Roster> = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert!(matches!(empty.into_result(), Err(WeaveError::MissingData)));
    }

    #[tokio::test]
    async fn test_cursor_pages_run_on_foreground() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let threads = Arc::new(Mutex::new(Vec::new()));
        let (sink, seen) = (Arc::clone(&names), Arc::clone(&threads));

        GraphQlPager::builder()
            .on_request(|cursor: Option<&str>, cb: Callback<GraphQlResponse<Roster>>| {
                let page = match cursor {
                    None => Roster {
                        names: vec!["Ada".to_string()],
                        page_info: PageInfo {
                            has_next_page: true,
                            end_cursor: Some("c1".to_string()),
                        },
                    },
                    Some(_) => Roster {
                        names: vec!["Grace".to_string()],
                        page_info: PageInfo::default(),
                    },
                };
                cb.on_success(GraphQlResponse::data(page), None);
            })
            .extract_cursor(|roster: &Roster| roster.page_info.next_cursor())
            .on_response(move |roster: &Roster| {
                seen.lock()
                    .push(std::thread::current().name().map(str::to_string));
                sink.lock().extend(roster.names.iter().cloned());
            })
            .exhaustive(true)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(*names.lock(), vec!["Ada".to_string(), "Grace".to_string()]);
        assert!(threads
            .lock()
            .iter()
            .all(|name| name.as_deref() == Some("weave-foreground")));
    }

    #[tokio::test]
    async fn test_cursor_extracted_after_response_hook() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (hooked, extracted) = (Arc::clone(&order), Arc::clone(&order));

        GraphQlPager::builder()
            .on_request(|cursor: Option<&str>, cb: Callback<GraphQlResponse<Roster>>| {
                let page_info = match cursor {
                    None => PageInfo {
                        has_next_page: true,
                        end_cursor: Some("c1".to_string()),
                    },
                    Some(_) => PageInfo::default(),
                };
                cb.on_success(
                    GraphQlResponse::data(Roster {
                        names: Vec::new(),
                        page_info,
                    }),
                    None,
                );
            })
            .on_response(move |_: &Roster| hooked.lock().push("on_response"))
            .extract_cursor(move |roster: &Roster| {
                extracted.lock().push("extract_cursor");
                roster.page_info.next_cursor()
            })
            .exhaustive(true)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(
            *order.lock(),
            vec!["on_response", "extract_cursor", "on_response", "extract_cursor"]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_routes_to_on_error() {
        let captured = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&captured);
        GraphQlPager::builder()
            .on_request(|_: Option<&str>, cb: Callback<GraphQlResponse<Roster>>| {
                cb.on_failure(FailureEnvelope::from_response(RawResponse::new(401)));
            })
            .extract_cursor(|roster: &Roster| roster.page_info.next_cursor())
            .on_error(move |error| *slot.lock() = Some(error))
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();
        assert!(matches!(*captured.lock(), Some(WeaveError::Authorization(_))));
    }
}
