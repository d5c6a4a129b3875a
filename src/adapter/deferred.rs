//! Non-throwing deferred adapter.
//!
//! `api_async` issues its request immediately and hands back a [`Deferred`]
//! that always resolves to a [`DataResult`]; nothing on this path returns an
//! error. `await_or_throw` converts back into a `WeaveResult` for callers that
//! prefer `?`.

use super::single::resolve_delivery;
use crate::error::{WeaveError, WeaveResult};
use crate::request::callback::CancelOnDrop;
use crate::request::{completion, ApiResponse, Callback, RequestIssuer, StatusClassifier};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Materialized outcome of a deferred call
#[derive(Debug, Clone)]
pub enum DataResult<T> {
    Success(T),
    Fail(WeaveError),
}

impl<T> DataResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }

    pub fn data_or_none(self) -> Option<T> {
        match self {
            Self::Success(data) => Some(data),
            Self::Fail(_) => None,
        }
    }

    /// Success payload, or a generic error embedding the failed result
    pub fn data_or_throw(self) -> WeaveResult<T> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Fail(error) => Err(WeaveError::Unsuccessful(Box::new(error))),
        }
    }

    pub fn failure(&self) -> Option<&WeaveError> {
        match self {
            Self::Success(_) => None,
            Self::Fail(error) => Some(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DataResult<U> {
        match self {
            Self::Success(data) => DataResult::Success(f(data)),
            Self::Fail(error) => DataResult::Fail(error),
        }
    }

    pub fn into_result(self) -> WeaveResult<T> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Fail(error) => Err(error),
        }
    }
}

impl<T> From<WeaveResult<T>> for DataResult<T> {
    fn from(result: WeaveResult<T>) -> Self {
        match result {
            Ok(data) => Self::Success(data),
            Err(error) => Self::Fail(error),
        }
    }
}

/// Started call whose outcome is awaited later.
///
/// Dropping an unresolved `Deferred` cancels the underlying request.
pub struct Deferred<T> {
    future: BoxFuture<'static, DataResult<T>>,
    guard: Option<CancelOnDrop>,
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("pending", &self.guard.is_some())
            .finish()
    }
}

impl<T: Send + 'static> Deferred<T> {
    pub fn map<U: Send + 'static>(self, f: impl FnOnce(T) -> U + Send + 'static) -> Deferred<U> {
        Deferred {
            future: self.future.map(|result| result.map(f)).boxed(),
            guard: self.guard,
        }
    }

    /// Await the call and return its payload, or raise `WeaveError::Unsuccessful`
    pub async fn await_or_throw(self) -> WeaveResult<T> {
        self.await.data_or_throw()
    }
}

impl<T> Deferred<T> {
    /// Cancel the underlying request; awaiting afterwards yields a `Cancelled` failure
    pub fn cancel(&mut self) {
        // Dropping the armed guard cancels the callback
        self.guard.take();
    }
}

impl<T> Future for Deferred<T> {
    type Output = DataResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let cancelled = self.guard.is_none();
        match self.future.poll_unpin(cx) {
            Poll::Ready(result) => {
                if let Some(guard) = self.guard.take() {
                    guard.disarm();
                }
                match result {
                    DataResult::Fail(WeaveError::Abandoned) if cancelled => {
                        Poll::Ready(DataResult::Fail(WeaveError::Cancelled))
                    }
                    other => Poll::Ready(other),
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Start a call now and resolve later with the full response envelope
pub fn api_response_async<T, I>(issuer: I) -> Deferred<ApiResponse<T>>
where
    T: Send + 'static,
    I: RequestIssuer<T>,
{
    let (handle, done) = completion();
    let callback = Callback::new(move |delivery| {
        handle.resolve(delivery);
    });
    let guard = CancelOnDrop::new(callback.cancel_handle());
    issuer(callback);

    let future = async move {
        match done.await {
            Ok(delivery) => resolve_delivery(delivery, &StatusClassifier::default()).into(),
            Err(error) => DataResult::Fail(error),
        }
    };

    Deferred {
        future: future.boxed(),
        guard: Some(guard),
    }
}

/// Start a call now and resolve later with the bare payload
pub fn api_async<T, I>(issuer: I) -> Deferred<T>
where
    T: Send + 'static,
    I: RequestIssuer<T>,
{
    api_response_async(issuer).map(ApiResponse::into_body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{FailureEnvelope, RawResponse};

    #[tokio::test]
    async fn test_never_raises_on_failure() {
        let result = api_async(|cb: Callback<u8>| {
            cb.on_failure(FailureEnvelope::from_response(RawResponse::new(401)));
        })
        .await;
        assert!(result.is_fail());
        assert!(matches!(result.failure(), Some(WeaveError::Authorization(_))));
    }

    #[tokio::test]
    async fn test_await_or_throw_embeds_result() {
        let ok = api_async(|cb: Callback<u8>| {
            cb.on_success(3, None);
        })
        .await_or_throw()
        .await;
        assert_eq!(ok.unwrap(), 3);

        let err = api_async(|cb: Callback<u8>| {
            cb.on_failure(FailureEnvelope::from_response(RawResponse::new(500)));
        })
        .await_or_throw()
        .await
        .unwrap_err();
        assert!(matches!(err, WeaveError::Unsuccessful(_)));
    }

    #[tokio::test]
    async fn test_explicit_cancel_materializes_as_failure() {
        let (stash_tx, stash_rx) = std::sync::mpsc::channel();
        let mut deferred = api_async(move |cb: Callback<u8>| {
            stash_tx.send(cb).unwrap();
        });
        deferred.cancel();
        let stashed = stash_rx.recv().unwrap();
        assert!(stashed.is_cancelled());
        assert!(!stashed.on_success(1, None));

        let result = deferred.await;
        assert!(matches!(result, DataResult::Fail(WeaveError::Cancelled)));
    }
}
