//! Single-call adapter: one outstanding callback request as one future.

use crate::config::BlockingConfig;
use crate::error::{WeaveError, WeaveResult};
use crate::request::callback::CancelOnDrop;
use crate::request::{
    completion, ApiResponse, Callback, Delivery, FailureClassifier, RequestIssuer,
    StatusClassifier,
};
use crossbeam::channel::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, warn};

/// Issue one request and await its payload.
///
/// Failures are classified with the default policy (401 → `Authorization`).
/// Dropping the returned future before resolution cancels the callback, which
/// runs the issuer's `on_cancel` hooks.
pub async fn await_api<T, I>(issuer: I) -> WeaveResult<T>
where
    T: Send + 'static,
    I: RequestIssuer<T>,
{
    await_api_response(issuer).await.map(ApiResponse::into_body)
}

/// Like [`await_api`] but resolves with the full response envelope
pub async fn await_api_response<T, I>(issuer: I) -> WeaveResult<ApiResponse<T>>
where
    T: Send + 'static,
    I: RequestIssuer<T>,
{
    let delivery = issue(issuer).await?;
    resolve_delivery(delivery, &StatusClassifier::default())
}

/// Like [`await_api`] with a caller-supplied failure classification policy
pub async fn await_api_with<T, I, C>(classifier: &C, issuer: I) -> WeaveResult<T>
where
    T: Send + 'static,
    I: RequestIssuer<T>,
    C: FailureClassifier + ?Sized,
{
    let delivery = issue(issuer).await?;
    resolve_delivery(delivery, classifier).map(ApiResponse::into_body)
}

pub(crate) async fn issue<T, I>(issuer: I) -> WeaveResult<Delivery<T>>
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
    let delivery = done.await;
    guard.disarm();
    delivery
}

pub(crate) fn resolve_delivery<T, C>(
    delivery: Delivery<T>,
    classifier: &C,
) -> WeaveResult<ApiResponse<T>>
where
    C: FailureClassifier + ?Sized,
{
    match delivery {
        Delivery::Success(response) => Ok(response),
        Delivery::Failure(envelope) => {
            let error = WeaveError::classify(envelope, classifier);
            debug!(error = %error, "API call failed");
            Err(error)
        }
    }
}

/// Blocking wait for callers that cannot suspend.
///
/// Must not be called from inside an async task; it parks the current thread.
/// Exceeding `timeout` cancels the request and returns `WeaveError::Timeout`.
pub fn block_on_api<T, I>(issuer: I, timeout: Duration) -> WeaveResult<T>
where
    T: Send + 'static,
    I: RequestIssuer<T>,
{
    let (tx, rx) = channel::bounded(1);
    let callback = Callback::new(move |delivery| {
        let _ = tx.send(delivery);
    });
    let cancel = callback.cancel_handle();
    issuer(callback);

    match rx.recv_timeout(timeout) {
        Ok(delivery) => {
            resolve_delivery(delivery, &StatusClassifier::default()).map(ApiResponse::into_body)
        }
        Err(RecvTimeoutError::Timeout) => {
            cancel.cancel();
            warn!(timeout_ms = timeout.as_millis() as u64, "Blocking API wait timed out");
            Err(WeaveError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(WeaveError::Abandoned),
    }
}

/// [`block_on_api`] bounded by the configured default timeout
pub fn block_on_api_default<T, I>(issuer: I, config: &BlockingConfig) -> WeaveResult<T>
where
    T: Send + 'static,
    I: RequestIssuer<T>,
{
    block_on_api(issuer, config.timeout())
}
