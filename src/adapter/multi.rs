//! Fixed-arity multi-await.
//!
//! Results are packed positionally in the order the issuers were passed, no
//! matter which request completes first. The first failure cancels the other
//! outstanding issuers and is returned as-is.

use super::parallel::ParallelJoin;
use crate::error::{WeaveError, WeaveResult};
use crate::request::RequestIssuer;
use parking_lot::Mutex;
use std::sync::Arc;

/// Positional result slot filled by a registration's success hook
struct Slot<T>(Arc<Mutex<Option<T>>>);

impl<T: Send + 'static> Slot<T> {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    fn filler(&self) -> impl FnOnce(T) + Send + 'static {
        let slot = Arc::clone(&self.0);
        move |value| *slot.lock() = Some(value)
    }

    fn take(self) -> WeaveResult<T> {
        self.0.lock().take().ok_or(WeaveError::Abandoned)
    }
}

/// Issue two requests concurrently and await both payloads
pub async fn await_apis2<A, B, IA, IB>(issuer_a: IA, issuer_b: IB) -> WeaveResult<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
    IA: RequestIssuer<A>,
    IB: RequestIssuer<B>,
{
    let (a, b) = (Slot::new(), Slot::new());
    let mut join = ParallelJoin::new();
    join.await_api(issuer_a, a.filler())
        .await_api(issuer_b, b.filler());
    join.run().await?;
    Ok((a.take()?, b.take()?))
}

/// Issue three requests concurrently and await all payloads
pub async fn await_apis3<A, B, C, IA, IB, IC>(
    issuer_a: IA,
    issuer_b: IB,
    issuer_c: IC,
) -> WeaveResult<(A, B, C)>
where
    A: Send + 'static,
    B: Send + 'static,
    C: Send + 'static,
    IA: RequestIssuer<A>,
    IB: RequestIssuer<B>,
    IC: RequestIssuer<C>,
{
    let (a, b, c) = (Slot::new(), Slot::new(), Slot::new());
    let mut join = ParallelJoin::new();
    join.await_api(issuer_a, a.filler())
        .await_api(issuer_b, b.filler())
        .await_api(issuer_c, c.filler());
    join.run().await?;
    Ok((a.take()?, b.take()?, c.take()?))
}
