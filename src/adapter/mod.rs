//! # Adapters
//!
//! Bridges from the callback contract to futures:
//!
//! - [`await_api`] / [`await_api_response`] - one request, one future; failures raise
//! - [`api_async`] - start now, await later; never raises ([`DataResult`])
//! - [`await_apis2`] / [`await_apis3`] - fixed-arity concurrent join with positional results
//! - [`ParallelJoin`] / [`in_parallel`] - open-ended fan-out/join with recoverable failures
//! - [`block_on_api`] - blocking wait with timeout for callers that cannot suspend
//!
//! ```rust
//! use weave_core::adapter::{await_api, await_apis2};
//! use weave_core::request::Callback;
//!
//! # tokio_test::block_on(async {
//! let name = await_api(|cb: Callback<String>| {
//!     cb.on_success("Biology 101".to_string(), None);
//! })
//! .await?;
//!
//! let (count, open) = await_apis2(
//!     |cb: Callback<u32>| { cb.on_success(12, None); },
//!     |cb: Callback<bool>| { cb.on_success(true, None); },
//! )
//! .await?;
//! assert_eq!((name.as_str(), count, open), ("Biology 101", 12, true));
//! # Ok::<(), weave_core::WeaveError>(())
//! # }).unwrap();
//! ```

pub mod deferred;
pub mod multi;
pub mod parallel;
pub mod single;

pub use deferred::{api_async, api_response_async, DataResult, Deferred};
pub use multi::{await_apis2, await_apis3};
pub use parallel::{in_parallel, ParallelJoin};
pub use single::{
    await_api, await_api_response, await_api_with, block_on_api, block_on_api_default,
};
