#![allow(clippy::doc_markdown)] // Allow technical terms like GraphQL, RFC in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Weave Core
//!
//! Async orchestration core for callback-driven request APIs.
//!
//! ## Overview
//!
//! Network clients often expose a "do one request, call me back" contract. Weave
//! Core adapts that contract into cancellable futures and composes them:
//! single awaits, non-throwing deferred calls, positional multi-awaits,
//! fail-fast parallel joins, and paginated sessions that fetch page after page
//! either automatically or on demand.
//!
//! ## Key Features
//!
//! - **Resolve-at-most-once**: every callback and completion handle ignores deliveries after completion or cancellation
//! - **Cancellation flows down**: dropping an awaiting future cancels the callback and runs the issuer's cancel hooks
//! - **Fail-fast joins**: the first unrecoverable failure cancels every sibling request
//! - **Pagination**: exhaustive or interactive, unified or split issuers, URL or GraphQL cursor continuation
//! - **Execution lanes**: a serialized foreground lane and a parallel background lane, plus a try/catch combinator
//!
//! ## Module Organization
//!
//! - [`request`] - the Request/Callback contract and response envelopes
//! - [`adapter`] - callback-to-future adapters, multi-await and parallel join
//! - [`pagination`] - pagination sessions and depagination
//! - [`dispatch`] - execution lanes and the try/catch combinator
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//! - [`logging`] - structured logging bootstrap
//!
//! ## Quick Start
//!
//! ```rust
//! use weave_core::{await_api, in_parallel, Callback, WeaveError};
//!
//! # tokio_test::block_on(async {
//! let course = await_api(|cb: Callback<String>| {
//!     cb.on_success("Chemistry".to_string(), None);
//! })
//! .await?;
//!
//! in_parallel(|join| {
//!     join.await_api(
//!         |cb: Callback<u32>| {
//!             cb.on_success(28, None);
//!         },
//!         |enrolled| println!("{enrolled} students"),
//!     );
//! })
//! .await?;
//! # let _ = course;
//! # Ok::<(), WeaveError>(())
//! # }).unwrap();
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod adapter;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod pagination;
pub mod request;

pub use adapter::{
    api_async, api_response_async, await_api, await_api_response, await_api_with, await_apis2,
    await_apis3, block_on_api, block_on_api_default, in_parallel, DataResult, Deferred,
    ParallelJoin,
};
pub use crate::config::{BlockingConfig, ClassificationConfig, DispatcherConfig, WeaveConfig};
pub use dispatch::{
    in_background, on_foreground, try_weave, weave, Dispatcher, Lane, TryWeave, WeaveJob,
    WeaveScope,
};
pub use error::{is_cancellation, WeaveError, WeaveResult};
pub use pagination::{
    depaginate, GraphQlPager, GraphQlResponse, PageController, PageInfo, PageRequest, PagerState,
    Stitcher,
};
pub use request::{
    ApiResponse, Callback, CancelHandle, FailureClassifier, FailureEnvelope, FailureKind,
    RawResponse, RequestIssuer, RequestRef, StatusClassifier,
};
