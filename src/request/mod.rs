//! # Request/Callback Contract
//!
//! The boundary every adapter builds on: an issuer is handed a [`Callback`],
//! performs one request and resolves the callback exactly once. Adapters turn
//! that callback into a [`Completion`] future and forward cancellation back
//! down to the issuer through [`Callback::on_cancel`] hooks.
//!
//! ```rust
//! use weave_core::request::{completion, Callback, Delivery};
//!
//! # tokio_test::block_on(async {
//! let (handle, done) = completion::<String>();
//! let callback = Callback::new(move |delivery| {
//!     if let Delivery::Success(response) = delivery {
//!         handle.resolve(response.body);
//!     }
//! });
//!
//! callback.on_success("page".to_string(), None);
//! assert_eq!(done.await.unwrap(), "page");
//! # });
//! ```

pub mod callback;
pub mod completion;
pub mod envelope;

pub use callback::{Callback, CancelHandle, Cancellable, Delivery, RequestIssuer};
pub use completion::{completion, Completion, CompletionHandle, HandlePhase};
pub use envelope::{
    parse_next_link, ApiResponse, FailureClassifier, FailureEnvelope, FailureKind, RawResponse,
    RequestRef, StatusClassifier, UNAUTHORIZED,
};
