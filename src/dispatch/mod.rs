//! # Dispatch
//!
//! Execution lanes and the try/catch combinator.
//!
//! ```rust
//! use weave_core::dispatch::{try_weave, Lane};
//!
//! # tokio_test::block_on(async {
//! let job = try_weave(Lane::Background, async {
//!     anyhow::ensure!(2 + 2 == 4, "arithmetic is broken");
//!     Ok(())
//! })
//! .catch(|error| eprintln!("roster refresh failed: {error}"));
//! job.join().await.unwrap();
//! # });
//! ```

pub mod lanes;
pub mod try_weave;

pub use lanes::{in_background, on_foreground, Dispatcher, Lane};
pub use try_weave::{try_weave, weave, ScopedTryWeave, TryWeave, WeaveJob, WeaveScope};
