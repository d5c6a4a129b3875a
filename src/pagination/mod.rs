//! # Pagination
//!
//! Sequential page fetching driven by continuation tokens.
//!
//! - [`Stitcher`] - URL continuation (explicit metadata or `Link` header), unified or split issuers
//! - [`GraphQlPager`] - cursor continuation read from the response body, run on the foreground lane
//! - [`depaginate`] - collect every page of a list endpoint
//!
//! Both sessions issue one page at a time and expose a [`PageController`] for
//! interactive `next()` calls and cancellation.
//!
//! ```rust
//! use weave_core::pagination::{PageRequest, Stitcher};
//! use weave_core::request::Callback;
//!
//! # tokio_test::block_on(async {
//! let stitcher = Stitcher::builder()
//!     .on_request(|request: &PageRequest, cb: Callback<Vec<u32>>| {
//!         match request.token() {
//!             None => cb.on_success(vec![1, 2], Some("/grades?page=2".to_string())),
//!             Some(_) => cb.on_success(vec![3], None),
//!         };
//!     })
//!     .on_response(|grades| println!("page: {grades:?}"))
//!     .exhaustive(true)
//!     .build()?;
//! stitcher.run().await?;
//! # Ok::<(), weave_core::WeaveError>(())
//! # }).unwrap();
//! ```

pub mod depaginate;
pub(crate) mod driver;
pub mod graphql;
pub mod state;
pub mod stitcher;

pub use depaginate::depaginate;
pub use graphql::{GraphQlErrorEntry, GraphQlPager, GraphQlPagerBuilder, GraphQlResponse, PageInfo};
pub use state::{PageController, PageRequest, PagerState};
pub use stitcher::{Stitcher, StitcherBuilder};
