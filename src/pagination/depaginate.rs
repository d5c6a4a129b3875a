//! Collect every page of a list endpoint into one vector.

use crate::adapter::DataResult;
use crate::request::ApiResponse;
use std::future::Future;
use tracing::debug;

/// Follow continuation from `first` until it runs out, concatenating items.
///
/// `fetch_next` receives each continuation URL and typically returns a
/// [`Deferred`](crate::adapter::Deferred) from
/// [`api_response_async`](crate::adapter::api_response_async). The first failed
/// page short-circuits the whole walk.
pub async fn depaginate<T, F, Fut>(
    first: DataResult<ApiResponse<Vec<T>>>,
    mut fetch_next: F,
) -> DataResult<Vec<T>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = DataResult<ApiResponse<Vec<T>>>>,
{
    let mut page = match first {
        DataResult::Success(page) => page,
        DataResult::Fail(error) => return DataResult::Fail(error),
    };
    let mut items = Vec::new();
    let mut pages = 1usize;
    loop {
        let next = page.continuation();
        items.extend(page.into_body());
        let Some(url) = next else {
            debug!(pages, items = items.len(), "Depagination finished");
            return DataResult::Success(items);
        };
        page = match fetch_next(url).await {
            DataResult::Success(page) => page,
            DataResult::Fail(error) => return DataResult::Fail(error),
        };
        pages += 1;
    }
}
