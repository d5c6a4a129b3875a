#![allow(dead_code)]

pub mod fake_transport;
pub mod strategies;

pub use fake_transport::*;

use std::time::Duration;
use weave_core::pagination::{PageController, PagerState};

/// Poll until the session reaches `state`, failing the test after two seconds
pub async fn wait_for_state(controller: &PageController, state: PagerState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while controller.state() != state {
        assert!(
            tokio::time::Instant::now() < deadline,
            "session stuck in {} waiting for {}",
            controller.state(),
            state
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
