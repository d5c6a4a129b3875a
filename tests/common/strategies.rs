use proptest::prelude::*;
use std::time::Duration;

/// Delivery delay for a scripted response; zero means synchronous
pub fn delay_strategy() -> impl Strategy<Value = Duration> {
    prop_oneof![Just(Duration::ZERO), (1u64..15).prop_map(Duration::from_millis)]
}

/// Page payloads with a continuation token on every page but the last
pub fn page_sequence_strategy() -> impl Strategy<Value = Vec<(Vec<u32>, Option<String>)>> {
    prop::collection::vec(prop::collection::vec(any::<u32>(), 0..5), 1..6).prop_map(|pages| {
        let last = pages.len() - 1;
        pages
            .into_iter()
            .enumerate()
            .map(|(index, items)| {
                let next = (index < last).then(|| format!("/items?page={}", index + 2));
                (items, next)
            })
            .collect()
    })
}
