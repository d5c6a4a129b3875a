mod common;

use common::strategies::*;
use common::{FakeTransport, Script};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use weave_core::adapter::{await_apis2, await_apis3};
use weave_core::pagination::Stitcher;

fn script<T>(value: T, delay: Duration) -> Script<T> {
    if delay.is_zero() {
        Script::Succeed(value, None)
    } else {
        Script::SucceedAfter(delay, value, None)
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: 2-way results are positional regardless of completion order
    #[test]
    fn two_way_results_are_positional(
        a in any::<u32>(),
        b in "[a-z]{1,8}",
        delay_a in delay_strategy(),
        delay_b in delay_strategy(),
    ) {
        let transport = FakeTransport::new();
        let result = runtime().block_on(await_apis2(
            transport.issuer(script(a, delay_a)),
            transport.issuer(script(b.clone(), delay_b)),
        ));
        prop_assert_eq!(result.unwrap(), (a, b));
        prop_assert_eq!(transport.cancelled(), 0);
    }

    /// Property: 3-way results are positional regardless of completion order
    #[test]
    fn three_way_results_are_positional(
        values in any::<(u8, i64, bool)>(),
        delays in (delay_strategy(), delay_strategy(), delay_strategy()),
    ) {
        let transport = FakeTransport::new();
        let result = runtime().block_on(await_apis3(
            transport.issuer(script(values.0, delays.0)),
            transport.issuer(script(values.1, delays.1)),
            transport.issuer(script(values.2, delays.2)),
        ));
        prop_assert_eq!(result.unwrap(), values);
    }

    /// Property: exhaustive stitching delivers every page's items in page order
    #[test]
    fn exhaustive_stitching_preserves_page_order(pages in page_sequence_strategy()) {
        let transport = FakeTransport::new();
        let expected: Vec<u32> = pages.iter().flat_map(|(items, _)| items.clone()).collect();
        let page_count = pages.len();
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&collected);

        let stitcher = Stitcher::builder()
            .on_request(transport.pages(pages, None))
            .on_response(move |items: &Vec<u32>| sink.lock().extend_from_slice(items))
            .exhaustive(true)
            .build()
            .unwrap();
        runtime().block_on(stitcher.run()).unwrap();

        prop_assert_eq!(collected.lock().clone(), expected);
        prop_assert_eq!(transport.issued(), page_count);
    }
}
