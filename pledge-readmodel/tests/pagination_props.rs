use pledge_core::{FilterSet, SubjectId};
use pledge_readmodel::CampaignAnalytics;
use pledge_storage::CacheKey;
use pledge_test_utils::assertions::assert_config_error;
use pledge_test_utils::fixtures::{campaign_row, memory_repository};
use pledge_test_utils::generators::arb_filter_set;
use pledge_test_utils::ScriptedBuilder;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn pages_partition_the_collection(rows in 0u64..40, per_page in 1u64..9) {
        let rt = runtime();
        let mut builder = ScriptedBuilder::<CampaignAnalytics>::new();
        for id in 1..=rows {
            builder = builder.with_row(id, campaign_row(1, 1, "peer"));
        }
        let repo = memory_repository(builder);
        let filters = FilterSet::new();

        let first = rt.block_on(repo.paginate(&filters, 1, per_page)).expect("paginate");
        prop_assert_eq!(first.total, rows);

        let mut seen = Vec::new();
        for page in 1..=first.last_page() {
            let page = rt.block_on(repo.paginate(&filters, page, per_page)).expect("paginate");
            prop_assert!(page.items.len() as u64 <= per_page);
            seen.extend(page.items.into_iter().filter_map(|m| m.id().as_u64()));
        }

        let expected: Vec<u64> = (1..=rows).collect();
        prop_assert_eq!(seen, expected);

        let beyond = rt
            .block_on(repo.paginate(&filters, first.last_page() + 1, per_page))
            .expect("paginate");
        prop_assert!(beyond.items.is_empty());
        prop_assert!(!beyond.has_more());
    }

    #[test]
    fn equal_filter_sets_share_a_key(filters in arb_filter_set()) {
        let rebuilt: FilterSet = filters
            .iter()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let id = SubjectId::from(7u64);
        prop_assert_eq!(
            CacheKey::new("campaign_analytics", &id, &filters),
            CacheKey::new("campaign_analytics", &id, &rebuilt)
        );
    }
}

#[test]
fn zero_page_and_zero_size_are_rejected() {
    let rt = runtime();
    let repo = memory_repository(ScriptedBuilder::<CampaignAnalytics>::new());
    let filters = FilterSet::new();

    assert_config_error(&rt.block_on(repo.paginate(&filters, 0, 10)));
    assert_config_error(&rt.block_on(repo.paginate(&filters, 1, 0)));
    assert_eq!(repo.builder().count_calls(), 0);
}
