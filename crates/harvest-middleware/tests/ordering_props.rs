//! Property tests for profile ordering.

use harvest_core::MiddlewareGroup;
use harvest_middleware::{Next, Profile, Stage};
use proptest::prelude::*;

fn group_strategy() -> impl Strategy<Value = MiddlewareGroup> {
    prop::sample::select(MiddlewareGroup::all().to_vec())
}

fn pass_through() -> Stage {
    Stage::closure(|request, next: Next| async move { next.handle(request).await })
}

proptest! {
    #[test]
    fn ordered_list_is_sorted_and_stable(
        entries in prop::collection::vec((group_strategy(), -20i32..20), 0..40)
    ) {
        let mut profile = Profile::new();
        let mut expected = Vec::new();
        for (insertion, (group, priority)) in entries.iter().enumerate() {
            let stage = pass_through().with_group(*group).with_priority(*priority);
            expected.push((group.ordinal(), *priority, insertion, stage.name().to_string()));
            profile.add(stage);
        }
        expected.sort();

        let ordered: Vec<String> = profile
            .to_ordered_list()
            .iter()
            .map(|stage| stage.name().to_string())
            .collect();
        let expected: Vec<String> = expected.into_iter().map(|(_, _, _, name)| name).collect();

        prop_assert_eq!(ordered, expected);
        prop_assert!(entries.is_empty() || profile.is_sorted());
    }

    #[test]
    fn removal_invalidates_order(
        priorities in prop::collection::vec(-5i32..5, 1..20),
        victim in any::<prop::sample::Index>()
    ) {
        let mut profile = Profile::new();
        let mut names = Vec::new();
        for priority in &priorities {
            let stage = pass_through().with_priority(*priority);
            names.push(stage.name().to_string());
            profile.add(stage);
        }
        let _ = profile.to_ordered_list();

        let removed = names[victim.index(names.len())].clone();
        prop_assert!(profile.remove(removed.as_str()).is_some());
        prop_assert!(!profile.is_sorted());
        prop_assert!(profile
            .to_ordered_list()
            .iter()
            .all(|stage| stage.name() != removed));
    }
}
