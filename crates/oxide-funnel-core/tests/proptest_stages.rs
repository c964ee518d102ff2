use oxide_funnel_core::config::split_list;
use oxide_funnel_core::delivery::BatchPlan;
use oxide_funnel_core::funnel::{FunnelStage, StageTracker};
use oxide_funnel_core::gateway::{MediaItem, MediaRef};
use proptest::prelude::*;

const STAGES: [FunnelStage; 8] = [
    FunnelStage::Idle,
    FunnelStage::ComboScheduled,
    FunnelStage::ComboDelivered,
    FunnelStage::UpsellSent,
    FunnelStage::PollingMembership,
    FunnelStage::Approved,
    FunnelStage::RemarketingSent,
    FunnelStage::Abandoned,
];

fn rank(stage: FunnelStage) -> usize {
    match stage {
        FunnelStage::Approved | FunnelStage::RemarketingSent | FunnelStage::Abandoned => 5,
        other => STAGES.iter().position(|s| *s == other).unwrap_or(0),
    }
}

proptest! {
    /// Whatever transitions are requested, a chat never returns to an earlier stage.
    #[test]
    fn stages_are_monotonic(requests in proptest::collection::vec(0usize..STAGES.len(), 0..40)) {
        let tracker = StageTracker::new();
        let mut previous = tracker.get(1);
        for index in requests {
            let next = STAGES[index];
            let accepted = tracker.advance(1, next);
            let current = tracker.get(1);
            prop_assert_eq!(accepted, previous.can_advance_to(next));
            prop_assert!(rank(current) >= rank(previous));
            if accepted {
                prop_assert!(rank(current) > rank(previous));
            }
            previous = current;
        }
    }

    /// Splitting never yields empty tokens or separators.
    #[test]
    fn split_list_drops_separators(raw in "[a-z0-9,; \\t]{0,64}") {
        for token in split_list(Some(&raw)) {
            prop_assert!(!token.is_empty());
            prop_assert!(!token.contains([',', ';', ' ', '\t']));
        }
    }

    /// Two or more items make an album, one is sent alone, none sends nothing.
    #[test]
    fn batch_plan_follows_grouping_threshold(k in 0usize..12) {
        let items: Vec<MediaItem> = (0..k)
            .map(|i| MediaItem::Photo(MediaRef::FileId(format!("p{i}"))))
            .collect();
        match BatchPlan::for_items(items.clone()) {
            BatchPlan::Skip => prop_assert_eq!(k, 0),
            BatchPlan::Single(item) => {
                prop_assert_eq!(k, 1);
                prop_assert_eq!(Some(&item), items.first());
            }
            BatchPlan::Group(group) => {
                prop_assert!(k >= 2);
                prop_assert_eq!(group, items);
            }
        }
    }
}
