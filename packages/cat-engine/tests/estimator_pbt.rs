//! Property-Based Tests for ability estimation, partitioning and selection
//!
//! Tests the following invariants:
//! - Bounds: estimate() stays inside [min_theta, max_theta] with SE >= 0
//! - Idempotence: partitioning the same corpus twice yields identical pools
//! - Selection: no repeats, pool shrinks by exactly one per pick
//! - Termination: the adaptive phase never exceeds max_items

use proptest::prelude::*;
use std::collections::HashSet;

use cat_engine::{
    partition, AbilityEstimator, AssessmentStage, CatConfig, EstimationMethod, EstimatorSettings,
    IrtParams, Item, ItemSelect, ItemSelector, PartitionRules, Phase, ScoredResponse,
    TrialSequencer,
};

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_params() -> impl Strategy<Value = IrtParams> {
    (0.2f64..=2.5f64, -4.0f64..=4.0f64, 0.0f64..=0.35f64)
        .prop_map(|(a, b, c)| IrtParams::new(a, b, c))
}

fn arb_history() -> impl Strategy<Value = Vec<ScoredResponse>> {
    prop::collection::vec(
        (arb_params(), any::<bool>()).prop_map(|(p, u)| ScoredResponse::new(p, u)),
        0..40,
    )
}

fn arb_item_select() -> impl Strategy<Value = ItemSelect> {
    prop_oneof![
        Just(ItemSelect::Closest),
        Just(ItemSelect::Mfi),
        Just(ItemSelect::Random),
    ]
}

fn arb_stage() -> impl Strategy<Value = AssessmentStage> {
    prop_oneof![
        Just(AssessmentStage::Instructions),
        Just(AssessmentStage::PracticeResponse),
        Just(AssessmentStage::TestResponse),
        Just(AssessmentStage::TestResponse),
    ]
}

fn arb_corpus() -> impl Strategy<Value = Vec<Item>> {
    prop::collection::vec(
        (arb_stage(), proptest::option::of(-3.0f64..=3.0f64)),
        0..40,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (stage, b))| {
                let item = Item::new(format!("item-{i:03}"), stage);
                match b {
                    Some(b) => item.with_difficulty(b),
                    None => item,
                }
            })
            .collect()
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_mle_estimate_within_bounds(history in arb_history(), prior in -6.0f64..=6.0f64) {
        let estimator = AbilityEstimator::default();
        let est = estimator.estimate(&history, prior);
        prop_assert!(est.theta >= -6.0 && est.theta <= 6.0, "theta {}", est.theta);
        prop_assert!(est.standard_error >= 0.0);
        prop_assert!(est.standard_error.is_finite());
    }

    #[test]
    fn prop_eap_estimate_within_bounds(history in arb_history()) {
        let estimator = AbilityEstimator::new(EstimatorSettings {
            method: EstimationMethod::Eap,
            min_theta: -4.0,
            max_theta: 4.0,
            ..Default::default()
        });
        let est = estimator.estimate(&history, 0.0);
        prop_assert!(est.theta >= -4.0 && est.theta <= 4.0);
        prop_assert!(est.standard_error >= 0.0);
    }

    #[test]
    fn prop_partition_is_idempotent(corpus in arb_corpus(), start_items in 0usize..5) {
        let rules = PartitionRules::default().with_start_items(start_items);
        let first = partition(&corpus, &rules);
        let second = partition(&corpus, &rules);
        prop_assert_eq!(first.ids(), second.ids());

        let total =
            first.ip_light.len() + first.start.len() + first.cat.len() + first.unnormed.len();
        prop_assert_eq!(total, corpus.len());
    }

    #[test]
    fn prop_selection_never_repeats(
        difficulties in prop::collection::vec(-3.0f64..=3.0f64, 0..30),
        rule in arb_item_select(),
        seed in any::<u64>(),
        theta in -3.0f64..=3.0f64,
    ) {
        let mut pool: Vec<Item> = difficulties
            .iter()
            .enumerate()
            .map(|(i, &b)| Item::test(format!("item-{i:03}"), b))
            .collect();
        let mut selector = ItemSelector::with_seed(rule, seed);
        let mut seen = HashSet::new();

        loop {
            let before = pool.len();
            let Some(item) = selector.select_next(&mut pool, theta) else {
                break;
            };
            prop_assert_eq!(pool.len(), before - 1);
            prop_assert!(seen.insert(item.id));
        }
        prop_assert_eq!(seen.len(), difficulties.len());
        prop_assert!(pool.is_empty());
    }

    #[test]
    fn prop_adaptive_phase_bounded_by_max_items(
        corpus in arb_corpus(),
        max_items in 1usize..15,
        answers in prop::collection::vec(any::<bool>(), 64),
        seed in any::<u64>(),
    ) {
        let config = CatConfig {
            max_items,
            sem_threshold: 0.0,
            seed: Some(seed),
            ..Default::default()
        };
        let mut seq = TrialSequencer::new(&corpus, config).unwrap();
        let mut adaptive = 0;
        let mut steps = 0;

        while let Some(trial) = seq.next_trial() {
            if trial.phase == Phase::Adaptive {
                adaptive += 1;
            }
            seq.submit(answers[steps % answers.len()]).unwrap();
            steps += 1;
            prop_assert!(steps <= corpus.len());
        }
        prop_assert!(adaptive <= max_items);
        prop_assert!(seq.is_done());
        prop_assert_eq!(seq.responses().len(), steps);
    }
}
