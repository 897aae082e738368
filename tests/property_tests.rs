//! Property-based tests for flowtune
//!
//! - Design balance and orthogonality for any valid variable set
//! - Frontier soundness: no frontier point is dominated, never empty
//! - Contributions sum to 100% for any utilities
//! - Score normalization and retry backoff bounds
//!
//! Run with ProptestConfig::with_cases(100)

use std::collections::HashMap;
use std::time::Duration;

use flowtune::analysis::effects::CONTRIBUTION_TOLERANCE;
use flowtune::analysis::{main_effects, Axis, ParetoFrontier};
use flowtune::design::{generate, Variable, MAX_VARIABLES, MIN_VARIABLES};
use flowtune::judge::{extract_dimensions, parse_payload, RetryPolicy, Rubric, RubricDimension};
use flowtune::topk::{top_k_positions, SortOrder};
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

fn arb_variables() -> impl Strategy<Value = Vec<Variable>> {
    (MIN_VARIABLES..=MAX_VARIABLES).prop_map(|n| {
        (0..n)
            .map(|i| Variable::new(format!("v{i}"), i64::try_from(i).unwrap(), i64::try_from(i).unwrap() + 100).unwrap())
            .collect()
    })
}

fn arb_points() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.0f64..1.0, 0.0f64..1.0), 1..=8)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_design_is_balanced_and_orthogonal(vars in arb_variables()) {
        let configs = generate(&vars).unwrap();
        prop_assert_eq!(configs.len(), 8);

        for (i, x) in vars.iter().enumerate() {
            for y in &vars[i + 1..] {
                let mut pairs: HashMap<(String, String), usize> = HashMap::new();
                for c in &configs {
                    let key = (c.value(x.name()).unwrap().to_string(), c.value(y.name()).unwrap().to_string());
                    *pairs.entry(key).or_default() += 1;
                }
                prop_assert_eq!(pairs.len(), 4);
                prop_assert!(pairs.values().all(|&n| n == 2));
            }
        }
    }

    #[test]
    fn prop_frontier_is_sound(points in arb_points()) {
        let values: Vec<(u8, f64, f64)> = points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| (u8::try_from(i + 1).unwrap(), x, y))
            .collect();
        let frontier = ParetoFrontier::from_values(Axis::Cost, Axis::Quality, values, None).unwrap();
        let optimal = frontier.optimal_points();

        prop_assert!(!optimal.is_empty());
        for p in &optimal {
            prop_assert!(p.dominated_by.is_none());
            for q in &frontier.points {
                let dominates = q.x <= p.x && q.y >= p.y && (q.x < p.x || q.y > p.y);
                prop_assert!(!dominates);
            }
        }
        for p in frontier.dominated_points() {
            if let Some(by) = p.dominated_by {
                let champion = frontier.point(by).unwrap();
                prop_assert!(champion.optimal);
                prop_assert!(champion.x <= p.x && champion.y >= p.y);
            }
        }
    }

    #[test]
    fn prop_contributions_sum_to_hundred(
        vars in arb_variables(),
        utilities in prop::collection::vec(-1.0f64..1.0, 8),
    ) {
        let configs = generate(&vars).unwrap();
        let effects = main_effects(&vars, &configs, &utilities).unwrap();
        let total: f64 = effects.iter().map(|e| e.contribution_pct).sum();
        let sum_of_squares: f64 = effects.iter().map(|e| e.sum_of_squares).sum();

        if sum_of_squares > 0.0 {
            prop_assert!((total - 100.0).abs() <= CONTRIBUTION_TOLERANCE);
        } else {
            prop_assert!(total == 0.0);
        }
    }

    #[test]
    fn prop_scores_normalize_into_unit_range(raw in 0.0f64..=100.0) {
        let rubric = Rubric::new([("clarity".to_string(), RubricDimension::new("clear?", "0-100"))]).unwrap();
        let text = format!("{{\"clarity\": {raw}}}");
        let payload = parse_payload(&text).unwrap();
        let dims = extract_dimensions(&payload, &rubric, &text).unwrap();
        let score = dims["clarity"].score;
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn prop_backoff_is_capped_and_monotonic(retry in 1u32..40) {
        let policy = RetryPolicy::default();
        let current = policy.backoff(retry);
        let next = policy.backoff(retry + 1);
        prop_assert!(current <= policy.max_delay);
        prop_assert!(next >= current);
        let jittered = policy.delay(retry);
        prop_assert!(jittered >= current);
        prop_assert!(jittered <= current + current.mul_f64(policy.jitter) + Duration::from_millis(1));
    }

    #[test]
    fn prop_top_k_is_sorted(values in prop::collection::vec(-1000.0f64..1000.0, 1..200), k in 1usize..20) {
        let positions = top_k_positions(values.iter().copied(), k, SortOrder::Descending).unwrap();
        prop_assert_eq!(positions.len(), k.min(values.len()));
        for pair in positions.windows(2) {
            prop_assert!(values[pair[0]] >= values[pair[1]]);
        }
    }
}
