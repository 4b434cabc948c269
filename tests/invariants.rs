use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reputation_oracle::calibrate::{calibrate, Group};
use reputation_oracle::center::center;
use reputation_oracle::fixed::{self, checked_sum};
use reputation_oracle::interpolate::interpolate;
use reputation_oracle::{
    resolve_batch, resolve_round, round_digest, ConsensusConfig, ConsensusError, EventBounds,
    Fixed, Matrix, ReportMatrix, RoundInput, RoundOutcome,
};

/// Random round: binary cells are NO, YES or missing with equal odds, half
/// the events are scaled with integer bounds below 100, reputation is an
/// integer in `[1, 100)`.
fn random_round<R: Rng>(rng: &mut R, reporters: usize, events: usize) -> RoundInput {
    let mut bounds = Vec::with_capacity(events);
    let mut ranges = Vec::with_capacity(events);
    for _ in 0..events {
        if rng.gen_bool(0.5) {
            let max: i64 = rng.gen_range(1..100);
            let min: i64 = rng.gen_range(0..max);
            bounds.push(EventBounds::scaled(Fixed::from_int(min), Fixed::from_int(max)).unwrap());
            ranges.push(Some((min, max)));
        } else {
            bounds.push(EventBounds::binary());
            ranges.push(None);
        }
    }
    let mut rows: Vec<Vec<Option<Fixed>>> = (0..reporters)
        .map(|_| {
            ranges
                .iter()
                .map(|range| match (rng.gen_range(0..3), range) {
                    (0, _) => None,
                    (_, Some((min, max))) => Some(Fixed::from_int(rng.gen_range(*min..=*max))),
                    (1, None) => Some(Fixed::ZERO),
                    (_, None) => Some(Fixed::ONE),
                })
                .collect()
        })
        .collect();
    for (j, event) in bounds.iter().enumerate() {
        if rows.iter().all(|row| row[j].is_none()) {
            rows[0][j] = Some(if event.scaled { event.min } else { Fixed::ONE });
        }
    }
    RoundInput {
        reports: ReportMatrix::from_rows(rows).unwrap(),
        reputation: (0..reporters)
            .map(|_| Fixed::from_int(rng.gen_range(1..100)))
            .collect(),
        events: bounds,
    }
}

/// Resolves a round.  A reputation collapse needs every rewarded score to
/// round away and is tolerated; any other failure is a bug.
fn resolve_or_skip(input: &RoundInput, config: &ConsensusConfig) -> Option<RoundOutcome> {
    match resolve_round(input, config) {
        Ok(outcome) => Some(outcome),
        Err(ConsensusError::NegativeReputationCollapse) => None,
        Err(err) => panic!("unexpected failure: {err}"),
    }
}

fn round_strategy() -> impl Strategy<Value = RoundInput> {
    (any::<u64>(), 1usize..10, 1usize..6)
        .prop_map(|(seed, n, m)| random_round(&mut StdRng::seed_from_u64(seed), n, m))
}

proptest! {
    #[test]
    fn prop_reputation_is_conserved(input in round_strategy()) {
        if let Some(outcome) = resolve_or_skip(&input, &ConsensusConfig::default()) {
            let before = checked_sum(input.reputation.iter().copied()).unwrap();
            let after = checked_sum(outcome.reputation.iter().copied()).unwrap();
            prop_assert_eq!(before, after);
            prop_assert!(outcome.reputation.iter().all(|r| !r.is_negative()));
        }
    }

    #[test]
    fn prop_solver_respects_iteration_cap(input in round_strategy(), cap in 1u32..8) {
        let config = ConsensusConfig { max_iterations: cap, ..ConsensusConfig::default() };
        if let Some(outcome) = resolve_or_skip(&input, &config) {
            prop_assert!(outcome.iterations <= cap);
            if !outcome.converged {
                prop_assert_eq!(outcome.iterations, cap);
            }
        }
    }

    #[test]
    fn prop_loading_vector_has_unit_norm(input in round_strategy()) {
        if let Some(outcome) = resolve_or_skip(&input, &ConsensusConfig::default()) {
            let length = fixed::norm(&outcome.loading).unwrap().to_f64();
            prop_assert!((length - 1.0).abs() < 1e-12, "norm {}", length);
        }
    }

    #[test]
    fn prop_outcomes_stay_in_range(input in round_strategy()) {
        if let Some(outcome) = resolve_or_skip(&input, &ConsensusConfig::default()) {
            for (value, bounds) in outcome.outcomes.iter().zip(&input.events) {
                let slack = Fixed::from_raw(1 << 20);
                prop_assert!(*value >= bounds.min.checked_sub(slack).unwrap());
                prop_assert!(*value <= bounds.max.checked_add(slack).unwrap());
                if !bounds.scaled {
                    prop_assert!([Fixed::ZERO, Fixed::HALF, Fixed::ONE].contains(value));
                }
            }
        }
    }

    #[test]
    fn prop_interpolation_is_identity_on_complete_data(
        cells in proptest::collection::vec(proptest::collection::vec(0i64..=100, 3), 1..8),
    ) {
        let events = vec![EventBounds::scaled(Fixed::ZERO, Fixed::from_int(100)).unwrap(); 3];
        let reputation = vec![Fixed::ONE; cells.len()];
        let reports = ReportMatrix::from_rows(
            cells
                .iter()
                .map(|row| row.iter().map(|&v| Some(Fixed::from_int(v))).collect())
                .collect(),
        )
        .unwrap();
        let out = interpolate(&reports, &reputation, &events, Fixed::from_ratio(1, 10).unwrap()).unwrap();
        prop_assert_eq!(out.mask.imputed_total(), 0);
        for (i, row) in cells.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                let expected = events[j].normalize(Fixed::from_int(v)).unwrap();
                prop_assert_eq!(out.filled.get(i, j), expected);
            }
        }
    }

    #[test]
    fn prop_calibration_groups_partition_reporters(
        scores in proptest::collection::vec(-1000i64..1000, 1..20),
    ) {
        let scores: Vec<Fixed> = scores
            .iter()
            .map(|&s| Fixed::from_ratio(s, 1000).unwrap())
            .collect();
        let n = scores.len();
        let weights = fixed::normalize(&vec![Fixed::ONE; n]).unwrap();
        let mut filled = Matrix::zeros(n, 1);
        for i in 0..n {
            filled.set(i, 0, if i % 2 == 0 { Fixed::ONE } else { Fixed::ZERO });
        }
        let cal = calibrate(&scores, &weights, &filled).unwrap();
        let mut seen: Vec<usize> = cal.members(Group::First).chain(cal.members(Group::Second)).collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..n).collect::<Vec<_>>());
        for i in cal.members(Group::Second) {
            prop_assert!(scores[i].is_negative());
        }
    }

    #[test]
    fn prop_centered_columns_have_zero_weighted_mean(input in round_strategy()) {
        let config = ConsensusConfig::default();
        let filled = interpolate(&input.reports, &input.reputation, &input.events, config.catch_tolerance).unwrap();
        let (centered, _) = center(&filled.filled, &input.reputation, config.max_iterations).unwrap();
        for j in 0..centered.matrix.cols() {
            let mean = fixed::dot(&centered.weights, &centered.matrix.column(j)).unwrap();
            prop_assert!(mean.raw().abs() < 64, "column {} mean {}", j, mean);
        }
    }
}

#[test]
fn test_randomized_rounds_are_reproducible() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let config = ConsensusConfig::default();
    let rounds: Vec<RoundInput> = (0..16).map(|_| random_round(&mut rng, 50, 25)).collect();
    let first = resolve_batch(&rounds, &config);
    let second = resolve_batch(&rounds, &config);
    assert_eq!(first, second);
    for (input, result) in rounds.iter().zip(&first) {
        let outcome = result.as_ref().unwrap();
        let again = resolve_round(input, &config).unwrap();
        assert_eq!(round_digest(input, outcome), round_digest(input, &again));
    }
}

#[test]
fn test_small_random_rounds_resolve() {
    let mut rng = StdRng::seed_from_u64(7);
    let config = ConsensusConfig::default();
    let mut skipped = 0;
    for _ in 0..2000 {
        let reporters = rng.gen_range(2..10);
        let events = rng.gen_range(1..6);
        let input = random_round(&mut rng, reporters, events);
        if resolve_or_skip(&input, &config).is_none() {
            skipped += 1;
        }
    }
    assert!(skipped <= 5, "{skipped} rounds collapsed");
}

#[test]
fn test_large_random_round_conserves_reputation() {
    let mut rng = StdRng::seed_from_u64(2014);
    let input = random_round(&mut rng, 50, 25);
    let outcome = resolve_round(&input, &ConsensusConfig::default()).unwrap();
    assert_eq!(
        checked_sum(outcome.reputation.iter().copied()).unwrap(),
        checked_sum(input.reputation.iter().copied()).unwrap()
    );
    let missing = (0..50)
        .flat_map(|i| (0..25).map(move |j| (i, j)))
        .filter(|&(i, j)| input.reports.get(i, j).is_none())
        .count();
    assert_eq!(outcome.mask.imputed_total(), missing);
}
