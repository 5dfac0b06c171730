mod common;

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;

use pinball_lineup::config::OptimizerConfig;
use pinball_lineup::model::{Lineup, MatchFormat, OptimizationResult, PairAssignment};
use pinball_lineup::pairs::{PairTable, pair_partitions, permutations};
use pinball_lineup::scoring::ScoringMatrix;
use pinball_lineup::stats::InMemoryStats;
use pinball_lineup::{LineupOptimizer, OptimizeError};

use common::{FailingStats, machines, pair, players, random_stats, seasons};

const PLAYERS: [&str; 8] = ["Amy", "Bo", "Cy", "Dee", "Eli", "Fay", "Gus", "Hal"];
const MACHINES: [&str; 4] = ["M1", "M2", "M3", "M4"];

fn pair_legs(lineup: &Lineup) -> &[PairAssignment] {
    let Lineup::Pairs(legs) = lineup else {
        panic!("expected pairs lineup");
    };
    legs
}

fn assert_partition(lineup: &Lineup) {
    let legs = pair_legs(lineup);
    assert_eq!(legs.len(), 4);
    let mut seen = HashSet::new();
    for leg in legs {
        assert!(leg.player1 < leg.player2);
        assert!(seen.insert(leg.player1.as_str()));
        assert!(seen.insert(leg.player2.as_str()));
    }
    assert_eq!(seen, PLAYERS.iter().copied().collect());
    let ms: Vec<&str> = legs.iter().map(|l| l.machine.as_str()).collect();
    assert_eq!(ms, MACHINES);
}

fn shape(result: &OptimizationResult) -> Vec<(String, String, String)> {
    pair_legs(&result.assignments)
        .iter()
        .map(|l| (l.player1.clone(), l.player2.clone(), l.machine.clone()))
        .collect()
}

#[test]
fn random_rosters_match_brute_force() {
    let roster = players(&PLAYERS);
    let venue = machines(&MACHINES);
    let names = PLAYERS.map(String::from);
    let partitions = pair_partitions();
    let perms = permutations(4);

    for seed in 0..6 {
        let mut rng = StdRng::seed_from_u64(seed);
        let stats = random_stats(&mut rng, &roster, &venue);
        let matrix = ScoringMatrix::build(&stats, &names, &venue, seasons(), &OptimizerConfig::default())
            .expect("matrix");
        let table = &PairTable::build(&stats, &matrix, seasons()).expect("table");

        let mut totals: Vec<f64> = partitions
            .iter()
            .flat_map(|pairs| {
                perms.iter().map(move |perm| {
                    pairs
                        .iter()
                        .zip(perm)
                        .map(|(&(a, b), &m)| table.leg(a, b, m).value)
                        .sum::<f64>()
                })
            })
            .collect();
        assert_eq!(totals.len(), 2520);
        totals.sort_by(|a, b| b.total_cmp(a));

        let result = LineupOptimizer::new(stats)
            .optimize_pairs(&roster, &venue, seasons())
            .expect("optimize");
        assert_eq!(result.format, MatchFormat::Pairs);
        assert_partition(&result.assignments);
        assert_eq!(result.total_score, totals[0], "seed {seed}");

        let leg_sum: f64 = pair_legs(&result.assignments)
            .iter()
            .map(|l| l.expected_score)
            .sum();
        assert_eq!(result.total_score, leg_sum);

        let alt_totals: Vec<f64> = result
            .alternative_assignments
            .iter()
            .map(Lineup::total_score)
            .collect();
        assert_eq!(alt_totals, totals[1..4].to_vec(), "seed {seed}");
        assert!((0.0..=1.0).contains(&result.win_probability));
    }
}

#[test]
fn alternatives_are_distinct_partitions() {
    let roster = players(&PLAYERS);
    let venue = machines(&MACHINES);
    let mut rng = StdRng::seed_from_u64(41);
    let result = LineupOptimizer::new(random_stats(&mut rng, &roster, &venue))
        .optimize_pairs(&roster, &venue, seasons())
        .expect("optimize");

    assert_eq!(result.alternative_assignments.len(), 3);
    let mut seen = HashSet::from([result.assignments.leg_keys()]);
    let mut prev = result.total_score;
    for alt in &result.alternative_assignments {
        assert_partition(alt);
        assert!(seen.insert(alt.leg_keys()));
        assert!(alt.total_score() <= prev);
        prev = alt.total_score();
    }
}

#[test]
fn repeated_runs_serialize_identically() {
    let roster = players(&PLAYERS);
    let venue = machines(&MACHINES);
    let mut rng = StdRng::seed_from_u64(5);
    let optimizer = LineupOptimizer::new(random_stats(&mut rng, &roster, &venue));

    let first = optimizer.optimize_pairs(&roster, &venue, seasons()).unwrap();
    for _ in 0..3 {
        let again = optimizer.optimize_pairs(&roster, &venue, seasons()).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&again).unwrap()
        );
    }
}

#[test]
fn neutral_stats_pair_up_in_name_order() {
    let roster = players(&["Hal", "Cy", "Amy", "Fay", "Bo", "Gus", "Eli", "Dee"]);
    let venue = machines(&MACHINES);
    let result = LineupOptimizer::new(InMemoryStats::new())
        .optimize_pairs(&roster, &venue, seasons())
        .expect("optimize");

    let expected = [
        ("Amy", "Bo", "M1"),
        ("Cy", "Dee", "M2"),
        ("Eli", "Fay", "M3"),
        ("Gus", "Hal", "M4"),
    ]
    .map(|(a, b, m)| (a.to_string(), b.to_string(), m.to_string()));
    assert_eq!(shape(&result), expected);
    assert_eq!(result.total_score, 2.0);
    assert!(
        result
            .suggestions
            .iter()
            .any(|s| s.contains("No history on the assigned machine"))
    );
}

#[test]
fn machine_synergy_overrides_general_synergy() {
    let roster = players(&PLAYERS);
    let venue = machines(&MACHINES);
    let mut stats = InMemoryStats::new();
    stats.insert_pair(pair("Hal", "Amy", None, -0.5));
    stats.insert_pair(pair("Amy", "Hal", Some("M3"), 0.25));

    let result = LineupOptimizer::new(stats)
        .optimize_pairs(&roster, &venue, seasons())
        .expect("optimize");

    let expected = [
        ("Bo", "Cy", "M1"),
        ("Dee", "Eli", "M2"),
        ("Amy", "Hal", "M3"),
        ("Fay", "Gus", "M4"),
    ]
    .map(|(a, b, m)| (a.to_string(), b.to_string(), m.to_string()));
    assert_eq!(shape(&result), expected);

    let legs = pair_legs(&result.assignments);
    assert_eq!(legs[2].synergy_bonus, 0.25);
    assert_eq!(legs[2].expected_score, 0.75);
    assert_eq!(result.total_score, 2.25);
    assert!(result.suggestions.iter().any(|s| s.contains("Amy and Hal show strong synergy on M3")));
}

#[test]
fn wrong_roster_sizes_are_rejected() {
    let optimizer = LineupOptimizer::new(InMemoryStats::new());

    let err = optimizer
        .optimize_pairs(&players(&PLAYERS[..7]), &machines(&MACHINES), seasons())
        .unwrap_err();
    assert!(err.is_contract_violation());

    let err = optimizer
        .optimize_pairs(
            &players(&PLAYERS),
            &machines(&["M1", "M2", "M3", "M4", "M5"]),
            seasons(),
        )
        .unwrap_err();
    assert!(err.is_contract_violation());

    let err = optimizer
        .optimize_pairs(
            &players(&["Amy", "Bo", "Cy", "Dee", "Eli", "Fay", "Gus", " "]),
            &machines(&MACHINES),
            seasons(),
        )
        .unwrap_err();
    assert!(err.is_contract_violation());
}

#[test]
fn resolver_failure_surfaces_as_upstream_error() {
    let optimizer = LineupOptimizer::new(FailingStats {
        broken_player: "Gus".to_string(),
    });
    let err = optimizer
        .optimize_pairs(&players(&PLAYERS), &machines(&MACHINES), seasons())
        .unwrap_err();
    assert!(matches!(err, OptimizeError::UpstreamDataFailure(ref msg) if msg.contains("Gus")));
}
