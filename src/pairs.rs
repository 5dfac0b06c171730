//! Exhaustive search for the doubles format.
//!
//! Eight players split into four unordered pairs in 105 ways and the four pairs
//! map onto four machines in 24 ways, so every one of the 2,520 complete lineups
//! is scored and ranked. Nothing is pruned.

use std::cmp::Ordering;

use anyhow::Context;
use rayon::prelude::*;

use crate::error::OptimizeError;
use crate::model::{PairAssignment, SeasonRange};
use crate::scoring::{ScoringMatrix, confidence_units, snap, value_units};
use crate::stats::StatsResolver;

pub const PLAYERS: usize = 8;
pub const MACHINES: usize = 4;
pub const PARTITIONS: usize = 105;
pub const CANDIDATES: usize = PARTITIONS * 24;

const SYNERGY_LIMIT: f64 = 1.0;

/// Value of one pair on one machine.
#[derive(Debug, Clone, PartialEq)]
pub struct PairLeg {
    pub a: usize,
    pub b: usize,
    pub machine: usize,
    pub base: f64,
    pub synergy_bonus: f64,
    pub value: f64,
    pub confidence: f64,
    pub synergy_games: u32,
}

/// All pair-on-machine legs for one roster, indexed by (pair, machine).
#[derive(Debug, Clone)]
pub struct PairTable {
    legs: Vec<PairLeg>,
}

impl PairTable {
    pub fn build<R: StatsResolver + ?Sized>(
        resolver: &R,
        matrix: &ScoringMatrix,
        seasons: SeasonRange,
    ) -> Result<Self, OptimizeError> {
        let players = matrix.players();
        let machines = matrix.machines();
        let mut legs = Vec::with_capacity(pair_count(players.len()) * machines.len());
        for a in 0..players.len() {
            for b in (a + 1)..players.len() {
                let general = resolver
                    .pair_stat_for(&players[a], &players[b], None, seasons)
                    .with_context(|| format!("pair stats for {} and {}", players[a], players[b]))
                    .map_err(OptimizeError::upstream)?;
                for (m, machine) in machines.iter().enumerate() {
                    let specific = resolver
                        .pair_stat_for(&players[a], &players[b], Some(&machine.name), seasons)
                        .with_context(|| {
                            format!(
                                "pair stats for {} and {} on {}",
                                players[a], players[b], machine.name
                            )
                        })
                        .map_err(OptimizeError::upstream)?;
                    let pair_stat = specific.as_ref().or(general.as_ref());
                    let synergy_bonus = pair_stat
                        .map(|p| p.synergy_score)
                        .filter(|s| s.is_finite())
                        .map(|s| snap(s.clamp(-SYNERGY_LIMIT, SYNERGY_LIMIT)))
                        .unwrap_or(0.0);
                    let left = matrix.cell(a, m);
                    let right = matrix.cell(b, m);
                    let base = snap((left.value + right.value) / 2.0);
                    legs.push(PairLeg {
                        a,
                        b,
                        machine: m,
                        base,
                        synergy_bonus,
                        value: base + synergy_bonus,
                        confidence: (left.confidence + right.confidence) / 2.0,
                        synergy_games: pair_stat.map(|p| p.games_together).unwrap_or(0),
                    });
                }
            }
        }
        Ok(Self { legs })
    }

    pub fn leg(&self, a: usize, b: usize, machine: usize) -> &PairLeg {
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        &self.legs[pair_index(a, b) * MACHINES + machine]
    }
}

fn pair_count(n: usize) -> usize {
    n * (n - 1) / 2
}

/// Position of `(a, b)` with `a < b` in row-major upper-triangle order.
fn pair_index(a: usize, b: usize) -> usize {
    a * (2 * PLAYERS - a - 1) / 2 + (b - a - 1)
}

/// Every way to split players `0..8` into four unordered pairs, each pair `(lo, hi)`.
pub fn pair_partitions() -> Vec<[(usize, usize); 4]> {
    fn extend(
        used: &mut [bool; PLAYERS],
        current: &mut Vec<(usize, usize)>,
        out: &mut Vec<[(usize, usize); 4]>,
    ) {
        let Some(first) = used.iter().position(|u| !u) else {
            out.push([current[0], current[1], current[2], current[3]]);
            return;
        };
        used[first] = true;
        for partner in (first + 1)..PLAYERS {
            if used[partner] {
                continue;
            }
            used[partner] = true;
            current.push((first, partner));
            extend(used, current, out);
            current.pop();
            used[partner] = false;
        }
        used[first] = false;
    }

    let mut out = Vec::with_capacity(PARTITIONS);
    extend(&mut [false; PLAYERS], &mut Vec::with_capacity(4), &mut out);
    out
}

/// All orderings of `0..n` in lexicographic order.
pub fn permutations(n: usize) -> Vec<Vec<usize>> {
    let mut current: Vec<usize> = (0..n).collect();
    let mut out = vec![current.clone()];
    loop {
        let Some(i) = (1..n).rev().find(|&i| current[i - 1] < current[i]) else {
            return out;
        };
        let pivot = i - 1;
        let Some(j) = (i..n).rev().find(|&j| current[j] > current[pivot]) else {
            return out;
        };
        current.swap(pivot, j);
        current[i..].reverse();
        out.push(current.clone());
    }
}

/// One complete doubles lineup: `machine_of[k]` is the machine for `pairs[k]`.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub pairs: [(usize, usize); 4],
    pub machine_of: [usize; 4],
    pub value_units: i64,
    pub confidence_units: i64,
    /// Player name ranks, pair by pair, with machines visited in name order.
    lex: [usize; PLAYERS],
}

impl Candidate {
    /// Legs listed in machine input order.
    pub fn legs<'a>(&self, table: &'a PairTable) -> Vec<&'a PairLeg> {
        let mut legs: Vec<&PairLeg> = self
            .pairs
            .iter()
            .zip(self.machine_of)
            .map(|(&(a, b), m)| table.leg(a, b, m))
            .collect();
        legs.sort_by_key(|leg| leg.machine);
        legs
    }

    pub fn to_assignments(&self, table: &PairTable, matrix: &ScoringMatrix) -> Vec<PairAssignment> {
        let players = matrix.players();
        let machines = matrix.machines();
        self.legs(table)
            .into_iter()
            .map(|leg| {
                let (p1, p2) = ordered_names(&players[leg.a], &players[leg.b]);
                PairAssignment {
                    player1: p1.to_string(),
                    player2: p2.to_string(),
                    machine: machines[leg.machine].name.clone(),
                    expected_score: leg.value,
                    synergy_bonus: leg.synergy_bonus,
                }
            })
            .collect()
    }

    /// Higher value first, then higher confidence, then lexicographically smaller names.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .value_units
            .cmp(&self.value_units)
            .then_with(|| other.confidence_units.cmp(&self.confidence_units))
            .then_with(|| self.lex.cmp(&other.lex))
    }
}

fn ordered_names<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Scores all 2,520 candidates and returns them best first.
pub fn ranked_candidates(table: &PairTable, matrix: &ScoringMatrix) -> Vec<Candidate> {
    let players = matrix.players();
    let machines = matrix.machines();

    let mut name_rank = vec![0usize; players.len()];
    let mut by_name: Vec<usize> = (0..players.len()).collect();
    by_name.sort_by(|&x, &y| players[x].cmp(&players[y]));
    for (rank, &idx) in by_name.iter().enumerate() {
        name_rank[idx] = rank;
    }
    let mut machines_by_name: Vec<usize> = (0..machines.len()).collect();
    machines_by_name.sort_by(|&x, &y| machines[x].name.cmp(&machines[y].name));

    let partitions = pair_partitions();
    let perms = permutations(MACHINES);

    let mut candidates: Vec<Candidate> = partitions
        .par_iter()
        .flat_map_iter(|pairs| {
            let name_rank = &name_rank;
            let machines_by_name = &machines_by_name;
            perms.iter().map(move |perm| {
                let machine_of = [perm[0], perm[1], perm[2], perm[3]];
                let mut value_units_sum = 0_i64;
                let mut confidence_sum = 0_i64;
                for (&(a, b), &m) in pairs.iter().zip(&machine_of) {
                    let leg = table.leg(a, b, m);
                    value_units_sum += value_units(leg.value);
                    confidence_sum += confidence_units(leg.confidence);
                }
                let mut lex = [0usize; PLAYERS];
                for (slot, &m) in machines_by_name.iter().enumerate() {
                    let k = machine_of
                        .iter()
                        .position(|&x| x == m)
                        .unwrap_or_default();
                    let (a, b) = pairs[k];
                    let (lo, hi) = if name_rank[a] < name_rank[b] {
                        (name_rank[a], name_rank[b])
                    } else {
                        (name_rank[b], name_rank[a])
                    };
                    lex[slot * 2] = lo;
                    lex[slot * 2 + 1] = hi;
                }
                Candidate {
                    pairs: *pairs,
                    machine_of,
                    value_units: value_units_sum,
                    confidence_units: confidence_sum,
                    lex,
                }
            })
        })
        .collect();

    candidates.par_sort_unstable_by(Candidate::rank_cmp);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn there_are_105_distinct_partitions() {
        let parts = pair_partitions();
        assert_eq!(parts.len(), PARTITIONS);
        let unique: HashSet<_> = parts.iter().collect();
        assert_eq!(unique.len(), PARTITIONS);
        for part in &parts {
            let mut seen = [false; PLAYERS];
            for &(a, b) in part {
                assert!(a < b);
                assert!(!seen[a] && !seen[b]);
                seen[a] = true;
                seen[b] = true;
            }
            assert!(seen.iter().all(|s| *s));
        }
    }

    #[test]
    fn permutations_of_four() {
        let perms = permutations(4);
        assert_eq!(perms.len(), 24);
        assert_eq!(perms[0], vec![0, 1, 2, 3]);
        assert_eq!(perms[23], vec![3, 2, 1, 0]);
    }

    #[test]
    fn pair_index_is_dense() {
        let mut seen = Vec::new();
        for a in 0..PLAYERS {
            for b in (a + 1)..PLAYERS {
                seen.push(pair_index(a, b));
            }
        }
        assert_eq!(seen, (0..pair_count(PLAYERS)).collect::<Vec<_>>());
    }
}
