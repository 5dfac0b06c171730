use std::collections::HashSet;

use tracing::{debug, info};

use crate::assignment::{self, Matching};
use crate::config::{MAX_ALTERNATIVES, OptimizerConfig};
use crate::error::{OptimizeError, Result};
use crate::model::{
    Assignment, Lineup, Machine, MatchFormat, OptimizationResult, Player, SeasonRange,
};
use crate::pairs::{self, PairTable};
use crate::scoring::{self, ScoringMatrix, confidence_units, value_units};
use crate::stats::StatsResolver;
use crate::suggestions;

/// Confidence sums of up to 16 legs stay below this.
const CONFIDENCE_SPAN: i128 = 1 << 24;

pub struct LineupOptimizer<R> {
    resolver: R,
    config: OptimizerConfig,
}

impl<R: StatsResolver> LineupOptimizer<R> {
    pub fn new(resolver: R) -> Self {
        Self::with_config(resolver, OptimizerConfig::default())
    }

    pub fn with_config(resolver: R, mut config: OptimizerConfig) -> Self {
        config.alternatives = config.alternatives.min(MAX_ALTERNATIVES);
        Self { resolver, config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Seven players onto seven machines, one each.
    pub fn optimize_singles(
        &self,
        players: &[Player],
        machines: &[Machine],
        seasons: SeasonRange,
    ) -> Result<OptimizationResult> {
        validate_roster(MatchFormat::Singles, players, machines)?;
        let names = player_names(players);
        let matrix = ScoringMatrix::build(&self.resolver, &names, machines, seasons, &self.config)?;

        let weights = composite_weights(&matrix);
        let ranked = assignment::k_best(&weights, self.config.alternatives.saturating_add(1));
        let Some((best, rest)) = ranked.split_first() else {
            return Err(OptimizeError::ContractViolation(
                "no complete assignment exists".to_string(),
            ));
        };

        let primary = singles_lineup(&matrix, best);
        let mut seen = HashSet::from([primary.leg_keys()]);
        let alternatives: Vec<Lineup> = rest
            .iter()
            .map(|m| singles_lineup(&matrix, m))
            .filter(|lineup| seen.insert(lineup.leg_keys()))
            .collect();

        let total_score = primary.total_score();
        let win_probability = scoring::win_probability(
            best.cols
                .iter()
                .enumerate()
                .map(|(p, &m)| matrix.cell(p, m).strength()),
        );
        let mut notes = suggestions::singles(&matrix, &best.cols);
        notes.extend(inactive_notes(players));

        info!(
            format = "7x7",
            %seasons,
            total_score,
            win_probability,
            alternatives = alternatives.len(),
            "singles lineup optimized"
        );

        Ok(OptimizationResult {
            format: MatchFormat::Singles,
            assignments: primary,
            total_score,
            win_probability,
            alternative_assignments: alternatives,
            suggestions: notes,
        })
    }

    /// Eight players in four pairs onto four machines, one pair each.
    pub fn optimize_pairs(
        &self,
        players: &[Player],
        machines: &[Machine],
        seasons: SeasonRange,
    ) -> Result<OptimizationResult> {
        validate_roster(MatchFormat::Pairs, players, machines)?;
        let names = player_names(players);
        let matrix = ScoringMatrix::build(&self.resolver, &names, machines, seasons, &self.config)?;
        let table = PairTable::build(&self.resolver, &matrix, seasons)?;

        let ranked = pairs::ranked_candidates(&table, &matrix);
        debug!(candidates = ranked.len(), "doubles candidates ranked");
        let Some((best, rest)) = ranked.split_first() else {
            return Err(OptimizeError::ContractViolation(
                "no complete pairing exists".to_string(),
            ));
        };

        let primary = Lineup::Pairs(best.to_assignments(&table, &matrix));
        let mut seen = HashSet::from([primary.leg_keys()]);
        let mut alternatives = Vec::with_capacity(self.config.alternatives);
        for candidate in rest {
            if alternatives.len() == self.config.alternatives {
                break;
            }
            let lineup = Lineup::Pairs(candidate.to_assignments(&table, &matrix));
            if seen.insert(lineup.leg_keys()) {
                alternatives.push(lineup);
            }
        }

        let legs = best.legs(&table);
        let total_score = primary.total_score();
        let win_probability = scoring::win_probability(legs.iter().map(|leg| {
            let win_rate = (matrix.cell(leg.a, leg.machine).win_rate
                + matrix.cell(leg.b, leg.machine).win_rate)
                / 2.0;
            0.5 * win_rate + 0.5 * leg.value
        }));
        let mut notes = suggestions::pairs(&matrix, &legs);
        notes.extend(inactive_notes(players));

        info!(
            format = "4x2",
            %seasons,
            total_score,
            win_probability,
            alternatives = alternatives.len(),
            "doubles lineup optimized"
        );

        Ok(OptimizationResult {
            format: MatchFormat::Pairs,
            assignments: primary,
            total_score,
            win_probability,
            alternative_assignments: alternatives,
            suggestions: notes,
        })
    }
}

/// Rejects wrong cardinality, blank names and duplicates.
pub fn validate_roster(format: MatchFormat, players: &[Player], machines: &[Machine]) -> Result<()> {
    if players.len() != format.player_count() || machines.len() != format.machine_count() {
        return Err(OptimizeError::ContractViolation(format!(
            "{format} format requires exactly {} players and {} machines (got {} and {})",
            format.player_count(),
            format.machine_count(),
            players.len(),
            machines.len()
        )));
    }
    check_unique("player", players.iter().map(|p| p.name.as_str()))?;
    check_unique("machine", machines.iter().map(|m| m.name.as_str()))?;
    Ok(())
}

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(OptimizeError::ContractViolation(format!("blank {kind} name")));
        }
        if !seen.insert(name) {
            return Err(OptimizeError::ContractViolation(format!(
                "duplicate {kind}: {name}"
            )));
        }
    }
    Ok(())
}

fn player_names(players: &[Player]) -> Vec<String> {
    players.iter().map(|p| p.name.clone()).collect()
}

fn inactive_notes(players: &[Player]) -> Option<String> {
    let inactive: Vec<&str> = players
        .iter()
        .filter(|p| !p.active)
        .map(|p| p.name.as_str())
        .collect();
    if inactive.is_empty() {
        return None;
    }
    Some(format!(
        "Roster includes inactive player(s): {}",
        inactive.join(", ")
    ))
}

/// Exact weights whose maximum is the best lineup under the full tie-break order:
/// total value, then confidence sum, then the lexicographically smallest
/// machine sequence when legs are listed by player name.
fn composite_weights(matrix: &ScoringMatrix) -> Vec<Vec<i128>> {
    let players = matrix.players();
    let machines = matrix.machines();
    let n = players.len();

    let player_rank = name_ranks(players.iter().map(String::as_str));
    let machine_rank = name_ranks(machines.iter().map(|m| m.name.as_str()));
    let lex_span = (n as i128).pow(n as u32).max(1);

    (0..n)
        .map(|p| {
            let place = (n as i128).pow((n - 1 - player_rank[p]) as u32);
            (0..n)
                .map(|m| {
                    let cell = matrix.cell(p, m);
                    let lex = (n - 1 - machine_rank[m]) as i128 * place;
                    i128::from(value_units(cell.value)) * CONFIDENCE_SPAN * lex_span
                        + i128::from(confidence_units(cell.confidence)) * lex_span
                        + lex
                })
                .collect()
        })
        .collect()
}

fn name_ranks<'a>(names: impl Iterator<Item = &'a str>) -> Vec<usize> {
    let names: Vec<&str> = names.collect();
    let mut order: Vec<usize> = (0..names.len()).collect();
    order.sort_by(|&a, &b| names[a].cmp(names[b]));
    let mut rank = vec![0; names.len()];
    for (r, &idx) in order.iter().enumerate() {
        rank[idx] = r;
    }
    rank
}

fn singles_lineup(matrix: &ScoringMatrix, matching: &Matching) -> Lineup {
    let players = matrix.players();
    let machines = matrix.machines();
    Lineup::Singles(
        matching
            .cols
            .iter()
            .enumerate()
            .map(|(p, &m)| {
                let cell = matrix.cell(p, m);
                Assignment {
                    player: players[p].clone(),
                    machine: machines[m].name.clone(),
                    expected_score: cell.value,
                    confidence: cell.confidence,
                }
            })
            .collect(),
    )
}
