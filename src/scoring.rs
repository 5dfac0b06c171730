use anyhow::Context;
use tracing::debug;

use crate::config::{OptimizerConfig, ScoreWeights};
use crate::error::OptimizeError;
use crate::model::{Machine, MachineBaseline, PlayerMachineStat, SeasonRange, StreakType};
use crate::stats::StatsResolver;

/// Leg values live on a 2^-32 grid so sums of them are exact in `f64`.
const VALUE_GRID: f64 = 4_294_967_296.0;
const CONFIDENCE_GRID: f64 = 1_000_000.0;

const WIN_PROB_SLOPE: f64 = 8.0;
const WIN_PROB_CENTER: f64 = 0.5;

pub fn snap(value: f64) -> f64 {
    (value * VALUE_GRID).round() / VALUE_GRID
}

/// Integer units of a snapped value.
pub fn value_units(value: f64) -> i64 {
    (value * VALUE_GRID).round() as i64
}

pub fn confidence_units(confidence: f64) -> i64 {
    (confidence.clamp(0.0, 1.0) * CONFIDENCE_GRID).round() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSource {
    History,
    Baseline,
}

/// One cell of the scoring matrix: what a player is expected to bring to a machine.
#[derive(Debug, Clone, PartialEq)]
pub struct LegScore {
    pub value: f64,
    pub confidence: f64,
    /// Win rate blended toward the machine baseline by confidence.
    pub win_rate: f64,
    pub source: LegSource,
    pub games_played: u32,
    pub own_win_rate: Option<f64>,
    pub recent_form: Option<f64>,
    pub streak: Option<(StreakType, u32)>,
}

impl LegScore {
    /// Contribution of this leg to the win-probability estimate.
    pub fn strength(&self) -> f64 {
        0.5 * self.win_rate + 0.5 * self.value
    }

    pub fn is_hot(&self) -> bool {
        matches!(self.streak, Some((StreakType::Win, n)) if n >= 3)
    }

    pub fn form_delta(&self) -> f64 {
        match (self.recent_form, self.own_win_rate) {
            (Some(form), Some(rate)) => form - rate,
            _ => 0.0,
        }
    }
}

/// Per-player, per-machine expected values for one optimization run.
#[derive(Debug, Clone)]
pub struct ScoringMatrix {
    players: Vec<String>,
    machines: Vec<Machine>,
    cells: Vec<LegScore>,
}

impl ScoringMatrix {
    pub fn build<R: StatsResolver + ?Sized>(
        resolver: &R,
        players: &[String],
        machines: &[Machine],
        seasons: SeasonRange,
        cfg: &OptimizerConfig,
    ) -> Result<Self, OptimizeError> {
        let mut baselines = Vec::with_capacity(machines.len());
        for machine in machines {
            let baseline = resolver
                .machine_baseline(machine, seasons)
                .with_context(|| format!("baseline for {}", machine.name))
                .map_err(OptimizeError::upstream)?
                .unwrap_or_else(|| MachineBaseline::neutral(machine));
            baselines.push(baseline);
        }

        let mut cells = Vec::with_capacity(players.len() * machines.len());
        let mut fallbacks = 0usize;
        for player in players {
            for (machine, baseline) in machines.iter().zip(&baselines) {
                let stat = resolver
                    .stat_for(player, &machine.name, seasons)
                    .with_context(|| format!("stats for {player} on {}", machine.name))
                    .map_err(OptimizeError::upstream)?;
                let cell = score_leg(stat.as_ref(), baseline, machine, cfg);
                if cell.source == LegSource::Baseline {
                    fallbacks += 1;
                }
                cells.push(cell);
            }
        }

        debug!(
            players = players.len(),
            machines = machines.len(),
            baseline_cells = fallbacks,
            "scoring matrix built"
        );

        Ok(Self {
            players: players.to_vec(),
            machines: machines.to_vec(),
            cells,
        })
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    pub fn cell(&self, player: usize, machine: usize) -> &LegScore {
        &self.cells[player * self.machines.len() + machine]
    }
}

/// Expected value of a player on a machine.
///
/// Non-decreasing in win rate and average score, finite for any input, and
/// equal to the baseline strength when there is no history.
pub fn score_leg(
    stat: Option<&PlayerMachineStat>,
    baseline: &MachineBaseline,
    machine: &Machine,
    cfg: &OptimizerConfig,
) -> LegScore {
    let base_win = unit_or(baseline.win_rate, 0.5);
    let base_form = unit_or(baseline.recent_form, 0.5);
    let base_strength = strength(
        base_win,
        normalized_score(baseline.avg_score, machine.score_scale()),
        base_form,
        &cfg.weights,
    );

    let Some(stat) = stat.filter(|s| s.games_played > 0) else {
        return LegScore {
            value: snap(base_strength),
            confidence: cfg.floor_confidence,
            win_rate: base_win,
            source: LegSource::Baseline,
            games_played: 0,
            own_win_rate: None,
            recent_form: None,
            streak: None,
        };
    };

    let win_rate = unit_or(stat.win_rate, base_win);
    let recent_form = unit_or(stat.recent_form, win_rate);
    let confidence = unit_or(stat.confidence, 0.0);
    let raw = strength(
        win_rate,
        normalized_score(stat.avg_score, machine.score_scale()),
        recent_form,
        &cfg.weights,
    ) * streak_factor(stat);

    let value = confidence * raw + (1.0 - confidence) * base_strength;
    LegScore {
        value: snap(value),
        confidence: confidence.max(cfg.floor_confidence),
        win_rate: confidence * win_rate + (1.0 - confidence) * base_win,
        source: LegSource::History,
        games_played: stat.games_played,
        own_win_rate: Some(win_rate),
        recent_form: Some(recent_form),
        streak: stat.streak_type.map(|t| (t, stat.streak_count)),
    }
}

fn strength(win_rate: f64, norm_score: f64, recent_form: f64, w: &ScoreWeights) -> f64 {
    w.win_rate * win_rate + w.avg_score * norm_score + w.recent_form * recent_form
}

/// Maps a raw score into [0, 1); a score equal to the machine's typical score maps to 0.5.
pub fn normalized_score(avg_score: f64, scale: f64) -> f64 {
    if avg_score.is_nan() || avg_score <= 0.0 {
        return 0.0;
    }
    if avg_score.is_infinite() {
        return 1.0;
    }
    avg_score / (avg_score + scale)
}

fn streak_factor(stat: &PlayerMachineStat) -> f64 {
    let n = f64::from(stat.streak_count);
    match stat.streak_type {
        Some(StreakType::Win) if stat.streak_count >= 3 => 1.0 + (n * 0.05).min(0.2),
        Some(StreakType::Loss) if stat.streak_count >= 3 => 1.0 - (n * 0.03).min(0.15),
        _ => 1.0,
    }
}

fn unit_or(x: f64, fallback: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

/// Logistic over the mean leg strength. Strictly increasing in every leg.
pub fn win_probability<I>(leg_strengths: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut total = 0.0;
    let mut n = 0usize;
    for s in leg_strengths {
        total += s;
        n += 1;
    }
    if n == 0 {
        return 0.5;
    }
    let mean = total / n as f64;
    1.0 / (1.0 + (-WIN_PROB_SLOPE * (mean - WIN_PROB_CENTER)).exp())
}
