use crate::pairs::PairLeg;
use crate::scoring::{LegSource, ScoringMatrix};

const LOW_CONFIDENCE: f64 = 0.3;
const FORM_SURGE: f64 = 0.15;
const STRONG_SYNERGY: f64 = 0.1;
/// A player's best machine must beat the assigned one by this factor to be called out.
const SACRIFICE_RATIO: f64 = 1.1;

/// Rationale for a singles lineup; `cols[player]` is the assigned machine.
pub fn singles(matrix: &ScoringMatrix, cols: &[usize]) -> Vec<String> {
    let players = matrix.players();
    let machines = matrix.machines();
    let mut out = Vec::new();

    let mut low_confidence = 0usize;
    for (p, &m) in cols.iter().enumerate() {
        let leg = matrix.cell(p, m);
        let (player, machine) = (&players[p], &machines[m].name);
        match leg.source {
            LegSource::Baseline => out.push(format!(
                "{player} has no recorded games on {machine}; using the league baseline"
            )),
            LegSource::History => {
                if leg.confidence < LOW_CONFIDENCE {
                    low_confidence += 1;
                }
                if leg.is_hot() {
                    let n = leg.streak.map(|(_, n)| n).unwrap_or_default();
                    out.push(format!("{player} is on a {n}-game win streak on {machine}"));
                } else if leg.form_delta() >= FORM_SURGE {
                    out.push(format!(
                        "{player}'s recent form on {machine} is well above their average"
                    ));
                }
            }
        }
    }
    if low_confidence > 0 {
        out.push(format!(
            "{low_confidence} assignment(s) have low confidence due to limited game history"
        ));
    }

    for (p, &m) in cols.iter().enumerate() {
        let assigned = matrix.cell(p, m).value;
        let best = (0..machines.len())
            .filter(|&other| matrix.cell(p, other).source == LegSource::History)
            .max_by(|&x, &y| {
                matrix
                    .cell(p, x)
                    .value
                    .total_cmp(&matrix.cell(p, y).value)
                    .then_with(|| y.cmp(&x))
            });
        if let Some(best) = best {
            if best != m && matrix.cell(p, best).value > assigned * SACRIFICE_RATIO {
                out.push(format!(
                    "{} gives up their strongest machine ({}) to balance the lineup",
                    players[p], machines[best].name
                ));
            }
        }
    }

    if out.is_empty() {
        out.push("Lineup looks solid! Focus on execution and machine-specific strategies.".to_string());
    }
    out
}

pub fn pairs(matrix: &ScoringMatrix, legs: &[&PairLeg]) -> Vec<String> {
    let players = matrix.players();
    let machines = matrix.machines();
    let mut out = Vec::new();

    for leg in legs {
        let (a, b, machine) = (&players[leg.a], &players[leg.b], &machines[leg.machine].name);
        if leg.synergy_bonus > STRONG_SYNERGY {
            out.push(format!(
                "{a} and {b} show strong synergy on {machine} (+{:.2} over {} games together)",
                leg.synergy_bonus, leg.synergy_games
            ));
        } else if leg.synergy_bonus < -STRONG_SYNERGY {
            out.push(format!(
                "{a} and {b} have underperformed together on {machine} ({:.2}); consider a different pairing",
                leg.synergy_bonus
            ));
        }
    }

    let no_history: Vec<&str> = legs
        .iter()
        .flat_map(|leg| [(leg.a, leg.machine), (leg.b, leg.machine)])
        .filter(|&(p, m)| matrix.cell(p, m).source == LegSource::Baseline)
        .map(|(p, _)| players[p].as_str())
        .collect();
    if !no_history.is_empty() {
        out.push(format!(
            "No history on the assigned machine for {}; league baseline used",
            no_history.join(", ")
        ));
    }

    let hot: Vec<&str> = legs
        .iter()
        .flat_map(|leg| [(leg.a, leg.machine), (leg.b, leg.machine)])
        .filter(|&(p, m)| matrix.cell(p, m).is_hot())
        .map(|(p, _)| players[p].as_str())
        .collect();
    if !hot.is_empty() {
        out.push(format!("On a hot streak: {}", hot.join(", ")));
    }

    if out.is_empty() {
        out.push("Pairs look well balanced for the selected machines".to_string());
    }
    out
}
