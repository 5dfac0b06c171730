use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OptimizeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
}

impl SkillLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SkillLevel::Easy => "easy",
            SkillLevel::Medium => "medium",
            SkillLevel::Hard => "hard",
            SkillLevel::Expert => "expert",
        }
    }

    /// Typical average score on a machine of this class. Harder games score lower.
    pub fn default_score_scale(self) -> f64 {
        match self {
            SkillLevel::Easy => 50_000_000.0,
            SkillLevel::Medium => 20_000_000.0,
            SkillLevel::Hard => 8_000_000.0,
            SkillLevel::Expert => 2_000_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    #[serde(default)]
    pub skill_level: SkillLevel,
    #[serde(default)]
    pub typical_score: Option<f64>,
}

impl Machine {
    pub fn new(name: impl Into<String>, skill_level: SkillLevel) -> Self {
        Self {
            name: name.into(),
            skill_level,
            typical_score: None,
        }
    }

    /// Scale used to normalize raw scores; always finite and positive.
    pub fn score_scale(&self) -> f64 {
        match self.typical_score {
            Some(s) if s.is_finite() && s > 0.0 => s,
            _ => self.skill_level.default_score_scale(),
        }
    }
}

/// Inclusive range of league seasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonRange {
    pub start: u32,
    pub end: u32,
}

impl SeasonRange {
    pub fn new(start: u32, end: u32) -> Result<Self, OptimizeError> {
        if start > end {
            return Err(OptimizeError::ContractViolation(format!(
                "season range {start}-{end} is inverted"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, season: u32) -> bool {
        (self.start..=self.end).contains(&season)
    }
}

impl fmt::Display for SeasonRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakType {
    Win,
    Loss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMachineStat {
    pub player: String,
    pub machine: String,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub avg_score: f64,
    pub high_score: f64,
    pub recent_form: f64,
    /// 0..=1, grows with sample size and recency.
    pub confidence: f64,
    #[serde(default)]
    pub streak_type: Option<StreakType>,
    #[serde(default)]
    pub streak_count: u32,
    #[serde(default)]
    pub last_played: Option<DateTime<Utc>>,
}

impl PlayerMachineStat {
    pub fn is_hot(&self) -> bool {
        self.streak_type == Some(StreakType::Win) && self.streak_count >= 3
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairStat {
    pub player_a: String,
    pub player_b: String,
    #[serde(default)]
    pub machine: Option<String>,
    pub games_together: u32,
    pub wins: u32,
    pub win_rate: f64,
    /// Pair win rate minus the mean of the two players' own win rates.
    pub synergy_score: f64,
}

impl PairStat {
    pub fn involves(&self, a: &str, b: &str) -> bool {
        (self.player_a == a && self.player_b == b) || (self.player_a == b && self.player_b == a)
    }
}

/// League-wide expectation for an arbitrary player on a machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MachineBaseline {
    pub win_rate: f64,
    pub avg_score: f64,
    pub recent_form: f64,
}

impl MachineBaseline {
    pub fn neutral(machine: &Machine) -> Self {
        Self {
            win_rate: 0.5,
            avg_score: machine.score_scale(),
            recent_form: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchFormat {
    #[serde(rename = "7x7")]
    Singles,
    #[serde(rename = "4x2")]
    Pairs,
}

impl MatchFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchFormat::Singles => "7x7",
            MatchFormat::Pairs => "4x2",
        }
    }

    pub fn player_count(self) -> usize {
        match self {
            MatchFormat::Singles => 7,
            MatchFormat::Pairs => 8,
        }
    }

    pub fn machine_count(self) -> usize {
        match self {
            MatchFormat::Singles => 7,
            MatchFormat::Pairs => 4,
        }
    }
}

impl fmt::Display for MatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchFormat {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "7x7" => Ok(MatchFormat::Singles),
            "4x2" => Ok(MatchFormat::Pairs),
            other => Err(OptimizeError::ContractViolation(format!(
                "format must be either \"7x7\" or \"4x2\", got {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub player: String,
    pub machine: String,
    pub expected_score: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAssignment {
    pub player1: String,
    pub player2: String,
    pub machine: String,
    /// Includes `synergy_bonus`.
    pub expected_score: f64,
    pub synergy_bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Lineup {
    Singles(Vec<Assignment>),
    Pairs(Vec<PairAssignment>),
}

impl Lineup {
    pub fn total_score(&self) -> f64 {
        match self {
            Lineup::Singles(legs) => legs.iter().map(|l| l.expected_score).sum(),
            Lineup::Pairs(legs) => legs.iter().map(|l| l.expected_score).sum(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Lineup::Singles(legs) => legs.len(),
            Lineup::Pairs(legs) => legs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Leg identity only, independent of leg order and scores.
    pub fn leg_keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<(String, String)> = match self {
            Lineup::Singles(legs) => legs
                .iter()
                .map(|l| (l.player.clone(), l.machine.clone()))
                .collect(),
            Lineup::Pairs(legs) => legs
                .iter()
                .map(|l| (format!("{}+{}", l.player1, l.player2), l.machine.clone()))
                .collect(),
        };
        keys.sort();
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub format: MatchFormat,
    pub assignments: Lineup,
    pub total_score: f64,
    pub win_probability: f64,
    pub alternative_assignments: Vec<Lineup>,
    pub suggestions: Vec<String>,
}

fn default_true() -> bool {
    true
}
