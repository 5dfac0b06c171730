use serde::{Deserialize, Serialize};

/// Upper bound on ranked alternatives, however the config was built.
pub const MAX_ALTERNATIVES: usize = 20;

/// Blend weights for a player's raw strength on a machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub win_rate: f64,
    pub avg_score: f64,
    pub recent_form: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            win_rate: 0.45,
            avg_score: 0.25,
            recent_form: 0.30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Number of ranked alternatives returned next to the primary lineup.
    pub alternatives: usize,
    pub cache_ttl_secs: u64,
    pub season_start: u32,
    pub season_end: u32,
    /// Confidence assigned to a leg with no history at all.
    pub floor_confidence: f64,
    pub weights: ScoreWeights,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            alternatives: 3,
            cache_ttl_secs: 300,
            season_start: 20,
            season_end: 22,
            floor_confidence: 0.1,
            weights: ScoreWeights::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let alternatives = env_parse::<usize>("LINEUP_ALTERNATIVES")
            .unwrap_or(d.alternatives)
            .min(MAX_ALTERNATIVES);
        let cache_ttl_secs = env_parse::<u64>("LINEUP_CACHE_TTL_SECS").unwrap_or(d.cache_ttl_secs);
        let season_start = env_parse::<u32>("LINEUP_SEASON_START").unwrap_or(d.season_start);
        let season_end = env_parse::<u32>("LINEUP_SEASON_END")
            .unwrap_or(d.season_end)
            .max(season_start);
        let floor_confidence = env_parse::<f64>("LINEUP_FLOOR_CONFIDENCE")
            .filter(|v| v.is_finite())
            .unwrap_or(d.floor_confidence)
            .clamp(0.0, 1.0);
        Self {
            alternatives,
            cache_ttl_secs,
            season_start,
            season_end,
            floor_confidence,
            weights: d.weights,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name)
        .ok()
        .and_then(|val| val.trim().parse::<T>().ok())
}
