use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::ResultCache;
use crate::error::{OptimizeError, Result};
use crate::model::{Machine, MatchFormat, OptimizationResult, Player, SeasonRange};
use crate::optimizer::{LineupOptimizer, validate_roster};
use crate::stats::StatsResolver;

pub const OPTIMIZATION_CACHE_TYPE: &str = "optimization";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeRequest {
    pub format: MatchFormat,
    pub players: Vec<Player>,
    pub machines: Vec<Machine>,
    pub seasons: SeasonRange,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

fn default_use_cache() -> bool {
    true
}

/// Cache key for an optimization request. Input order does not matter.
///
/// Every name is length-prefixed so distinct rosters never share a key. The
/// key also carries each machine's skill level and typical score and each
/// player's active flag, since those change the computed lineup.
pub fn cache_key(
    format: MatchFormat,
    players: &[Player],
    machines: &[Machine],
    seasons: SeasonRange,
) -> String {
    let mut players: Vec<&Player> = players.iter().collect();
    players.sort_by(|a, b| a.name.cmp(&b.name));
    let player_tokens: Vec<String> = players
        .iter()
        .map(|p| {
            let flag = if p.active { "" } else { "~" };
            format!("{}:{}{flag}", p.name.len(), p.name)
        })
        .collect();
    let mut machines: Vec<&Machine> = machines.iter().collect();
    machines.sort_by(|a, b| a.name.cmp(&b.name));
    let machine_tokens: Vec<String> = machines
        .iter()
        .map(|m| {
            let mut token = format!("{}:{}@{}", m.name.len(), m.name, m.skill_level.as_str());
            if let Some(typical) = m.typical_score {
                token.push_str(&format!("#{typical:?}"));
            }
            token
        })
        .collect();
    format!(
        "optimize_{format}_s{}-{}_p[{}]_m[{}]",
        seasons.start,
        seasons.end,
        player_tokens.join(","),
        machine_tokens.join(",")
    )
}

/// Request-level entry point: validation, key derivation and caching around
/// the optimizer.
pub struct LineupService<R> {
    optimizer: LineupOptimizer<R>,
    cache: ResultCache<OptimizationResult, OptimizeError>,
}

impl<R: StatsResolver> LineupService<R> {
    pub fn new(optimizer: LineupOptimizer<R>) -> Self {
        Self::with_cache(optimizer, ResultCache::new())
    }

    pub fn with_cache(
        optimizer: LineupOptimizer<R>,
        cache: ResultCache<OptimizationResult, OptimizeError>,
    ) -> Self {
        Self { optimizer, cache }
    }

    pub fn optimizer(&self) -> &LineupOptimizer<R> {
        &self.optimizer
    }

    pub fn cache(&self) -> &ResultCache<OptimizationResult, OptimizeError> {
        &self.cache
    }

    pub fn optimize(&self, request: &OptimizeRequest) -> Result<OptimizationResult> {
        let seasons = SeasonRange::new(request.seasons.start, request.seasons.end)?;
        validate_roster(request.format, &request.players, &request.machines)?;
        let run = || match request.format {
            MatchFormat::Singles => {
                self.optimizer
                    .optimize_singles(&request.players, &request.machines, seasons)
            }
            MatchFormat::Pairs => {
                self.optimizer
                    .optimize_pairs(&request.players, &request.machines, seasons)
            }
        };

        if !request.use_cache {
            debug!(format = %request.format, "cache bypassed");
            return run();
        }

        let key = cache_key(request.format, &request.players, &request.machines, seasons);
        let ttl = request
            .ttl_secs
            .unwrap_or(self.optimizer.config().cache_ttl_secs);
        self.cache
            .get_or_compute(&key, ttl, OPTIMIZATION_CACHE_TYPE, run)
    }

    /// Drops every cached optimization, e.g. after new game data lands.
    pub fn invalidate_all(&self) -> usize {
        self.cache.invalidate_type(OPTIMIZATION_CACHE_TYPE)
    }
}
