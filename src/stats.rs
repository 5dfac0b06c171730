use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Machine, MachineBaseline, PairStat, PlayerMachineStat, SeasonRange};

/// Source of precomputed per-player and per-pair history.
///
/// `Ok(None)` means "no data" and is an ordinary outcome. `Err` means the
/// backing store failed and must not be read as absence.
pub trait StatsResolver: Send + Sync {
    fn stat_for(
        &self,
        player: &str,
        machine: &str,
        seasons: SeasonRange,
    ) -> Result<Option<PlayerMachineStat>>;

    fn pair_stat_for(
        &self,
        player_a: &str,
        player_b: &str,
        machine: Option<&str>,
        seasons: SeasonRange,
    ) -> Result<Option<PairStat>>;

    /// League-wide expectation on a machine. `None` falls back to a neutral
    /// baseline derived from the machine's skill level.
    fn machine_baseline(
        &self,
        _machine: &Machine,
        _seasons: SeasonRange,
    ) -> Result<Option<MachineBaseline>> {
        Ok(None)
    }
}

impl<R: StatsResolver + ?Sized> StatsResolver for std::sync::Arc<R> {
    fn stat_for(
        &self,
        player: &str,
        machine: &str,
        seasons: SeasonRange,
    ) -> Result<Option<PlayerMachineStat>> {
        (**self).stat_for(player, machine, seasons)
    }

    fn pair_stat_for(
        &self,
        player_a: &str,
        player_b: &str,
        machine: Option<&str>,
        seasons: SeasonRange,
    ) -> Result<Option<PairStat>> {
        (**self).pair_stat_for(player_a, player_b, machine, seasons)
    }

    fn machine_baseline(
        &self,
        machine: &Machine,
        seasons: SeasonRange,
    ) -> Result<Option<MachineBaseline>> {
        (**self).machine_baseline(machine, seasons)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatsSnapshot {
    /// When set, lookups for any other range report no data.
    #[serde(default)]
    pub seasons: Option<SeasonRange>,
    #[serde(default)]
    pub stats: Vec<PlayerMachineStat>,
    #[serde(default)]
    pub pairs: Vec<PairStat>,
    #[serde(default)]
    pub baselines: HashMap<String, MachineBaseline>,
}

/// Read-only stats snapshot held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStats {
    seasons: Option<SeasonRange>,
    by_player_machine: HashMap<(String, String), PlayerMachineStat>,
    by_pair: HashMap<(String, String, Option<String>), PairStat>,
    baselines: HashMap<String, MachineBaseline>,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StatsSnapshot) -> Self {
        let mut out = Self {
            seasons: snapshot.seasons,
            baselines: snapshot.baselines,
            ..Self::default()
        };
        for stat in snapshot.stats {
            out.insert_stat(stat);
        }
        for pair in snapshot.pairs {
            out.insert_pair(pair);
        }
        out
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read stats snapshot {}", path.display()))?;
        let snapshot = serde_json::from_str::<StatsSnapshot>(&raw)
            .with_context(|| format!("parse stats snapshot {}", path.display()))?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn with_seasons(mut self, seasons: SeasonRange) -> Self {
        self.seasons = Some(seasons);
        self
    }

    pub fn insert_stat(&mut self, stat: PlayerMachineStat) {
        self.by_player_machine
            .insert((stat.player.clone(), stat.machine.clone()), stat);
    }

    pub fn insert_pair(&mut self, pair: PairStat) {
        let key = pair_key(&pair.player_a, &pair.player_b, pair.machine.as_deref());
        self.by_pair.insert(key, pair);
    }

    pub fn insert_baseline(&mut self, machine: impl Into<String>, baseline: MachineBaseline) {
        self.baselines.insert(machine.into(), baseline);
    }

    fn covers(&self, seasons: SeasonRange) -> bool {
        self.seasons.is_none_or(|s| s == seasons)
    }
}

impl StatsResolver for InMemoryStats {
    fn stat_for(
        &self,
        player: &str,
        machine: &str,
        seasons: SeasonRange,
    ) -> Result<Option<PlayerMachineStat>> {
        if !self.covers(seasons) {
            return Ok(None);
        }
        Ok(self
            .by_player_machine
            .get(&(player.to_string(), machine.to_string()))
            .cloned())
    }

    fn pair_stat_for(
        &self,
        player_a: &str,
        player_b: &str,
        machine: Option<&str>,
        seasons: SeasonRange,
    ) -> Result<Option<PairStat>> {
        if !self.covers(seasons) {
            return Ok(None);
        }
        Ok(self.by_pair.get(&pair_key(player_a, player_b, machine)).cloned())
    }

    fn machine_baseline(
        &self,
        machine: &Machine,
        seasons: SeasonRange,
    ) -> Result<Option<MachineBaseline>> {
        if !self.covers(seasons) {
            return Ok(None);
        }
        Ok(self.baselines.get(&machine.name).copied())
    }
}

fn pair_key(a: &str, b: &str, machine: Option<&str>) -> (String, String, Option<String>) {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    (lo.to_string(), hi.to_string(), machine.map(str::to_string))
}
