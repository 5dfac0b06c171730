#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use rand::Rng;
use rand::rngs::StdRng;

use pinball_lineup::model::{
    Machine, PairStat, Player, PlayerMachineStat, SeasonRange, SkillLevel, StreakType,
};
use pinball_lineup::stats::{InMemoryStats, StatsResolver};

pub fn seasons() -> SeasonRange {
    SeasonRange::new(20, 22).expect("valid range")
}

pub fn players(names: &[&str]) -> Vec<Player> {
    names.iter().map(|n| Player::new(*n)).collect()
}

pub fn machines(names: &[&str]) -> Vec<Machine> {
    let levels = [
        SkillLevel::Easy,
        SkillLevel::Medium,
        SkillLevel::Hard,
        SkillLevel::Expert,
    ];
    names
        .iter()
        .enumerate()
        .map(|(i, n)| Machine::new(*n, levels[i % levels.len()]))
        .collect()
}

pub fn stat(player: &str, machine: &str, win_rate: f64, confidence: f64) -> PlayerMachineStat {
    PlayerMachineStat {
        player: player.to_string(),
        machine: machine.to_string(),
        games_played: 10,
        wins: (win_rate * 10.0).round() as u32,
        losses: 10 - (win_rate * 10.0).round() as u32,
        win_rate,
        avg_score: 20_000_000.0,
        high_score: 60_000_000.0,
        recent_form: win_rate,
        confidence,
        streak_type: None,
        streak_count: 0,
        last_played: None,
    }
}

pub fn pair(a: &str, b: &str, machine: Option<&str>, synergy: f64) -> PairStat {
    PairStat {
        player_a: a.to_string(),
        player_b: b.to_string(),
        machine: machine.map(str::to_string),
        games_together: 6,
        wins: 4,
        win_rate: 0.66,
        synergy_score: synergy,
    }
}

/// Random history for every (player, machine); roughly one cell in six is left empty.
pub fn random_stats(rng: &mut StdRng, players: &[Player], machines: &[Machine]) -> InMemoryStats {
    let mut stats = InMemoryStats::new();
    for p in players {
        for m in machines {
            if rng.gen_bool(1.0 / 6.0) {
                continue;
            }
            let games = rng.gen_range(1..30u32);
            let wins = rng.gen_range(0..=games);
            let streak_count = rng.gen_range(0..6u32);
            stats.insert_stat(PlayerMachineStat {
                player: p.name.clone(),
                machine: m.name.clone(),
                games_played: games,
                wins,
                losses: games - wins,
                win_rate: f64::from(wins) / f64::from(games),
                avg_score: rng.gen_range(100_000.0..120_000_000.0),
                high_score: 150_000_000.0,
                recent_form: rng.gen_range(0.0..=1.0),
                confidence: rng.gen_range(0.05..=1.0),
                streak_type: if rng.gen_bool(0.5) {
                    Some(StreakType::Win)
                } else {
                    Some(StreakType::Loss)
                },
                streak_count,
                last_played: None,
            });
        }
    }
    for (i, a) in players.iter().enumerate() {
        for b in &players[i + 1..] {
            if rng.gen_bool(0.3) {
                stats.insert_pair(pair(&a.name, &b.name, None, rng.gen_range(-0.3..0.3)));
            }
            for m in machines {
                if rng.gen_bool(0.2) {
                    stats.insert_pair(pair(
                        &a.name,
                        &b.name,
                        Some(&m.name),
                        rng.gen_range(-0.3..0.3),
                    ));
                }
            }
        }
    }
    stats
}

/// Counts every resolver call made through it.
pub struct CountingStats {
    pub inner: InMemoryStats,
    pub calls: AtomicUsize,
}

impl CountingStats {
    pub fn new(inner: InMemoryStats) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StatsResolver for CountingStats {
    fn stat_for(
        &self,
        player: &str,
        machine: &str,
        seasons: SeasonRange,
    ) -> Result<Option<PlayerMachineStat>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.stat_for(player, machine, seasons)
    }

    fn pair_stat_for(
        &self,
        player_a: &str,
        player_b: &str,
        machine: Option<&str>,
        seasons: SeasonRange,
    ) -> Result<Option<PairStat>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.pair_stat_for(player_a, player_b, machine, seasons)
    }
}

/// Fails on every lookup for one player.
pub struct FailingStats {
    pub broken_player: String,
}

impl StatsResolver for FailingStats {
    fn stat_for(
        &self,
        player: &str,
        _machine: &str,
        _seasons: SeasonRange,
    ) -> Result<Option<PlayerMachineStat>> {
        if player == self.broken_player {
            return Err(anyhow!("connection reset"));
        }
        Ok(None)
    }

    fn pair_stat_for(
        &self,
        _player_a: &str,
        _player_b: &str,
        _machine: Option<&str>,
        _seasons: SeasonRange,
    ) -> Result<Option<PairStat>> {
        Ok(None)
    }
}
