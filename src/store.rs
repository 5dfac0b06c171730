//! SQLite-backed stats resolver.
//!
//! Stats are derived on demand from a `games` table holding one row per player
//! per game. A game counts as a win when the player took at least 1.5 points.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::model::{
    Machine, MachineBaseline, PairStat, PlayerMachineStat, SeasonRange, StreakType,
};
use crate::stats::StatsResolver;

const APP_DIR: &str = "pinball_lineup";
const DB_FILE: &str = "games.sqlite";

const WIN_POINTS: f64 = 1.5;
const RECENT_GAMES: usize = 5;
const FULL_CONFIDENCE_GAMES: f64 = 10.0;
const RECENCY_HALF_LIFE_DAYS: f64 = 365.0;
const MIN_RECENCY: f64 = 0.25;

#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub season: u32,
    pub match_key: String,
    pub round: u32,
    pub machine: String,
    pub player: String,
    pub team: String,
    pub score: f64,
    pub points: f64,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Outcome {
    score: f64,
    won: bool,
    played_at: Option<DateTime<Utc>>,
}

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_DATA_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR).join(DB_FILE));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR)
            .join(DB_FILE),
    )
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS games (
            game_id INTEGER PRIMARY KEY AUTOINCREMENT,
            season INTEGER NOT NULL,
            match_key TEXT NOT NULL,
            round INTEGER NOT NULL,
            machine TEXT NOT NULL,
            player_name TEXT NOT NULL,
            team TEXT NOT NULL,
            score REAL NOT NULL,
            points REAL NOT NULL,
            played_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_games_player_machine ON games(player_name, machine, season);
        CREATE INDEX IF NOT EXISTS idx_games_machine_season ON games(machine, season);
        CREATE INDEX IF NOT EXISTS idx_games_slot ON games(match_key, round, machine);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn record_game(conn: &Connection, game: &GameRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO games(season, match_key, round, machine, player_name, team, score, points, played_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            game.season,
            game.match_key,
            game.round,
            game.machine,
            game.player,
            game.team,
            game.score,
            game.points,
            game.played_at.to_rfc3339(),
        ],
    )
    .context("insert game")?;
    Ok(conn.last_insert_rowid())
}

pub struct SqliteStats {
    conn: Mutex<Connection>,
    as_of: Option<DateTime<Utc>>,
}

impl SqliteStats {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            as_of: None,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(open_db(path)?))
    }

    /// Pins the reference time for recency so results are reproducible.
    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("stats db lock poisoned"))?;
        f(&conn)
    }

    fn outcomes(
        conn: &Connection,
        player: &str,
        machine: Option<&str>,
        seasons: SeasonRange,
    ) -> Result<Vec<Outcome>> {
        let mut stmt = conn
            .prepare_cached(
                r#"
                SELECT score, points, played_at
                FROM games
                WHERE player_name = ?1
                  AND (?2 IS NULL OR machine = ?2)
                  AND season BETWEEN ?3 AND ?4
                  AND score > 0
                ORDER BY played_at DESC, game_id DESC
                "#,
            )
            .context("prepare outcomes query")?;
        let rows = stmt
            .query_map(params![player, machine, seasons.start, seasons.end], |row| {
                let played_at: String = row.get(2)?;
                Ok(Outcome {
                    score: row.get(0)?,
                    won: row.get::<_, f64>(1)? >= WIN_POINTS,
                    played_at: DateTime::parse_from_rfc3339(&played_at)
                        .ok()
                        .map(|t| t.with_timezone(&Utc)),
                })
            })
            .context("query outcomes")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode outcome row")?);
        }
        Ok(out)
    }

    fn confidence(&self, games: usize, last_played: Option<DateTime<Utc>>) -> f64 {
        let sample = (games as f64 / FULL_CONFIDENCE_GAMES).min(1.0);
        let now = self.as_of.unwrap_or_else(Utc::now);
        let recency = match last_played {
            Some(t) => {
                let days = (now - t).num_seconds().max(0) as f64 / 86_400.0;
                0.5_f64.powf(days / RECENCY_HALF_LIFE_DAYS).max(MIN_RECENCY)
            }
            None => 0.5,
        };
        sample * recency
    }
}

fn win_rate(outcomes: &[Outcome]) -> Option<f64> {
    if outcomes.is_empty() {
        return None;
    }
    let wins = outcomes.iter().filter(|o| o.won).count();
    Some(wins as f64 / outcomes.len() as f64)
}

/// Outcomes must be newest first.
fn summarize(player: &str, machine: &str, outcomes: &[Outcome], confidence: f64) -> PlayerMachineStat {
    let games = outcomes.len();
    let wins = outcomes.iter().filter(|o| o.won).count();
    let win_rate = wins as f64 / games as f64;
    let avg_score = outcomes.iter().map(|o| o.score).sum::<f64>() / games as f64;
    let high_score = outcomes.iter().map(|o| o.score).fold(0.0, f64::max);

    let recent = &outcomes[..games.min(RECENT_GAMES)];
    let recent_form = recent.iter().filter(|o| o.won).count() as f64 / recent.len() as f64;

    let first = outcomes[0].won;
    let streak_count = outcomes.iter().take_while(|o| o.won == first).count();
    let streak_type = if first { StreakType::Win } else { StreakType::Loss };

    PlayerMachineStat {
        player: player.to_string(),
        machine: machine.to_string(),
        games_played: games as u32,
        wins: wins as u32,
        losses: (games - wins) as u32,
        win_rate,
        avg_score,
        high_score,
        recent_form,
        confidence,
        streak_type: Some(streak_type),
        streak_count: streak_count as u32,
        last_played: outcomes[0].played_at,
    }
}

impl StatsResolver for SqliteStats {
    fn stat_for(
        &self,
        player: &str,
        machine: &str,
        seasons: SeasonRange,
    ) -> Result<Option<PlayerMachineStat>> {
        let outcomes = self.with_conn(|conn| Self::outcomes(conn, player, Some(machine), seasons))?;
        if outcomes.is_empty() {
            return Ok(None);
        }
        let confidence = self.confidence(outcomes.len(), outcomes[0].played_at);
        Ok(Some(summarize(player, machine, &outcomes, confidence)))
    }

    fn pair_stat_for(
        &self,
        player_a: &str,
        player_b: &str,
        machine: Option<&str>,
        seasons: SeasonRange,
    ) -> Result<Option<PairStat>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(
                    r#"
                    SELECT
                        g1.points + g2.points,
                        (SELECT SUM(g3.points) FROM games g3
                          WHERE g3.season = g1.season
                            AND g3.match_key = g1.match_key
                            AND g3.round = g1.round
                            AND g3.machine = g1.machine)
                    FROM games g1
                    JOIN games g2
                      ON g2.season = g1.season
                     AND g2.match_key = g1.match_key
                     AND g2.round = g1.round
                     AND g2.machine = g1.machine
                     AND g2.team = g1.team
                    WHERE g1.player_name = ?1
                      AND g2.player_name = ?2
                      AND (?3 IS NULL OR g1.machine = ?3)
                      AND g1.season BETWEEN ?4 AND ?5
                    "#,
                )
                .context("prepare pair query")?;
            let rows = stmt
                .query_map(
                    params![player_a, player_b, machine, seasons.start, seasons.end],
                    |row| Ok((row.get::<_, f64>(0)?, row.get::<_, Option<f64>>(1)?)),
                )
                .context("query pair games")?;

            let mut games = 0u32;
            let mut wins = 0u32;
            for row in rows {
                let (pair_points, total_points) = row.context("decode pair row")?;
                games += 1;
                if pair_points > total_points.unwrap_or(0.0) / 2.0 {
                    wins += 1;
                }
            }
            if games == 0 {
                return Ok(None);
            }

            let pair_win_rate = f64::from(wins) / f64::from(games);
            let rate_a = win_rate(&Self::outcomes(conn, player_a, machine, seasons)?);
            let rate_b = win_rate(&Self::outcomes(conn, player_b, machine, seasons)?);
            let independent = match (rate_a, rate_b) {
                (Some(a), Some(b)) => (a + b) / 2.0,
                (Some(x), None) | (None, Some(x)) => x,
                (None, None) => 0.5,
            };

            Ok(Some(PairStat {
                player_a: player_a.to_string(),
                player_b: player_b.to_string(),
                machine: machine.map(str::to_string),
                games_together: games,
                wins,
                win_rate: pair_win_rate,
                synergy_score: pair_win_rate - independent,
            }))
        })
    }

    fn machine_baseline(
        &self,
        machine: &Machine,
        seasons: SeasonRange,
    ) -> Result<Option<MachineBaseline>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    r#"
                    SELECT
                        COUNT(*),
                        AVG(CASE WHEN points >= ?4 THEN 1.0 ELSE 0.0 END),
                        AVG(score)
                    FROM games
                    WHERE machine = ?1 AND season BETWEEN ?2 AND ?3 AND score > 0
                    "#,
                    params![machine.name, seasons.start, seasons.end, WIN_POINTS],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Option<f64>>(1)?,
                            row.get::<_, Option<f64>>(2)?,
                        ))
                    },
                )
                .optional()
                .context("query machine baseline")?;
            let Some((count, Some(win_rate), Some(avg_score))) = row else {
                return Ok(None);
            };
            if count == 0 {
                return Ok(None);
            }
            Ok(Some(MachineBaseline {
                win_rate,
                avg_score,
                recent_form: win_rate,
            }))
        })
    }
}
