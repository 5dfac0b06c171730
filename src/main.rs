use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pinball_lineup::config::OptimizerConfig;
use pinball_lineup::model::{Machine, MatchFormat, Player, SeasonRange, SkillLevel};
use pinball_lineup::stats::{InMemoryStats, StatsResolver};
use pinball_lineup::store::{self, SqliteStats};
use pinball_lineup::{LineupOptimizer, LineupService, OptimizeRequest};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pinball_lineup=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config = OptimizerConfig::from_env();

    let format = arg_value(&args, "--format")
        .unwrap_or_else(|| "7x7".to_string())
        .parse::<MatchFormat>()?;
    let players = arg_value(&args, "--players")
        .map(|raw| split_list(&raw).map(Player::new).collect::<Vec<_>>())
        .context("missing --players A,B,C,...")?;
    let machines = arg_value(&args, "--machines")
        .map(|raw| {
            split_list(&raw)
                .map(parse_machine)
                .collect::<Result<Vec<_>>>()
        })
        .context("missing --machines M1,M2:hard,...")??;
    let seasons = match arg_value(&args, "--seasons") {
        Some(raw) => parse_seasons(&raw)?,
        None => SeasonRange::new(config.season_start, config.season_end)?,
    };

    let resolver: Arc<dyn StatsResolver> = if let Some(path) = arg_value(&args, "--snapshot") {
        Arc::new(InMemoryStats::load_json(&PathBuf::from(path))?)
    } else {
        let db_path = arg_value(&args, "--db")
            .map(PathBuf::from)
            .or_else(store::default_db_path)
            .context("unable to resolve sqlite path")?;
        info!(db = %db_path.display(), "using game history database");
        Arc::new(SqliteStats::open(&db_path)?)
    };

    let service = LineupService::new(LineupOptimizer::with_config(resolver, config));
    let request = OptimizeRequest {
        format,
        players,
        machines,
        seasons,
        use_cache: !args.iter().any(|a| a == "--no-cache"),
        ttl_secs: None,
    };
    let result = service.optimize(&request)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("serialize optimization result")?
    );
    Ok(())
}

fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_machine(raw: &str) -> Result<Machine> {
    let Some((name, level)) = raw.rsplit_once(':') else {
        return Ok(Machine::new(raw, SkillLevel::default()));
    };
    let level = match level.trim().to_ascii_lowercase().as_str() {
        "easy" => SkillLevel::Easy,
        "medium" => SkillLevel::Medium,
        "hard" => SkillLevel::Hard,
        "expert" => SkillLevel::Expert,
        other => return Err(anyhow!("unknown skill level {other:?} for {name}")),
    };
    Ok(Machine::new(name.trim(), level))
}

fn parse_seasons(raw: &str) -> Result<SeasonRange> {
    let (start, end) = raw
        .split_once('-')
        .map(|(a, b)| (a.trim(), b.trim()))
        .unwrap_or((raw.trim(), raw.trim()));
    let start = start.parse::<u32>().context("invalid season start")?;
    let end = end.parse::<u32>().context("invalid season end")?;
    Ok(SeasonRange::new(start, end)?)
}
