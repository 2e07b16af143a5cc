use clap::Parser;
use coop_core::{AgentSpec, Cell, Mode, PriorityRule, TieBreak};
use std::path::PathBuf;

/// `coop_sim` - runs a cooperative multi-agent grid scenario headlessly.
///
/// Agents either receive the whole task set up front and replay
/// collision-free space-time paths (`planned`), or chase the nearest open
/// task tick by tick inside their territory (`reactive`).
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// ASCII map file, one row per line, `#` for obstacles.
    ///
    /// When given, the map's size replaces `--rows` and `--cols`.
    #[arg(long, env = "COOP_MAP")]
    pub map: Option<PathBuf>,

    #[arg(long, env = "COOP_ROWS", default_value_t = 10)]
    pub rows: i32,

    #[arg(long, env = "COOP_COLS", default_value_t = 10)]
    pub cols: i32,

    /// Agent start as `row,col`, optionally followed by `:rule` and `@rank`,
    /// e.g. `10,1:greedy@0`. Repeat the flag or separate with `;`.
    #[arg(long = "agent", env = "COOP_AGENTS", value_delimiter = ';', value_parser = parse_agent, required = true)]
    pub agents: Vec<AgentSpec>,

    /// Task cell as `row,col`. Repeat the flag or separate with `;`.
    #[arg(long = "task", env = "COOP_TASKS", value_delimiter = ';', value_parser = parse_cell, conflicts_with = "random_tasks")]
    pub tasks: Vec<Cell>,

    /// Place this many tasks on random free cells instead.
    #[arg(long, env = "COOP_RANDOM_TASKS")]
    pub random_tasks: Option<usize>,

    #[arg(long, env = "COOP_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Cell every task must be carried back to.
    #[arg(long, env = "COOP_DROP_OFF", value_parser = parse_cell)]
    pub drop_off: Option<Cell>,

    /// `planned` or `reactive`.
    #[arg(long, env = "COOP_MODE", default_value = "planned")]
    pub mode: Mode,

    /// Ticks a parked agent keeps its final cell reserved.
    #[arg(long, env = "COOP_HOLD_HORIZON", default_value_t = 20)]
    pub hold_horizon: u32,

    /// Longest space-time search leg, in ticks.
    #[arg(long, env = "COOP_MAX_HORIZON", default_value_t = 200)]
    pub max_horizon: u32,

    /// Ticks without a completion before reactive agents may take over
    /// tasks claimed by others.
    #[arg(long, env = "COOP_STALL_THRESHOLD", default_value_t = 30)]
    pub stall_threshold: u32,

    #[arg(long, env = "COOP_REPARTITION_EVERY", default_value_t = 25)]
    pub repartition_every: u32,

    /// `lowest_index` or `least_loaded`.
    #[arg(long, env = "COOP_TIE_BREAK", default_value = "lowest_index")]
    pub tie_break: TieBreak,

    /// In planned mode, only let agents bid on tasks in their own territory.
    #[arg(long, env = "COOP_TERRITORY_SCOPE")]
    pub territory_scope: bool,

    /// Reactive mode: every this many ticks a new task appears next to an
    /// open one, like a spreading fire.
    #[arg(long, env = "COOP_SPREAD_EVERY")]
    pub spread_every: Option<u32>,

    /// Most tasks that may spread over a run.
    #[arg(long, env = "COOP_SPREAD_LIMIT", default_value_t = 16)]
    pub spread_limit: u32,

    #[arg(long, env = "COOP_MAX_TICKS", default_value_t = 2000)]
    pub max_ticks: u32,

    /// Delay between ticks. 0 runs as fast as possible.
    #[arg(long, env = "COOP_TICK_MS", default_value_t = 0)]
    pub tick_ms: u64,

    /// Print one JSON snapshot per tick on stdout.
    #[arg(long, env = "COOP_SNAPSHOTS")]
    pub snapshots: bool,

    /// Write the final report here instead of stdout.
    #[arg(long, env = "COOP_REPORT_OUT")]
    pub report_out: Option<PathBuf>,

    /// Write Prometheus text metrics here at exit.
    #[arg(long, env = "COOP_METRICS_OUT")]
    pub metrics_out: Option<PathBuf>,
}

pub fn parse_cell(s: &str) -> Result<Cell, String> {
    let (row, col) = s
        .trim()
        .split_once(',')
        .ok_or_else(|| format!("expected `row,col`, got '{s}'"))?;
    let row = row.trim().parse().map_err(|e| format!("bad row in '{s}': {e}"))?;
    let col = col.trim().parse().map_err(|e| format!("bad column in '{s}': {e}"))?;
    Ok(Cell::new(row, col))
}

pub fn parse_agent(s: &str) -> Result<AgentSpec, String> {
    let (rest, priority) = match s.rsplit_once('@') {
        Some((rest, rank)) => {
            let rank = rank.trim().parse().map_err(|e| format!("bad rank in '{s}': {e}"))?;
            (rest, Some(rank))
        }
        None => (s, None),
    };
    let (cell, rule) = match rest.split_once(':') {
        Some((cell, rule)) => (cell, rule.trim().parse::<PriorityRule>()?),
        None => (rest, PriorityRule::AStar),
    };
    let mut spec = AgentSpec::new(parse_cell(cell)?).with_rule(rule);
    spec.priority = priority;
    Ok(spec)
}
