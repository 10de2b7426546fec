use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use kestrel::abstraction::{AbstractionError, AbstractionResult, CellId, DynamicAbstraction, EditOutcome};
use kestrel::config::AbstractionConfig;
use kestrel::maps::{load_map, random_map, MapData};
use kestrel::profile_log;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build a sector abstraction and subgoal database for a grid map, then keep
/// it current under single-cell wall edits.
#[derive(Parser, Debug)]
#[command(name = "kestrel", version)]
struct Cli {
    /// MovingAI .map file to load
    #[arg(long, conflicts_with = "random")]
    map: Option<PathBuf>,

    /// Generate a random map instead, e.g. 64x64
    #[arg(long, value_parser = parse_dimensions)]
    random: Option<(usize, usize)>,

    /// Seed for random maps and random edits
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Wall probability for random maps
    #[arg(long, default_value_t = 0.25)]
    density: f64,

    /// RON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Edit script: one `add x y` or `remove x y` per line
    #[arg(long)]
    edits: Option<PathBuf>,

    /// Apply this many random toggles after the scripted edits
    #[arg(long, default_value_t = 0)]
    random_edits: usize,

    /// Compare against a full rebuild after every edit
    #[arg(long)]
    verify: bool,

    /// Write the final database here
    #[arg(long)]
    export: Option<PathBuf>,
}

fn parse_dimensions(s: &str) -> Result<(usize, usize), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w = w.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let h = h.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    Ok((w, h))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EditKind {
    Add,
    Remove,
    /// Add or remove, whichever the cell allows.
    Toggle,
}

fn parse_edit_script(text: &str) -> AbstractionResult<Vec<(EditKind, usize, usize)>> {
    let mut edits = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        let kind = match parts.first() {
            Some(&"add") => EditKind::Add,
            Some(&"remove") => EditKind::Remove,
            _ => {
                return Err(AbstractionError::MapFormat(format!(
                    "edit line {}: expected 'add' or 'remove'",
                    number + 1
                )))
            }
        };
        let coord = |i: usize| {
            parts
                .get(i)
                .and_then(|v| v.parse::<usize>().ok())
                .ok_or_else(|| AbstractionError::MapFormat(format!("edit line {}: bad coordinates", number + 1)))
        };
        edits.push((kind, coord(1)?, coord(2)?));
    }
    Ok(edits)
}

fn setup_file_logging() -> String {
    let log_dir = PathBuf::from("logs");
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create logs directory: {e}");
    }

    // Clean up old log files, keeping only the last 25
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("kestrel_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path_str = log_dir.join(&log_filename).to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);

    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);

    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kestrel=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    log_path_str
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    if let Ok(entries) = fs::read_dir(log_dir) {
        let mut log_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.starts_with("kestrel") && s.ends_with(".log"))
                    .unwrap_or(false)
            })
            .collect();

        // Oldest first
        log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        if log_files.len() > keep_count {
            for file in log_files.iter().take(log_files.len() - keep_count) {
                let _ = fs::remove_file(file.path());
            }
        }
    }
}

fn apply(abstraction: &mut DynamicAbstraction, kind: EditKind, cell: CellId) -> AbstractionResult<EditOutcome> {
    match kind {
        EditKind::Add => abstraction.add_wall(cell),
        EditKind::Remove => abstraction.remove_wall(cell),
        EditKind::Toggle if abstraction.grid().is_open(cell) => abstraction.add_wall(cell),
        EditKind::Toggle => abstraction.remove_wall(cell),
    }
}

fn check_against_rebuild(abstraction: &DynamicAbstraction, edit_index: usize) -> AbstractionResult<bool> {
    let incremental = abstraction.export_bytes()?;
    let rebuilt = abstraction.rebuild()?.export_bytes()?;
    if incremental != rebuilt {
        error!(
            "[VERIFY] Edit {}: incremental export ({} bytes) differs from rebuild ({} bytes)",
            edit_index,
            incremental.len(),
            rebuilt.len()
        );
        return Ok(false);
    }
    Ok(true)
}

fn run(cli: Cli) -> AbstractionResult<bool> {
    let mut config = match &cli.config {
        Some(path) => AbstractionConfig::load(path)?,
        None => AbstractionConfig::default(),
    };
    if cli.verify {
        config.verify_after_edit = true;
    }

    let map: MapData = match (&cli.map, cli.random) {
        (Some(path), _) => load_map(path)?,
        (None, Some((w, h))) => random_map(w, h, cli.density, cli.seed),
        (None, None) => random_map(64, 64, cli.density, cli.seed),
    };

    let start = std::time::Instant::now();
    let mut abstraction = DynamicAbstraction::new(map.width, map.height, &map.walkable, config)?;
    info!(
        "Built {} regions, {} database entries in {:?}",
        abstraction.regions().len(),
        abstraction.database().entry_count(),
        start.elapsed()
    );

    let mut edits = match &cli.edits {
        Some(path) => parse_edit_script(&fs::read_to_string(path)?)?,
        None => Vec::new(),
    };
    let mut rng = StdRng::seed_from_u64(cli.seed);
    for _ in 0..cli.random_edits {
        let x = rng.random_range(0..map.width.max(1));
        let y = rng.random_range(0..map.height.max(1));
        edits.push((EditKind::Toggle, x, y));
    }

    let mut all_equal = true;
    let start = std::time::Instant::now();
    for (index, &(kind, x, y)) in edits.iter().enumerate() {
        let cell = abstraction.cell_at(x, y)?;
        match apply(&mut abstraction, kind, cell) {
            Ok(_outcome) => {
                profile_log!(index, "Applied {} edits, {} regions live", index, _outcome.regions_after);
            }
            Err(AbstractionError::PreconditionViolation { cell, expected }) => {
                warn!("Skipping edit {} at {}: cell is not {}", index, cell, expected);
                continue;
            }
            Err(e) => return Err(e),
        }
        if cli.verify && !check_against_rebuild(&abstraction, index)? {
            all_equal = false;
        }
    }
    if !edits.is_empty() {
        info!(
            "Applied {} edits in {:?}; {} regions live",
            edits.len(),
            start.elapsed(),
            abstraction.regions().len()
        );
    }

    if let Some(path) = &cli.export {
        abstraction.database().export(abstraction.grid(), abstraction.regions(), path)?;
        info!("Exported database to {}", path.display());
    }
    Ok(all_equal)
}

fn main() -> ExitCode {
    let log_file = setup_file_logging();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║  Kestrel - Logging to file                               ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║  Log file: {:<45} ║", log_file);
    println!("╚══════════════════════════════════════════════════════════╝");

    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("Incremental database diverged from the full rebuild");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
