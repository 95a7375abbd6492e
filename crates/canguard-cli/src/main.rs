//! `canguard` – offline driver for the CAN safety engine.
//!
//! - `canguard replay <log>` replays a candump log through the engine and
//!   prints every rejection, denial and (optionally) forwarding decision.
//! - `canguard profile` prints the tables of the selected vehicle profile.
//! - `canguard init` writes a default `~/.canguard/config.toml`.
//!
//! Ctrl-C stops a replay cleanly and still prints the summary.

mod config;
mod replay;
mod telemetry;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use canguard_kernel::{SafetyEngine, VehicleModel, VehicleProfile};
use canguard_types::{RxVerdict, SafetyError};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, warn};

use crate::config::Config;
use crate::replay::{ReplayEvent, ReplaySummary, Replayer};

#[derive(Parser)]
#[command(name = "canguard", version, about = "CAN safety policy engine tools")]
struct Cli {
    /// Vehicle profile, overriding the config file.
    #[arg(long, global = true)]
    vehicle: Option<VehicleModel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a candump log through the engine.
    Replay {
        log: PathBuf,
        /// Print every forwarded frame too.
        #[arg(long)]
        show_forwarding: bool,
    },
    /// Print the selected vehicle profile.
    Profile,
    /// Write a default config file if none exists.
    Init,
}

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("canguard");
    let cli = Cli::parse();

    let mut cfg = config::load_or_default();
    if let Some(vehicle) = cli.vehicle {
        cfg.vehicle = vehicle;
    }

    let result = match cli.command {
        Command::Replay {
            log,
            show_forwarding,
        } => {
            cfg.show_forwarding |= show_forwarding;
            run_replay(&cfg, &log)
        }
        Command::Profile => cfg.vehicle.profile().map(|p| print_profile(&p)),
        Command::Init => run_init(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "canguard failed");
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run_init() -> Result<(), SafetyError> {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already present at {}", path.display().to_string().bold());
        return Ok(());
    }
    config::save(&Config::default())?;
    println!("  {} {}", "Wrote".green(), path.display().to_string().bold());
    Ok(())
}

fn run_replay(cfg: &Config, log: &Path) -> Result<(), SafetyError> {
    let file = File::open(log)
        .map_err(|e| SafetyError::Config(format!("cannot open {}: {e}", log.display())))?;
    let mut engine = SafetyEngine::new(cfg.vehicle.profile()?, cfg.engine_options())?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    println!(
        "  Replaying {} as {}",
        log.display().to_string().bold(),
        cfg.vehicle.to_string().cyan()
    );
    let show_forwarding = cfg.show_forwarding;
    let summary = Replayer::new(&mut engine, cfg).run(BufReader::new(file), &stop, |event| {
        print_event(event, show_forwarding)
    })?;
    print_summary(&summary, &engine);
    Ok(())
}

fn print_event(event: &ReplayEvent, show_forwarding: bool) {
    match event {
        ReplayEvent::Rx {
            frame,
            verdict,
            forward,
        } => {
            let target = forward.map_or_else(|| "drop".to_string(), |b| format!("→ bus {b}"));
            match verdict {
                RxVerdict::Invalid(fault) => println!(
                    "  {} rx  bus {} {:#05x} {} ({target})",
                    "INVALID".red().bold(),
                    frame.bus,
                    frame.address,
                    fault.to_string().red()
                ),
                _ if show_forwarding => println!(
                    "  {} rx  bus {} {:#05x} {}",
                    "ok".dimmed(),
                    frame.bus,
                    frame.address,
                    target.dimmed()
                ),
                _ => {}
            }
        }
        ReplayEvent::Tx { frame, result } => match result {
            Ok(()) => println!(
                "  {} tx  bus {} {:#05x}",
                "ALLOW".green().bold(),
                frame.bus,
                frame.address
            ),
            Err(e) => println!(
                "  {} tx  bus {} {:#05x} {}",
                "DENY".yellow().bold(),
                frame.bus,
                frame.address,
                e.to_string().yellow()
            ),
        },
        ReplayEvent::Skipped { line, reason } => {
            println!("  {} line {line}: {}", "skip".dimmed(), reason.dimmed());
        }
    }
}

fn print_summary(summary: &ReplaySummary, engine: &SafetyEngine) {
    println!();
    if summary.interrupted {
        println!("{}", "  Interrupted – partial results".yellow().bold());
    }
    println!("  {}", "Summary".bold().underline());
    println!(
        "    rx frames      {} ({} invalid, {} unmonitored, {} dropped)",
        summary.rx_frames, summary.rx_invalid, summary.rx_unmonitored, summary.dropped
    );
    println!(
        "    tx requests    {} allowed, {} denied",
        summary.tx_allowed.to_string().green(),
        summary.tx_denied.to_string().yellow()
    );
    println!("    skipped lines  {}", summary.skipped);
    for (bus, sent) in &summary.sent_per_bus {
        println!("    bus {bus} sent     {sent}");
    }

    let state = engine.state();
    println!("  {}", "Final vehicle state".bold().underline());
    println!("    speed          {:.2} m/s", state.vehicle_speed);
    println!(
        "    yaw rate       {:.4} rad/s ({})",
        state.yaw_rate,
        if state.yaw_rate_valid { "valid" } else { "invalid" }
    );
    println!("    controls       {}", on_off(state.controls_allowed));
    println!("    inhibited      {}", on_off(engine.controls_inhibited()));
    if engine.relay_malfunction() {
        println!("    {}", "RELAY MALFUNCTION".red().bold());
    }
    for h in engine.health() {
        let status = if h.healthy() {
            "healthy".green()
        } else if !h.seen {
            "missing".yellow()
        } else {
            "degraded".red()
        };
        println!("    {:#05x} bus {}  {status}", h.address, h.bus);
    }
}

fn on_off(flag: bool) -> colored::ColoredString {
    if flag { "on".green() } else { "off".dimmed() }
}

fn print_profile(profile: &VehicleProfile) {
    println!("  {} {}", "Vehicle profile".bold(), profile.name.cyan());
    println!("    main bus {}  camera bus {}", profile.main_bus, profile.camera_bus);

    println!("  {}", "Transmit allow-list".bold().underline());
    for d in &profile.tx_allow_list {
        println!("    {:#05x}  bus {}  len {}", d.address, d.bus, d.len);
    }

    println!("  {}", "Monitored receive messages".bold().underline());
    for entry in &profile.addr_checks {
        for v in &entry.variants {
            let counter = v
                .counter
                .map_or_else(|| "-".to_string(), |c| format!("{} (max {})", c.signal.name, c.max));
            println!(
                "    {:#05x}  bus {}  len {}  every {} ms  counter {counter}  checksum {}",
                v.msg.address,
                v.msg.bus,
                v.msg.len,
                v.expected_interval_us / 1000,
                if v.checksum.is_some() { "yes" } else { "no" }
            );
        }
    }

    println!("  {}", "Stock camera messages".bold().underline());
    let stock: Vec<String> = profile
        .stock_lkas_addresses
        .iter()
        .map(|a| format!("{a:#05x}"))
        .collect();
    println!("    {}", stock.join(", "));

    println!("  {}", "Curvature rate limits (1/m per cycle)".bold().underline());
    let limits = &profile.steering_limits;
    println!("    {:>8}  {:>9}  {:>9}", "m/s", "up", "down");
    for ((speed, up), down) in limits
        .rate_up
        .breakpoints()
        .iter()
        .zip(limits.rate_up.values())
        .zip(limits.rate_down.values())
    {
        println!("    {speed:>8.1}  {up:>9.5}  {down:>9.5}");
    }
    let or_unset = |v: Option<f64>| v.map_or_else(|| "not set".to_string(), |v| format!("{v}"));
    println!("    max curvature    {}", or_unset(limits.max_curvature));
    println!(
        "    yaw plausibility {}",
        limits.yaw_plausibility.map_or_else(
            || "not set".to_string(),
            |p| format!("above {} m/s, ±{}", p.min_speed, p.max_deviation)
        )
    );

    let rules: Vec<&str> = profile.tx_rules.iter().map(|r| r.name()).collect();
    println!("  {} {}", "Transmit rules:".bold(), rules.join(", "));
}
