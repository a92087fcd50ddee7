mod cli;
mod error_fmt;
mod sort;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use serde_json::json;
use sorter_config::{Config, OutletRecord, OutletSource};
use sorter_core::error::SorterError;
use sorter_core::{FileStore, MemoryStore};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::sort::{RunOptions, RunSummary};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("color-eyre unavailable: {e}");
    }

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::error!(error = %err, "sorter exited with error");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(cli.config.as_deref(), cli.weights.as_deref())?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging);
    tracing::debug!(config = ?cli.config, "configuration loaded");

    match cli.cmd {
        Commands::Run {
            cycles,
            status,
            stats,
            sim,
            exit_on_stall,
            stall_ms,
        } => {
            let (outlets, source) = effective_outlets(&cfg)?;
            tracing::info!(source = source.as_str(), outlets = outlets.len(), "outlet table");
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = Arc::clone(&shutdown);
                if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
                    tracing::warn!(error = %e, "Ctrl-C handler not installed");
                }
            }
            let opts = RunOptions {
                cycles,
                status_every: status.filter(|&n| n > 0),
                stats,
                force_sim: sim,
                exit_on_stall,
                stall_ms,
            };
            let summary = sort::run(&cfg, &outlets, &opts, shutdown)?;
            if stats {
                sort::print_stats(&summary);
            }
            print_summary(&summary, cli.json);
            Ok(())
        }
        Commands::SelfCheck => {
            let (outlets, _) = effective_outlets(&cfg)?;
            let check = sort::self_check(&cfg, &outlets)?;
            let ok = check.measured_mm == Some(u16::from(check.expected_mm));
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "ok": ok,
                        "channels": check.channels,
                        "outlets": check.outlets,
                        "measured_mm": check.measured_mm,
                        "expected_mm": check.expected_mm,
                    })
                );
            } else {
                println!(
                    "self-check {}: {} sensor channels, {} outlets, measured {} mm (expected {} mm)",
                    if ok { "ok" } else { "FAILED" },
                    check.channels,
                    check.outlets,
                    check
                        .measured_mm
                        .map_or_else(|| "-".to_string(), |mm| mm.to_string()),
                    check.expected_mm
                );
            }
            if ok {
                Ok(())
            } else {
                Err(SorterError::State("self-check reading does not match the simulated spear".into()).into())
            }
        }
        Commands::ShowConfig => {
            let (outlets, source) = effective_outlets(&cfg)?;
            show_config(&cfg, &outlets, source, cli.json);
            Ok(())
        }
        Commands::SaveOutlets { path } => {
            let target = path
                .or_else(|| cfg.store.path.as_ref().map(PathBuf::from))
                .ok_or_else(|| {
                    SorterError::Config("no store path: pass --path or set [store] path".into())
                })?;
            let (outlets, source) = effective_outlets(&cfg)?;
            let mut store = FileStore::new(&target);
            sorter_core::save_outlets(&mut store, &outlets)?;
            if cli.json {
                println!(
                    "{}",
                    json!({
                        "path": target.display().to_string(),
                        "outlets": outlets.len(),
                        "source": source.as_str(),
                    })
                );
            } else {
                println!(
                    "saved {} outlets ({}) to {}",
                    outlets.len(),
                    source.as_str(),
                    target.display()
                );
            }
            Ok(())
        }
    }
}

/// Read, parse and validate the config; `--weights` replaces `[scanner] weights`.
fn load_config(path: Option<&Path>, weights: Option<&Path>) -> eyre::Result<Config> {
    let mut cfg = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .wrap_err_with(|| format!("read config {}", p.display()))?;
            sorter_config::load_toml(&text)
                .map_err(|e| SorterError::Config(format!("{}: {e}", p.display())))?
        }
        None => Config::default(),
    };
    if let Some(w) = weights {
        cfg.scanner.weights = sorter_config::load_weights_csv(w)?;
    }
    cfg.validate()
        .map_err(|e| SorterError::Config(e.to_string()))?;
    Ok(cfg)
}

/// Resolve the outlet table (config, store, defaults) and check it against the queue.
fn effective_outlets(cfg: &Config) -> eyre::Result<(Vec<OutletRecord>, OutletSource)> {
    let (outlets, source) = match cfg.store.path.as_deref() {
        Some(p) => sorter_core::resolve_outlets(cfg, Some(&mut FileStore::new(p))),
        None => sorter_core::resolve_outlets::<MemoryStore>(cfg, None),
    };
    sorter_config::validate_outlets(&outlets, cfg.queue.length)
        .map_err(|e| SorterError::Config(format!("{} outlet table: {e}", source.as_str())))?;
    Ok((outlets, source))
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::layer::Layered<EnvFilter, Registry>> + Send + Sync>;

fn init_tracing(json: bool, level: Option<&str>, logging: &sorter_config::Logging) {
    let level = level
        .or(logging.level.as_deref())
        .unwrap_or("info")
        .to_string();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    // Console logs go to stderr; stdout carries results.
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let mut layers: Vec<BoxedLayer> = vec![if json {
        console.json().boxed()
    } else {
        console.boxed()
    }];

    if let Some(file) = logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "sorter.log".into(), |n| n.to_os_string());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init();
}

fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn print_summary(summary: &RunSummary, as_json: bool) {
    let d = &summary.diagnostics;
    if as_json {
        println!(
            "{}",
            json!({
                "timestamp": unix_ms(),
                "backend": summary.backend,
                "interrupted": summary.interrupted,
                "cycles": summary.stats.cycles,
                "ticks": summary.stats.ticks,
                "outlet_openings": summary.stats.outlet_openings,
                "per_outlet": summary.per_outlet,
                "objects": d.total_objects,
                "discarded": d.discarded,
                "zero_crossings": d.zero_crossings,
                "drift_events": d.drift_events,
                "last_drift_raw": d.last_drift_raw,
                "aged_out": d.aged_out,
                "dropped_events": d.dropped_events,
                "sensor_faults": d.sensor_faults,
                "actuator_faults": d.actuator_faults,
                "stalls": summary.stats.stalls,
                "max_service_us": summary.stats.max_service_us,
                "mean_service_us": summary.stats.mean_service_us,
            })
        );
        return;
    }
    println!(
        "Sorting {} after {} cycles ({} backend): {} objects, {} openings, {} drift corrections.",
        if summary.interrupted { "interrupted" } else { "complete" },
        summary.stats.cycles,
        summary.backend,
        d.total_objects,
        summary.stats.outlet_openings,
        d.drift_events
    );
    for (outlet, count) in summary.per_outlet.iter().enumerate() {
        let label = if outlet == 0 { " (reject)" } else { "" };
        println!("  outlet {outlet}{label}: {count}");
    }
}

fn show_config(cfg: &Config, outlets: &[OutletRecord], source: OutletSource, as_json: bool) {
    if as_json {
        let table: Vec<_> = outlets
            .iter()
            .map(|o| {
                json!({
                    "min_mm": o.min_mm,
                    "max_mm": o.max_mm,
                    "offset": o.offset,
                    "closed_angle": o.closed_angle,
                    "open_angle": o.open_angle,
                })
            })
            .collect();
        println!(
            "{}",
            json!({
                "steps_per_cycle": cfg.encoder.steps_per_cycle,
                "phases": {
                    "scan_start": cfg.phases.scan_start,
                    "outlet_reset": cfg.phases.outlet_reset,
                    "diameter_finalize": cfg.phases.diameter_finalize,
                    "outlet_commit": cfg.phases.outlet_commit,
                },
                "weights": cfg.scanner.weights,
                "min_valid_width": cfg.scanner.min_valid_width,
                "units_per_mm": cfg.scanner.units_per_mm,
                "queue_length": cfg.queue.length,
                "rescan_threshold": cfg.assignment.rescan_threshold,
                "outlet_source": source.as_str(),
                "outlets": table,
            })
        );
        return;
    }
    println!("steps_per_cycle: {}", cfg.encoder.steps_per_cycle);
    println!(
        "phases: scan_start={} outlet_reset={} diameter_finalize={} outlet_commit={}",
        cfg.phases.scan_start,
        cfg.phases.outlet_reset,
        cfg.phases.diameter_finalize,
        cfg.phases.outlet_commit
    );
    println!(
        "scanner: weights={:?} min_valid_width={} units_per_mm={}",
        cfg.scanner.weights, cfg.scanner.min_valid_width, cfg.scanner.units_per_mm
    );
    println!(
        "queue: length={} rescan_threshold={}",
        cfg.queue.length, cfg.assignment.rescan_threshold
    );
    println!("outlets ({}):", source.as_str());
    for (i, o) in outlets.iter().enumerate() {
        println!(
            "  {i}: ({}, {}] mm @ slot {} angles {}/{}",
            o.min_mm, o.max_mm, o.offset, o.closed_angle, o.open_angle
        );
    }
}
