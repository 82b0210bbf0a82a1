//! TierScale CLI - hardware tier classification and resource sizing
//!
//! Thin wrapper over the library: bootstrap an engine, then analyze,
//! self-test or watch it.

use clap::Parser;
use std::time::Duration;
use tierscale::config::{CliArgs, Commands, EngineConfig};
use tierscale::core::{run_diagnostics, EngineContext};
use tierscale::error::Result;
use tierscale::progress::MetricsReporter;
use tierscale::system::SystemProbe;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    // Handle result
    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// RUST_LOG wins; otherwise -q/-v pick the level
fn init_logging(args: &CliArgs) {
    let level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(args: &CliArgs) -> Result<i32> {
    let mut config = EngineConfig::from_cli(args)?;
    let command = args
        .command
        .clone()
        .unwrap_or(Commands::Analyze { json: false });

    match &command {
        Commands::Analyze { .. } => {
            config.monitor.enabled = false;
        }
        Commands::Diagnose => {}
        Commands::Monitor { interval, delay, .. } => {
            config.monitor.enabled = true;
            config.monitor.interval_ms = millis(*interval).max(1);
            config.monitor.initial_delay_ms = millis(*delay);
        }
    }

    // Build the engine
    let ctx = EngineContext::bootstrap(&config, &SystemProbe::new())?;

    if args.verbose > 0 && !args.quiet {
        print_config(&config);
    }

    let code = match command {
        Commands::Analyze { json } => cmd_analyze(&ctx, json)?,
        Commands::Diagnose => cmd_diagnose(&ctx),
        Commands::Monitor {
            interval, duration, ..
        } => cmd_monitor(&ctx, interval, duration, args.quiet),
    };

    ctx.shutdown();
    Ok(code)
}

fn cmd_analyze(ctx: &EngineContext, json: bool) -> Result<i32> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ctx.report())?);
    } else {
        println!("Analyzing system resources...\n");
        ctx.print_summary();
    }
    Ok(0)
}

fn cmd_diagnose(ctx: &EngineContext) -> i32 {
    let report = run_diagnostics(ctx);
    report.print();

    if report.all_passed() {
        0
    } else {
        1
    }
}

fn cmd_monitor(ctx: &EngineContext, interval: Duration, duration: Option<Duration>, quiet: bool) -> i32 {
    let reporter = if quiet {
        MetricsReporter::disabled()
    } else {
        MetricsReporter::new()
    };

    reporter.println(&format!(
        "Monitoring {} ({}) every {}",
        ctx.facts().platform_name,
        ctx.device_class(),
        humantime::format_duration(interval)
    ));
    match duration {
        Some(d) => reporter.println(&format!("Stopping after {}.", humantime::format_duration(d))),
        None => reporter.println("Press Ctrl+C to stop."),
    }

    // Poll faster than the sampler so each tick shows up promptly
    let refresh = (interval / 4).clamp(Duration::from_millis(50), Duration::from_millis(500));
    reporter.watch(ctx.monitor(), refresh, duration);
    reporter.finish("Monitoring stopped");

    if ctx.monitor().is_degraded() {
        tracing::warn!("CPU load was estimated from the load average for this run");
    }
    0
}

fn print_config(config: &EngineConfig) {
    println!("=== Configuration ===");
    match &config.hardware {
        Some(facts) => println!(
            "Hardware:       {} cores, {} ({})",
            facts.core_count,
            humansize::format_size(facts.memory_bytes, humansize::BINARY),
            facts.platform_name
        ),
        None => println!("Hardware:       probed"),
    }
    match config.scheduler.workers {
        Some(workers) => println!("Workers:        {}", workers),
        None => println!("Workers:        one per core"),
    }
    match config.scheduler.queue_capacity {
        Some(capacity) => println!("Queue capacity: {}", capacity),
        None => println!("Queue capacity: derived"),
    }
    println!("Queue policy:   {:?}", config.scheduler.queue_policy);
    if config.monitor.enabled {
        println!(
            "Monitor:        every {} after {}",
            humantime::format_duration(config.monitor.interval()),
            humantime::format_duration(config.monitor.initial_delay())
        );
    } else {
        println!("Monitor:        disabled");
    }
    println!();
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
