//! splitrandr - split-configuration inspector.
//!
//! Loads a binary split configuration, validates every record and prints
//! the rules with their split trees. The engine itself runs embedded in the
//! interposition layer; this binary is the operator's way to see what a
//! configuration file will actually do.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use splitrandr::config::{MonitorRule, SplitConfig};
use splitrandr::plan::{SplitAxis, SplitPlan};

/// Command-line arguments for splitrandr
#[derive(Parser, Debug)]
#[command(name = "splitrandr")]
#[command(version, about = "Inspect a monitor-splitting configuration", long_about = None)]
struct Args {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/fakexrandr.bin)
    #[arg(short, long, env = "SPLITRANDR_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let path = match args.config {
        Some(path) => path,
        None => default_config_path().context("cannot determine the default config path")?,
    };

    let stream = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let config = SplitConfig::parse(&stream)
        .with_context(|| format!("parsing {}", path.display()))?;

    if config.is_empty() {
        println!("{}: no split rules", path.display());
        return Ok(());
    }

    println!("{}: {} rule(s)", path.display(), config.rules().len());
    for rule in config.rules() {
        print_rule(rule);
    }
    Ok(())
}

fn init_logging(args: &Args) {
    let level = match args.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("splitrandr={level}")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// The path the interposition layer reads its configuration from.
fn default_config_path() -> Option<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(env::var_os("HOME")?).join(".config"),
    };
    Some(base.join("fakexrandr.bin"))
}

fn print_rule(rule: &MonitorRule) {
    println!();
    println!(
        "  {} ({}x{}, {} sub-output(s))",
        rule.name,
        rule.width,
        rule.height,
        rule.plan.leaf_count()
    );
    println!(
        "    fingerprint: {}",
        String::from_utf8_lossy(&rule.fingerprint)
    );
    let mut index = 0u32;
    print_plan(&rule.plan, 0, 0, rule.width, rule.height, 4, &mut index);
}

fn print_plan(plan: &SplitPlan, x: u32, y: u32, width: u32, height: u32, depth: usize, index: &mut u32) {
    let pad = " ".repeat(depth);
    match plan {
        SplitPlan::Leaf => {
            *index += 1;
            println!("{pad}~{index}: {width}x{height}+{x}+{y}");
        }
        SplitPlan::Split {
            axis,
            at,
            first,
            second,
        } => {
            let (word, extent) = match axis {
                SplitAxis::Horizontal => ("horizontal", height),
                SplitAxis::Vertical => ("vertical", width),
            };
            if *at == 0 || *at >= extent {
                println!("{pad}{word} split at {at} !! outside extent {extent}");
                return;
            }
            println!("{pad}{word} split at {at}");
            match axis {
                SplitAxis::Horizontal => {
                    print_plan(first, x, y, width, *at, depth + 2, index);
                    print_plan(second, x, y + at, width, height - at, depth + 2, index);
                }
                SplitAxis::Vertical => {
                    print_plan(first, x, y, *at, height, depth + 2, index);
                    print_plan(second, x + at, y, width - at, height, depth + 2, index);
                }
            }
        }
    }
}
