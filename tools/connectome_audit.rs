// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Dataset consistency auditor.
//!
//! Opens the configured dataset (restoring its snapshot when one exists),
//! optionally bulk-loads a JSON dataset into it, and audits every derived
//! value. Exits 1 when the audit finds violations.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use connectome::config::{load_config, validation::validate_config};
use connectome::engine::{BulkDataset, ConnectomeEngine};
use connectome::observability::{debug_flags_help, init_logging, parse_debug_flags, LoggingOptions};
use tracing::{error, info};

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: connectome-audit [--config <path>] [--bulk <dataset.json>] [--save] [--key=value ...]\n\n\
         Overrides use the flat keys, e.g. --dataset=hemibrain --lock_timeout_ms=500\n\n{}",
        debug_flags_help()
    );
    process::exit(2);
}

struct Args {
    config: Option<PathBuf>,
    bulk: Option<PathBuf>,
    save: bool,
    overrides: HashMap<String, String>,
}

fn parse_args() -> Args {
    let mut parsed = Args {
        config: None,
        bulk: None,
        save: false,
        overrides: HashMap::new(),
    };
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.config = Some(PathBuf::from(v));
            }
            "--bulk" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.bulk = Some(PathBuf::from(v));
            }
            "--save" => parsed.save = true,
            "-h" | "--help" => usage_and_exit(),
            other if other.starts_with("--debug-") => {}
            other => match other.strip_prefix("--").and_then(|kv| kv.split_once('=')) {
                Some((key, value)) => {
                    parsed.overrides.insert(key.to_string(), value.to_string());
                }
                None => usage_and_exit(),
            },
        }
    }
    parsed
}

fn run(args: Args) -> Result<bool> {
    let config = load_config(args.config.as_deref(), Some(&args.overrides))
        .context("failed to load configuration")?;
    validate_config(&config).context("invalid configuration")?;

    let _guard = init_logging(&parse_debug_flags(), &LoggingOptions::from(&config.logging))?;

    let engine = ConnectomeEngine::in_memory(&config)?;
    if let Some(path) = &args.bulk {
        let encoded = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let report = engine.bulk_load(&BulkDataset::from_json_str(&encoded)?)?;
        info!(
            synapses = report.synapses,
            segments = report.segments,
            connections = report.connections,
            "bulk load committed"
        );
    }

    let report = engine.audit()?;
    print!("{}", report);

    if args.save {
        let Some(path) = &config.persistence.snapshot_path else {
            bail!("--save needs persistence.snapshot_path to be configured");
        };
        engine.save_snapshot(path)?;
    }
    Ok(report.is_consistent())
}

fn main() {
    match run(parse_args()) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            error!("{:#}", err);
            eprintln!("connectome-audit: {:#}", err);
            process::exit(2);
        }
    }
}
