//! XACT Bank Inspector
//!
//! Usage:
//!   xa-inspect clip <file> --at <offset>                     - Dump a clip definition
//!   xa-inspect curve <file> --at <offset> [--count N]        - Dump RPC curves
//!   xa-inspect curve <file> --at <offset> --eval 0.5 --eval 1 - ...and evaluate them
//!
//! Offsets accept decimal or `0x` hex. Set `RUST_LOG=debug` to see
//! reserved fields and uninterpreted bytes as they are parsed.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use xa_core::XactError;
use xa_event::{ClipDefinition, RpcCurve};

#[derive(Parser)]
#[command(name = "xa-inspect", about = "Inspect XACT clip tables and RPC curves")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the clip whose metadata starts at `--at`
    Clip {
        file: PathBuf,
        /// Offset of the clip metadata
        #[arg(long, value_parser = parse_offset)]
        at: u64,
    },
    /// Parse consecutive RPC curve records starting at `--at`
    Curve {
        file: PathBuf,
        /// Offset of the first curve record
        #[arg(long, value_parser = parse_offset)]
        at: u64,
        /// Number of records
        #[arg(short, long, default_value_t = 1)]
        count: usize,
        /// Variable indices that are global
        #[arg(long = "global")]
        global: Vec<u16>,
        /// Variable values to evaluate every curve at
        #[arg(long = "eval", allow_negative_numbers = true)]
        eval: Vec<f32>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let output = match cli.command {
        Commands::Clip { file, at } => inspect_clip(&file, at),
        Commands::Curve {
            file,
            at,
            count,
            global,
            eval,
        } => inspect_curves(&file, at, count, &global, &eval),
    }
    .inspect_err(|e| {
        if e.downcast_ref::<XactError>().is_some_and(XactError::is_content_error) {
            log::warn!("Unsupported or malformed bank content; is the offset right?");
        }
    })?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn parse_offset(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset '{}': {}", s, e))
}

fn open_at(path: &Path, offset: u64) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(offset))
        .with_context(|| format!("Failed to seek to {:#x}", offset))?;
    Ok(reader)
}

fn inspect_clip(path: &Path, offset: u64) -> Result<serde_json::Value> {
    let mut reader = open_at(path, offset)?;
    let definition = ClipDefinition::read_from(&mut reader)
        .with_context(|| format!("Failed to parse clip at {:#x}", offset))?;

    log::info!(
        "Clip at {:#x}: {} events, {} with uninterpreted data",
        offset,
        definition.events.len(),
        definition.events.iter().filter(|e| e.has_unknown_data()).count()
    );

    Ok(serde_json::to_value(&definition)?)
}

fn inspect_curves(
    path: &Path,
    offset: u64,
    count: usize,
    global: &[u16],
    eval: &[f32],
) -> Result<serde_json::Value> {
    let mut reader = open_at(path, offset)?;
    let curves = RpcCurve::read_table(&mut reader, count, |variable| global.contains(&variable))
        .with_context(|| format!("Failed to parse {} curves at {:#x}", count, offset))?;

    let entries = curves
        .iter()
        .map(|curve| {
            let evaluations: Vec<_> = eval
                .iter()
                .map(|&x| json!({ "variable": x, "value": curve.evaluate(x) }))
                .collect();
            json!({ "curve": curve, "evaluations": evaluations })
        })
        .collect::<Vec<_>>();

    Ok(json!(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("128").unwrap(), 128);
        assert_eq!(parse_offset("0x80").unwrap(), 128);
        assert_eq!(parse_offset("0XfF").unwrap(), 255);
        assert!(parse_offset("0xzz").is_err());
        assert!(parse_offset("-1").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["xa-inspect", "curve", "bank.xsb", "--at", "0x10", "--eval", "-1.5"]).unwrap();
        match cli.command {
            Commands::Curve { at, count, eval, .. } => {
                assert_eq!(at, 16);
                assert_eq!(count, 1);
                assert_eq!(eval, vec![-1.5]);
            }
            Commands::Clip { .. } => panic!("expected curve command"),
        }
    }

    #[test]
    fn test_clap_config() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
