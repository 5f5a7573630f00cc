use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use fxxh::{bulk, cache, hasher};

#[derive(Parser)]
#[command(name = "fxxh", version, about = "Deterministic XXH3-128 filesystem change detection")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hash a single file, or stdin if no path is given.
    Hash {
        path: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        seed_low: u32,
        #[arg(long, default_value_t = 0)]
        seed_high: u32,
    },
    /// Hash a list of files and report per-file and/or aggregate digests.
    Bulk {
        paths: Vec<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputModeArg::Digest)]
        output_mode: OutputModeArg,
        #[arg(long, default_value_t = 0)]
        concurrency: usize,
        #[arg(long, default_value_t = 0)]
        seed_low: u32,
        #[arg(long, default_value_t = 0)]
        seed_high: u32,
    },
    /// Validate or refresh a binary cache sidecar.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputModeArg {
    Digest,
    Files,
    All,
}

#[derive(Subcommand)]
enum CacheAction {
    Validate {
        sidecar: PathBuf,
        paths: Vec<PathBuf>,
        #[arg(long, default_value_t = 0)]
        version: u32,
        #[arg(long)]
        fingerprint: Option<String>,
    },
    Write {
        sidecar: PathBuf,
        paths: Vec<PathBuf>,
        #[arg(long, default_value_t = 0)]
        version: u32,
        #[arg(long)]
        fingerprint: Option<String>,
        #[arg(long, default_value_t = 1)]
        gzip_level: u32,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fxxh: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Hash { path, seed_low, seed_high } => run_hash(path, seed_low, seed_high),
        Command::Bulk { paths, output_mode, concurrency, seed_low, seed_high } => {
            run_bulk(paths, output_mode, concurrency, seed_low, seed_high)
        }
        Command::Cache { action } => run_cache(action),
    }
}

fn run_hash(path: Option<PathBuf>, seed_low: u32, seed_high: u32) -> anyhow::Result<()> {
    let data = match &path {
        Some(p) => fxxh::common::io::read_file_bytes(p)?,
        None => fxxh::common::io::read_stdin()?,
    };
    let digest = hasher::hash(&data, seed_low, seed_high);
    let label = path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("{}  {}", hex(&digest), label);
    Ok(())
}

fn run_bulk(
    paths: Vec<PathBuf>,
    output_mode: OutputModeArg,
    concurrency: usize,
    seed_low: u32,
    seed_high: u32,
) -> anyhow::Result<()> {
    let path_strs: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    let path_refs: Vec<&str> = path_strs.iter().map(String::as_str).collect();

    let mut req = bulk::BulkRequest::new(bulk::Files::Paths(&path_refs));
    req.output_mode = match output_mode {
        OutputModeArg::Digest => bulk::OutputMode::Digest,
        OutputModeArg::Files => bulk::OutputMode::Files,
        OutputModeArg::All => bulk::OutputMode::All,
    };
    req.concurrency = concurrency;
    req.seed_low = seed_low;
    req.seed_high = seed_high;

    let out = bulk::bulk_hash(&req)?;
    for chunk in out.chunks(16) {
        println!("{}", hex(chunk));
    }
    Ok(())
}

fn run_cache(action: CacheAction) -> anyhow::Result<()> {
    match action {
        CacheAction::Validate { sidecar, paths, version, fingerprint } => {
            let manager = cache::Manager::new(version, 0, 0);
            let fp = fingerprint_bytes(fingerprint.as_deref());
            let mut c = manager.cache(&sidecar, fp);
            c.open()?;

            let path_strs: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
            let path_refs: Vec<&str> = path_strs.iter().map(String::as_str).collect();
            let files = if path_refs.is_empty() { None } else { Some(path_refs.as_slice()) };

            let result = c.validate(files)?;
            println!(
                "changed={} digest={} rehashed={}",
                result.changed,
                hex(&result.digest),
                result.rehashed
            );
            Ok(())
        }
        CacheAction::Write { sidecar, paths, version, fingerprint, gzip_level } => {
            let manager = cache::Manager::new(version, 0, 0);
            let fp = fingerprint_bytes(fingerprint.as_deref());
            let mut c = manager.cache(&sidecar, fp);
            c.open()?;

            let path_strs: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
            let path_refs: Vec<&str> = path_strs.iter().map(String::as_str).collect();
            let files = if path_refs.is_empty() { None } else { Some(path_refs.as_slice()) };

            c.validate(files)?;
            c.write(&cache::WriteOptions {
                gzip_level,
                ..cache::WriteOptions::new()
            })?;
            eprintln!("wrote {}", sidecar.display());
            Ok(())
        }
    }
}

fn fingerprint_bytes(raw: Option<&str>) -> [u8; 16] {
    match raw {
        Some(s) => cache::fingerprint_of(s.as_bytes()),
        None => [0u8; 16],
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
