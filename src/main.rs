use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use stagevisor::{
    Config, Coordinator, Entropy, LogWriter, MAX_COHORT, MIN_COHORT, OsEntropy, SeededEntropy,
    Subscribe,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stagevisor")]
#[command(version, about = "Run a cohort of workers through barrier-synchronised stages")]
struct Cli {
    /// Number of workers in the cohort
    #[arg(value_parser = clap::value_parser!(u32).range(MIN_COHORT as i64..=MAX_COHORT as i64))]
    n: u32,

    /// Seed for a reproducible run (OS entropy otherwise)
    #[arg(long)]
    seed: Option<u64>,

    /// Comma-separated stage weights, e.g. 3,6,7,5
    #[arg(long, value_delimiter = ',')]
    weights: Option<Vec<u32>>,

    /// Think time range before each attempt, in milliseconds (MIN..MAX)
    #[arg(long, value_parser = parse_range)]
    think_ms: Option<RangeInclusive<u32>>,

    /// Worker verdict timeout in milliseconds (0 = wait forever)
    #[arg(long)]
    reply_timeout_ms: Option<u64>,

    /// Controller idle timeout in milliseconds (0 = wait forever)
    #[arg(long)]
    inbound_timeout_ms: Option<u64>,

    /// Skip the roll call before stage 1
    #[arg(long)]
    no_roll_call: bool,

    /// Do not print the run trace
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let mut cfg = Config {
            cohort_size: self.n as usize,
            roll_call: !self.no_roll_call,
            ..Config::default()
        };
        if let Some(weights) = &self.weights {
            cfg.stage_weights = weights.clone();
        }
        if let Some(think) = &self.think_ms {
            cfg.think_ms = think.clone();
        }
        if let Some(ms) = self.reply_timeout_ms {
            cfg.reply_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.inbound_timeout_ms {
            cfg.inbound_timeout = Duration::from_millis(ms);
        }
        cfg
    }
}

/// Parses `MIN..MAX` (inclusive) or a single value.
fn parse_range(s: &str) -> Result<RangeInclusive<u32>, String> {
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid bound {v:?}: {e}"))
    };
    let (lo, hi) = match s.split_once("..") {
        Some((lo, hi)) => (parse(lo)?, parse(hi.trim_start_matches('='))?),
        None => {
            let v = parse(s)?;
            (v, v)
        }
    };
    if lo > hi {
        return Err(format!("empty range {lo}..{hi}"));
    }
    Ok(lo..=hi)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = cli.config();
    cfg.validate().context("invalid configuration")?;

    let entropy: Arc<dyn Entropy> = match cli.seed {
        Some(seed) => Arc::new(SeededEntropy::new(seed)),
        None => Arc::new(OsEntropy),
    };
    let mut subs: Vec<Arc<dyn Subscribe>> = Vec::new();
    if !cli.quiet {
        subs.push(Arc::new(LogWriter::new()));
    }

    let stages = cfg.stages();
    let report = Coordinator::builder(cfg)
        .with_subscribers(subs)
        .with_entropy(entropy)
        .build()
        .run()
        .await
        .with_context(|| format!("run of {} workers failed", cli.n))?;

    println!(
        "all {} workers passed {} stages: {} verdicts, {} retries, {} discarded",
        report.workers.len(),
        stages,
        report.controller.total_verdicts(),
        report.controller.total_retries(),
        report.controller.discarded,
    );
    Ok(())
}
