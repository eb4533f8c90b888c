use std::io::BufReader;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use cire_api::EngineConfig;
use cire_core::{extract_opaque_id, name_key, normalize, score, CandidateList};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

mod replay;

#[derive(Parser, Debug)]
#[command(name = "cirectl", version, about = "Cire CLI: collaborator identity resolution tools")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON-lines event log ("-" for stdin) and print resolutions
    Replay {
        path: String,
        /// Pending request lifetime in milliseconds
        #[arg(long = "request-ttl-ms", env = "CIRE_REQUEST_TTL_MS")]
        request_ttl_ms: Option<u64>,
        /// Trigger lifetime in milliseconds
        #[arg(long = "trigger-ttl-ms", env = "CIRE_TRIGGER_TTL_MS")]
        trigger_ttl_ms: Option<u64>,
        /// Pending registry capacity
        #[arg(long = "max-pending", env = "CIRE_MAX_PENDING")]
        max_pending: Option<usize>,
    },
    /// Show how raw handle strings normalize
    Normalize {
        raw: Vec<String>,
    },
    /// Score a JSON collaborator list, e.g. '[{"name":"A","handle":"@a"}]'
    Score {
        list: String,
    },
}

fn init_tracing() {
    let env = std::env::var("CIRE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CIRE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CIRE_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { path, request_ttl_ms, trigger_ttl_ms, max_pending } => {
            let mut cfg = EngineConfig::from_env();
            if let Some(ms) = request_ttl_ms { cfg.request_ttl = Duration::from_millis(ms); }
            if let Some(ms) = trigger_ttl_ms { cfg.trigger_ttl = Duration::from_millis(ms); }
            if let Some(n) = max_pending.filter(|n| *n > 0) { cfg.max_pending = n; }
            info!(path = %path, ?cfg, "replay invoked");

            let report = if path == "-" {
                replay::run(std::io::stdin().lock(), cfg)?
            } else {
                let f = std::fs::File::open(&path).with_context(|| format!("opening {}", path))?;
                replay::run(BufReader::new(f), cfg)?
            };

            match cli.output {
                Output::Human => {
                    for r in report.resolutions.iter() {
                        let people: Vec<String> = r
                            .collaborators
                            .iter()
                            .map(|c| match (c.name(), c.handle()) {
                                (Some(n), Some(h)) => format!("{} ({})", n, h),
                                (Some(n), None) => n.to_string(),
                                (None, Some(h)) => h.to_string(),
                                (None, None) => c.id().unwrap_or("-").to_string(),
                            })
                            .collect();
                        let entries: Vec<&str> = r.entries.iter().map(|k| k.as_str()).collect();
                        println!("{} • {} • score {} • {}", r.subject_id, people.join(", "), r.quality_score, entries.join(" "));
                    }
                    let s = &report.stats;
                    println!(
                        "lines {} (skipped {}) • resolved {} • unmatched {} • downgrades {} • cache hits {} • expired {} • evicted {} • pending {}",
                        report.lines, report.skipped, s.resolved, s.unmatched, s.downgrades_rejected, s.cache_hits, s.expired, s.evicted, s.pending
                    );
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
        }
        Commands::Normalize { raw } => {
            let rows: Vec<serde_json::Value> = raw
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "raw": r,
                        "handle": normalize(r).map(|h| h.to_string()),
                        "opaque_id": extract_opaque_id(r),
                        "name_key": name_key(r),
                    })
                })
                .collect();
            match cli.output {
                Output::Human => {
                    for row in rows.iter() {
                        let col = |k: &str| row[k].as_str().unwrap_or("-").to_string();
                        println!("{:<40} handle={} id={} name={}", col("raw"), col("handle"), col("opaque_id"), col("name_key"));
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
        Commands::Score { list } => {
            let parsed: CandidateList = serde_json::from_str(&list).context("parsing collaborator list")?;
            let clean = parsed.sanitized();
            match cli.output {
                Output::Human => println!("score {} ({} entries, {} after sanitizing)", score(&clean), parsed.len(), clean.len()),
                Output::Json => println!("{}", serde_json::json!({ "score": score(&clean), "entries": parsed.len(), "sanitized": clean.len() })),
            }
        }
    }
    Ok(())
}
