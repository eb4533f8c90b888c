//! Replay a JSON-lines event log through a fresh engine on a manual clock.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cire_api::{CollabEngine, EngineConfig, EngineEvent, EngineStats, ResolutionResult};
use cire_core::ManualClock;
use tracing::warn;

/// Outcome of a replay: every resolution in emission order plus final counters.
#[derive(Debug, serde::Serialize)]
pub struct ReplayReport {
    pub lines: usize,
    pub skipped: usize,
    pub resolutions: Vec<ResolutionResult>,
    pub stats: EngineStats,
}

/// Split an optional `at_ms` offset (milliseconds since replay start) off a line.
fn parse_step(line: &str) -> Result<(Option<u64>, EngineEvent)> {
    let mut v: serde_json::Value = serde_json::from_str(line).context("parsing event line as JSON")?;
    let at_ms = v.as_object_mut().and_then(|o| o.remove("at_ms")).and_then(|t| t.as_u64());
    let ev = EngineEvent::from_json_line(&v.to_string())?;
    Ok((at_ms, ev))
}

pub fn run<R: BufRead>(input: R, cfg: EngineConfig) -> Result<ReplayReport> {
    let clock = Arc::new(ManualClock::new());
    let mut engine = CollabEngine::with_clock(cfg, clock.clone());
    let mut offset_ms = 0u64;
    let mut report = ReplayReport { lines: 0, skipped: 0, resolutions: Vec::new(), stats: EngineStats::default() };

    for (n, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", n + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') { continue; }
        report.lines += 1;
        metrics::counter!("cire_replay_lines_total", 1u64);
        let (at_ms, ev) = match parse_step(trimmed) {
            Ok(step) => step,
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping malformed event");
                report.skipped += 1;
                continue;
            }
        };
        if let Some(at) = at_ms {
            if at > offset_ms {
                clock.advance(Duration::from_millis(at - offset_ms));
                offset_ms = at;
            }
        }
        if let Some(res) = engine.apply(ev) {
            report.resolutions.push(res);
        }
    }
    report.stats = engine.stats();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = r#"
# two cards share a collaborator name; the user opens the second one
{"type":"partial","key":"card1","subject_id":"v1","candidates":[{"name":"Sam"}],"expected_count":2}
{"type":"partial","key":"card2","subject_id":"v2","candidates":[{"name":"Sam"}],"expected_count":3,"at_ms":100}
{"type":"trigger","key":"card1","at_ms":200}
not json
{"type":"detailed","candidates":[{"name":"Sam","handle":"@sam"},{"name":"Kim","handle":"@kim"}],"at_ms":300}
{"type":"detailed","candidates":[{"name":"Sam","handle":"@sam"},{"name":"Lee"},{"name":"Ray"}],"at_ms":400}
"#;

    #[test]
    fn replays_log_and_skips_garbage() {
        let report = run(LOG.as_bytes(), EngineConfig::default()).unwrap();
        assert_eq!(report.lines, 6);
        assert_eq!(report.skipped, 1);
        let subjects: Vec<&str> = report.resolutions.iter().map(|r| r.subject_id.as_str()).collect();
        assert_eq!(subjects, vec!["v1", "v2"]);
        assert_eq!(report.stats.pending, 0);
    }

    #[test]
    fn at_ms_drives_expiry() {
        let log = r#"{"type":"partial","key":"card1","candidates":[{"name":"Sam"}],"expected_count":2}
{"type":"detailed","candidates":[{"name":"Sam"},{"name":"Kim"}],"at_ms":6000}"#;
        let report = run(log.as_bytes(), EngineConfig::default()).unwrap();
        assert!(report.resolutions.is_empty());
        assert_eq!(report.stats.expired, 1);
        assert_eq!(report.stats.unmatched, 1);
    }
}
