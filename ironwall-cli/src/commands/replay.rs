//! `ironwall replay` command handler
//!
//! Reads a text capture of frames, runs them through a freshly built
//! [`FilterEngine`] in file order and reports the verdicts, counters and
//! per-protocol throughput.
//!
//! # Input format
//!
//! ```text
//! # comment
//! 0.000000000 00112233445566778899aabb0800450000...
//! 0.000250 00:11:22:33:44:55:66:77:88:99:aa:bb:08:00:45:00...
//! 0011223344556677...
//! ```
//!
//! A line is `[<seconds>] <hex>`. Colons inside the hex are ignored. A line
//! without an arrival time arrives `--gap-us` after the previous one (the
//! first one at 0).

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use ironwall_core::error::{IronwallError, ParseError};
use ironwall_filter_engine::{
    DropReason, EvictionReport, FilterConfig, FilterEngine, ProtocolClass, StatsSnapshot,
    Timestamp, TrafficMeter, Verdict,
};

use crate::cli::ReplayArgs;
use crate::commands::config::load_or_default;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, colored_verdict};

/// Maximum capture file size (256 MiB).
pub const MAX_REPLAY_FILE_SIZE: usize = 256 * 1024 * 1024;

/// One decoded input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFrame {
    /// 1-based line number in the input file
    pub line: usize,
    pub arrival: Timestamp,
    pub bytes: Vec<u8>,
}

/// Execute the `replay` command.
pub async fn execute(
    args: ReplayArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = load_or_default(config_path).await?;

    let mut section = config.engine.clone();
    if let Some(ref policy) = args.policy {
        section.policy_path = policy.display().to_string();
    }
    let filter = FilterConfig::resolve(&section).await?;
    let engine = FilterEngine::builder().config(filter).build()?;

    let content = read_capture(&args.file).await?;
    let frames = parse_frames(&content, Duration::from_micros(args.gap_us))
        .map_err(IronwallError::from)?;
    info!(
        file = %args.file.display(),
        frames = frames.len(),
        "replaying capture"
    );

    let sweep = (args.sweep_secs > 0).then(|| Duration::from_secs(args.sweep_secs));
    let report = run_replay(
        &engine,
        &frames,
        sweep,
        args.verbose,
        args.file.display().to_string(),
    );

    engine.publish_metrics();
    report.meter.publish();

    writer.render(&report)?;
    Ok(())
}

async fn read_capture(path: &Path) -> Result<String, CliError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        CliError::Replay(format!("cannot open {}: {}", path.display(), e))
    })?;
    let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
    if size > MAX_REPLAY_FILE_SIZE {
        return Err(IronwallError::Parse(ParseError::TooLarge {
            size,
            max: MAX_REPLAY_FILE_SIZE,
        })
        .into());
    }
    Ok(tokio::fs::read_to_string(path).await?)
}

/// Decode a capture into frames with arrival times.
///
/// Blank lines and `#` comments are skipped.
pub fn parse_frames(content: &str, gap: Duration) -> Result<Vec<ReplayFrame>, ParseError> {
    let mut frames = Vec::new();
    let mut prev: Option<Timestamp> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let (arrival, hex_text) = match tokens.as_slice() {
            [hex_text] => (
                prev.map_or(Timestamp::ZERO, |p| p.saturating_add(gap)),
                *hex_text,
            ),
            [time, hex_text] => {
                let arrival = parse_arrival(time).ok_or_else(|| ParseError::Failed {
                    line,
                    reason: format!("invalid arrival time '{time}'"),
                })?;
                (arrival, *hex_text)
            }
            _ => {
                return Err(ParseError::Failed {
                    line,
                    reason: "expected '[<seconds>] <hex>'".to_owned(),
                });
            }
        };

        let digits: String = hex_text.chars().filter(|c| *c != ':').collect();
        if digits.is_empty() {
            return Err(ParseError::Failed {
                line,
                reason: "empty frame".to_owned(),
            });
        }
        let bytes = hex::decode(&digits).map_err(|e| ParseError::Failed {
            line,
            reason: format!("invalid hex: {e}"),
        })?;

        prev = Some(arrival);
        frames.push(ReplayFrame {
            line,
            arrival,
            bytes,
        });
    }

    Ok(frames)
}

/// Parse an arrival time in seconds: `12`, `12.5`, `12.000250000`.
fn parse_arrival(text: &str) -> Option<Timestamp> {
    let (secs, frac) = text.split_once('.').unwrap_or((text, ""));
    if secs.is_empty() || frac.len() > 9 {
        return None;
    }
    if !secs.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let secs: u64 = secs.parse().ok()?;
    let nanos: u64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<9}").parse().ok()?
    };
    Some(Timestamp::from_secs(secs).saturating_add(Duration::from_nanos(nanos)))
}

/// Feed frames through the engine in order.
///
/// With `sweep` set, `evict_idle` runs whenever that much replay time has
/// passed since the previous sweep.
pub fn run_replay(
    engine: &FilterEngine,
    frames: &[ReplayFrame],
    sweep: Option<Duration>,
    verbose: bool,
    source: String,
) -> ReplayReport {
    let first = frames.first().map_or(Timestamp::ZERO, |f| f.arrival);
    let last = frames.last().map_or(Timestamp::ZERO, |f| f.arrival);

    let mut meter = TrafficMeter::new();
    meter.update(&StatsSnapshot::default(), first);

    let mut evictions = EvictionReport::default();
    let mut sweeps = 0usize;
    let mut last_sweep = first;
    let mut verdicts = Vec::new();

    for frame in frames {
        let due = sweep.is_some_and(|interval| {
            frame.arrival.saturating_since(last_sweep) >= interval
        });
        if due {
            let removed = engine.evict_idle(frame.arrival);
            evictions.connections += removed.connections;
            evictions.rate_entries += removed.rate_entries;
            evictions.syn_entries += removed.syn_entries;
            sweeps += 1;
            last_sweep = frame.arrival;
        }

        let decision = engine.classify_detailed(&frame.bytes, frame.arrival);
        if verbose {
            verdicts.push(FrameVerdict {
                line: frame.line,
                arrival: frame.arrival,
                len: frame.bytes.len(),
                verdict: decision.verdict,
                reason: decision.reason,
                protocol: decision.protocol,
                flow: decision.flow.map(|f| f.to_string()),
            });
        }
    }

    let stats = engine.get_stats();
    meter.update(&stats, last);
    debug!(frames = frames.len(), sweeps, "replay finished");

    ReplayReport {
        source,
        frames: frames.len(),
        first_arrival: first,
        last_arrival: last,
        sweeps,
        evictions,
        stats,
        meter,
        verdicts,
    }
}

/// Verdict of a single replayed frame (`--verbose`).
#[derive(Debug, Serialize)]
pub struct FrameVerdict {
    pub line: usize,
    pub arrival: Timestamp,
    pub len: usize,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DropReason>,
    pub protocol: ProtocolClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
}

/// Replay result.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    /// Capture file path
    pub source: String,
    pub frames: usize,
    pub first_arrival: Timestamp,
    pub last_arrival: Timestamp,
    /// Number of idle sweeps run during the replay
    pub sweeps: usize,
    pub evictions: EvictionReport,
    pub stats: StatsSnapshot,
    pub meter: TrafficMeter,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub verdicts: Vec<FrameVerdict>,
}

impl Render for ReplayReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Replay: {}", self.source.bold())?;
        writeln!(
            w,
            "  Frames: {} ({}s .. {}s)",
            self.frames, self.first_arrival, self.last_arrival
        )?;

        if !self.verdicts.is_empty() {
            writeln!(w)?;
            for v in &self.verdicts {
                write!(
                    w,
                    "  {:>6}  {}s  {:<10} {:<6} {:>5}B",
                    v.line,
                    v.arrival,
                    colored_verdict(v.verdict),
                    v.protocol.as_str(),
                    v.len
                )?;
                if let Some(reason) = v.reason {
                    write!(w, "  {}", reason.as_str())?;
                }
                if let Some(ref flow) = v.flow {
                    write!(w, "  {}", flow.dimmed())?;
                }
                writeln!(w)?;
            }
        }

        writeln!(w)?;
        self.stats.render_text(w)?;
        writeln!(w)?;
        self.meter.render_text(w)?;

        if self.sweeps > 0 {
            writeln!(w)?;
            writeln!(
                w,
                "Idle sweeps: {} (evicted {} connections, {} rate entries, {} SYN entries)",
                self.sweeps,
                self.evictions.connections,
                self.evictions.rate_entries,
                self.evictions.syn_entries
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironwall_filter_engine::builder::FrameBuilder;
    use ironwall_filter_engine::wire::{TCP_ACK, TCP_SYN};

    fn engine() -> FilterEngine {
        FilterEngine::builder()
            .config(FilterConfig::default())
            .build()
            .expect("default config should build")
    }

    fn frame(line: usize, arrival: Timestamp, bytes: Vec<u8>) -> ReplayFrame {
        ReplayFrame {
            line,
            arrival,
            bytes,
        }
    }

    #[test]
    fn test_parse_arrival() {
        assert_eq!(parse_arrival("12"), Some(Timestamp::from_secs(12)));
        assert_eq!(parse_arrival("1.5"), Some(Timestamp::from_millis(1_500)));
        assert_eq!(
            parse_arrival("0.000000001"),
            Some(Timestamp::from_nanos(1))
        );
        assert_eq!(parse_arrival("0.0000000001"), None);
        assert_eq!(parse_arrival(".5"), None);
        assert_eq!(parse_arrival("1.-5"), None);
        assert_eq!(parse_arrival("abc"), None);
    }

    #[test]
    fn test_parse_frames_skips_comments_and_blank_lines() {
        let content = "# capture\n\n  0.5 0a0b\n# tail\n";
        let frames = parse_frames(content, Duration::from_millis(1)).expect("should parse");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].line, 3);
        assert_eq!(frames[0].arrival, Timestamp::from_millis(500));
        assert_eq!(frames[0].bytes, vec![0x0a, 0x0b]);
    }

    #[test]
    fn test_parse_frames_gap_and_colons() {
        let content = "aa:bb\ncc\n2 dd\nee\n";
        let frames = parse_frames(content, Duration::from_micros(250)).expect("should parse");
        let arrivals: Vec<u64> = frames.iter().map(|f| f.arrival.as_nanos()).collect();
        assert_eq!(arrivals, vec![0, 250_000, 2_000_000_000, 2_000_250_000]);
        assert_eq!(frames[0].bytes, vec![0xaa, 0xbb]);
    }

    #[test]
    fn test_parse_frames_reports_line_of_bad_hex() {
        let err = parse_frames("00\n0.1 0g\n", Duration::ZERO).expect_err("bad hex");
        match err {
            ParseError::Failed { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("invalid hex"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_frames_rejects_extra_tokens_and_bad_time() {
        assert!(matches!(
            parse_frames("1 aa bb\n", Duration::ZERO),
            Err(ParseError::Failed { line: 1, .. })
        ));
        assert!(matches!(
            parse_frames("x1 aa\n", Duration::ZERO),
            Err(ParseError::Failed { line: 1, .. })
        ));
        assert!(matches!(
            parse_frames("1 :::\n", Duration::ZERO),
            Err(ParseError::Failed { line: 1, .. })
        ));
    }

    #[test]
    fn test_run_replay_counts_and_verbose_verdicts() {
        let engine = engine();
        let frames = vec![
            frame(
                1,
                Timestamp::ZERO,
                FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2])
                    .tcp_flags(TCP_SYN)
                    .build(),
            ),
            frame(2, Timestamp::from_millis(1), vec![0u8; 10]),
            frame(
                3,
                Timestamp::from_millis(2),
                FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2])
                    .tcp_flags(TCP_ACK)
                    .build(),
            ),
        ];

        let report = run_replay(&engine, &frames, None, true, "test".to_owned());
        assert_eq!(report.frames, 3);
        assert_eq!(report.stats.total, 3);
        assert_eq!(report.stats.allowed, 2);
        assert_eq!(report.stats.malformed, 1);
        assert_eq!(report.verdicts.len(), 3);
        assert_eq!(report.verdicts[1].verdict, Verdict::Drop);
        assert_eq!(report.verdicts[1].reason, Some(DropReason::Malformed));
        assert!(report.verdicts[0].flow.is_some());
        assert_eq!(report.meter.total.packets, 3);
        assert_eq!(report.sweeps, 0);
    }

    #[test]
    fn test_run_replay_sweeps_idle_connections() {
        let engine = engine();
        let frames = vec![
            frame(
                1,
                Timestamp::ZERO,
                FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2])
                    .tcp_flags(TCP_SYN)
                    .build(),
            ),
            frame(
                2,
                Timestamp::from_secs(400),
                FrameBuilder::udp([10, 0, 0, 9], [10, 0, 0, 2]).build(),
            ),
        ];

        let report = run_replay(
            &engine,
            &frames,
            Some(Duration::from_secs(10)),
            false,
            "test".to_owned(),
        );
        assert_eq!(report.sweeps, 1);
        assert_eq!(report.evictions.connections, 1);
        assert!(report.verdicts.is_empty());
        assert_eq!(engine.connection_count(), 1);
    }

    #[test]
    fn test_run_replay_empty_capture() {
        let report = run_replay(&engine(), &[], Some(Duration::from_secs(1)), true, "empty".to_owned());
        assert_eq!(report.frames, 0);
        assert_eq!(report.stats, StatsSnapshot::default());
        assert_eq!(report.meter.total.pps, 0.0);
    }

    #[test]
    fn test_replay_report_render_text() {
        let engine = engine();
        let frames = vec![frame(1, Timestamp::ZERO, vec![0u8; 4])];
        let report = run_replay(&engine, &frames, None, true, "capture.txt".to_owned());

        let mut buffer = Vec::new();
        report
            .render_text(&mut buffer)
            .expect("text rendering should succeed");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("capture.txt"));
        assert!(output.contains("Drop reasons"));
        assert!(output.contains("malformed"));
        assert!(output.contains("non_ip"));
    }

    #[test]
    fn test_replay_report_json_omits_empty_verdicts() {
        let report = run_replay(&engine(), &[], None, false, "x".to_owned());
        let json = serde_json::to_value(&report).expect("JSON serialization should succeed");
        assert!(json.get("verdicts").is_none());
        assert_eq!(json["stats"]["total"].as_u64(), Some(0));
        assert!(json["meter"]["tcp"].is_object());
    }
}
