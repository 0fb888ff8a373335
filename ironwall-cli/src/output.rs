//! Output formatting for text vs JSON rendering
//!
//! Command handlers build a serializable report and hand it to
//! [`OutputWriter`]; engine types that appear in several reports
//! (stats, throughput) carry their own [`Render`] impls here.

use std::io::Write;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use ironwall_filter_engine::{DropReason, ProtocolClass, StatsSnapshot, TrafficMeter, Verdict};
use ironwall_filter_engine::stats::ProtoRates;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Writes CLI output in the selected format.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render a report to stdout.
    pub fn render<T: Render + Serialize>(&self, report: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(report, &mut handle)
    }

    /// Render a report to an arbitrary writer. JSON output is pretty-printed
    /// and newline-terminated.
    pub fn render_to<T: Render + Serialize>(
        &self,
        report: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => report.render_text(w)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, report)?;
                writeln!(w)?;
            }
        }
        Ok(())
    }
}

/// Human-readable rendering, implemented next to `serde::Serialize` by
/// every report.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Verdict label in its display colour.
pub fn colored_verdict(verdict: Verdict) -> ColoredString {
    let label = verdict.as_str();
    match verdict {
        Verdict::Allow => label.green(),
        Verdict::Drop => label.red(),
        Verdict::RateLimit => label.yellow(),
    }
}

impl Render for StatsSnapshot {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "{}", "Verdicts".bold())?;
        writeln!(w, "  Total:        {}", self.total)?;
        writeln!(w, "  Allowed:      {}", self.allowed.to_string().green())?;
        writeln!(w, "  Dropped:      {}", self.dropped.to_string().red())?;
        writeln!(w, "  Rate limited: {}", self.rate_limited.to_string().yellow())?;
        writeln!(w, "  Bytes:        {}", self.bytes_processed)?;

        if self.dropped > 0 {
            writeln!(w)?;
            writeln!(w, "{}", "Drop reasons".bold())?;
            for reason in DropReason::ALL {
                let count = self.drops_by_reason.get(reason);
                if count > 0 {
                    writeln!(w, "  {:<22} {}", reason.as_str(), count)?;
                }
            }
        }

        Ok(())
    }
}

impl Render for TrafficMeter {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let header = format!(
            "{:<8} {:>10} {:>12} {:>8} {:>12} {:>14}",
            "Protocol", "Packets", "Bytes", "Drops", "pps", "bps"
        );
        writeln!(w, "{}", header.bold())?;

        let rows: [(&str, &ProtoRates); 6] = [
            (ProtocolClass::Tcp.as_str(), &self.tcp),
            (ProtocolClass::Udp.as_str(), &self.udp),
            (ProtocolClass::Icmp.as_str(), &self.icmp),
            (ProtocolClass::Other.as_str(), &self.other),
            (ProtocolClass::NonIp.as_str(), &self.non_ip),
            ("total", &self.total),
        ];
        for (name, r) in rows {
            writeln!(
                w,
                "{:<8} {:>10} {:>12} {:>8} {:>12.1} {:>14.1}",
                name, r.packets, r.bytes, r.drops, r.pps, r.bps
            )?;
        }
        writeln!(w, "Drops/s: {:.1}", self.drops_per_second)?;

        Ok(())
    }
}
