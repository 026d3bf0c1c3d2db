//! Log-based report sink adapter.
//!
//! Implements [`ReportSink`] by writing each monitor report to the ESP-IDF
//! logger (UART in production).  Agreed values use the `T:` line the
//! bench tooling greps for.

use log::info;

use crate::app::events::Report;
use crate::app::ports::ReportSink;

/// Adapter that logs every [`Report`] to the serial console.
#[derive(Debug, Default)]
pub struct LogReportSink;

impl LogReportSink {
    pub fn new() -> Self {
        Self
    }
}

/// Render one report as a console line.
pub fn format_report(report: &Report) -> String {
    match report {
        Report::RawTriplet { celsius, raw } => format!(
            "RAW | s1={:.3} s2={:.3} s3={:.3} | lsb={}/{}/{}",
            celsius[0], celsius[1], celsius[2], raw[0], raw[1], raw[2]
        ),
        Report::Agreed {
            mean,
            mean_raw,
            raw: Some(raw),
        } => format!(
            "T:{:.5} | mean_raw={:#06x} | lsb={}/{}/{}",
            mean, mean_raw, raw[0], raw[1], raw[2]
        ),
        Report::Agreed {
            mean,
            mean_raw,
            raw: None,
        } => format!("T:{:.5} | mean_raw={:#06x}", mean, mean_raw),
    }
}

impl ReportSink for LogReportSink {
    fn report(&mut self, report: &Report) {
        info!("{}", format_report(report));
    }
}
