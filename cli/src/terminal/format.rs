use std::time::Duration;

use colored::*;

use frontscan_core::bandwidth::BandwidthSummary;
use frontscan_core::export::ExportSummary;
use frontscan_core::scanner::ScanSummary;

use crate::terminal::colors;

pub type Detail = (String, ColoredString);

pub fn elapsed(d: Duration) -> ColoredString {
    format!("{:.2}s", d.as_secs_f64()).bold().yellow()
}

fn count(n: usize, color: Color) -> ColoredString {
    n.to_string().color(color).bold()
}

pub fn scan_details(summary: &ScanSummary) -> Vec<Detail> {
    let mut details: Vec<Detail> = vec![
        ("Queued".into(), count(summary.queued, colors::TEXT_DEFAULT)),
        ("Probed".into(), count(summary.probed, colors::TEXT_DEFAULT)),
        (
            "Success".into(),
            format!(
                "{} (gws: {}, gvs: {})",
                count(summary.success, colors::PRIMARY),
                count(summary.gws, colors::GWS),
                count(summary.gvs, colors::GVS)
            )
            .normal(),
        ),
        ("Rejected".into(), count(summary.rejected, colors::REJECTED)),
        ("Failed".into(), count(summary.failed, colors::FAILED)),
    ];
    if summary.dropped > 0 {
        details.push(("Dropped".into(), count(summary.dropped, colors::SEPARATOR)));
    }
    details.push(("Time".into(), elapsed(summary.elapsed)));
    details
}

pub fn bandwidth_details(summary: &BandwidthSummary) -> Vec<Detail> {
    vec![
        ("Measured".into(), count(summary.measured, colors::PRIMARY)),
        ("Failed".into(), count(summary.unmeasured, colors::FAILED)),
        ("Skipped".into(), count(summary.skipped, colors::GVS)),
        ("Time".into(), elapsed(summary.elapsed)),
    ]
}

pub fn export_details(summary: &ExportSummary, max_delay: u64) -> Vec<Detail> {
    vec![
        ("Delay".into(), format!("≤ {max_delay}ms").normal()),
        ("gws".into(), count(summary.gws, colors::GWS)),
        ("gvs".into(), count(summary.gvs, colors::GVS)),
        ("Total".into(), count(summary.total(), colors::PRIMARY)),
    ]
}
