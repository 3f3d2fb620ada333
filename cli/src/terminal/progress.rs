use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use colored::*;
use indicatif::ProgressStyle;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::terminal::colors;

const TICKS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
    "▁▁▁▁▁",
];

/// Default style for any span that asks for a bar.
pub fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn counted_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {msg} {wide_bar:.green/black} {pos}/{len} {elapsed}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_strings(TICKS)
        .progress_chars("━╸ ")
}

/// Progress of one phase, shown on the span it was built from.
#[derive(Clone)]
pub struct PhaseProgress {
    span: Span,
    hits: Arc<AtomicUsize>,
    label: &'static str,
}

impl PhaseProgress {
    pub fn new(span: Span, total: usize, label: &'static str) -> Self {
        span.pb_set_style(&counted_style());
        span.pb_set_length(total as u64);
        span.pb_set_message(&format!("0 {label}"));
        span.pb_start();
        Self {
            span,
            hits: Arc::new(AtomicUsize::new(0)),
            label,
        }
    }

    /// One item done; `hit` counts it towards the message.
    pub fn advance(&self, hit: bool) {
        if hit {
            let hits: usize = self.hits.fetch_add(1, Ordering::Relaxed) + 1;
            let msg = format!("{} {}", hits.to_string().green().bold(), self.label)
                .color(colors::TEXT_DEFAULT)
                .to_string();
            self.span.pb_set_message(&msg);
        }
        self.span.pb_inc(1);
    }
}
