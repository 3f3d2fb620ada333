use anyhow::Context;

use frontscan_common::success;
use frontscan_core::export::{self, ExportOptions, ExportSummary};

use crate::commands::Session;
use crate::terminal::{format, print};

pub async fn export(session: &Session) -> anyhow::Result<()> {
    let q: u8 = session.cfg.quiet;
    let opts = ExportOptions::from_config(&session.scan);

    let summary: ExportSummary = export::export(&session.store, &session.dir, &opts)
        .await
        .context("Export failed")?;

    if let (Some(file), Some(field)) = (&session.scan.splice_file, &session.scan.splice_field) {
        export::splice_json_array(file, field, &summary.quoted_list)
            .await
            .with_context(|| format!("Could not update {}", file.display()))?;
        success!("Updated '{field}' in {}", file.display());
    }

    if summary.total() == 0 {
        print::no_results("addresses exported");
        return Ok(());
    }

    if q == 0 {
        print::header("export", q);
        print::as_tree_one_level(format::export_details(&summary, opts.max_delay));
    }
    Ok(())
}
