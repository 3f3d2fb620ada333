use colored::*;

use frontscan_common::network::token::RangeToken;
use frontscan_common::{success, warn};

use crate::mprint;
use crate::terminal::{colors, print};

pub fn expand(tokens: &[String], q: u8) -> anyhow::Result<()> {
    let mut total: usize = 0;
    let mut parsed: usize = 0;

    for (idx, raw) in tokens.iter().enumerate() {
        let token: RangeToken = match raw.trim().parse() {
            Ok(token) => token,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        parsed += 1;

        let addrs = token.expand();
        total += addrs.len();

        if q < 2 {
            print::tree_head(idx, &format!("{raw} ({} addresses)", addrs.len()));
            for addr in &addrs {
                print::print(&format!("    {}", addr.to_string().color(colors::TEXT_DEFAULT)));
            }
            if idx + 1 != tokens.len() {
                mprint!();
            }
        }
    }

    if parsed == 0 {
        anyhow::bail!("None of the {} tokens could be parsed", tokens.len());
    }
    success!("{total} addresses from {parsed} tokens");
    Ok(())
}
