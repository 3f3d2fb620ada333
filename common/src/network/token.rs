//! # Address Range Tokens
//!
//! One line of the range file. Supported notations:
//! * **Host**: a single IPv4/IPv6 address (e.g. `142.250.4.1`).
//! * **CIDR**: `Network/Prefix` (e.g. `142.250.4.0/24`), network and broadcast excluded.
//! * **Span**: `Start-End` (e.g. `142.250.4.1-142.250.5.20`).
//! * **Block**: a trailing dot stands for every value of the missing octets,
//!   either alone (`142.250.`) or on one side of a span (`142.250.4.-142.251.`).

use std::collections::HashSet;
use std::net::{AddrParseError, IpAddr, Ipv4Addr};
use std::str::FromStr;

use pnet::ipnetwork::IpNetworkError;
use thiserror::Error;

use crate::network::range::{self, IpCollection, Ipv4Range};
use crate::{success, warn};

#[derive(Debug, Error)]
pub enum RangeError {
    #[error("invalid address '{addr}' in '{token}': {source}")]
    InvalidAddress {
        token: String,
        addr: String,
        source: AddrParseError,
    },
    #[error("invalid prefix '{prefix}' in '{token}'")]
    InvalidPrefix { token: String, prefix: String },
    #[error("invalid network '{token}': {source}")]
    InvalidNetwork {
        token: String,
        source: IpNetworkError,
    },
}

/// A parsed range token, ready to be expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeToken {
    /// Exactly one address, probed as written.
    Single(IpAddr),
    /// Usable hosts of a CIDR block.
    Cidr(Ipv4Range),
    /// Inclusive span, possibly derived from trailing-dot blocks.
    Span(Ipv4Range),
}

impl RangeToken {
    /// Every address the token denotes, in ascending numeric order.
    pub fn expand(&self) -> Vec<IpAddr> {
        match self {
            RangeToken::Single(addr) => vec![*addr],
            RangeToken::Cidr(range) | RangeToken::Span(range) => range.to_iter().collect(),
        }
    }

    /// Adds the token to `collection` without expanding it.
    pub fn add_to(&self, collection: &mut IpCollection) -> usize {
        match self {
            RangeToken::Single(addr) => usize::from(collection.add_single(*addr)),
            RangeToken::Cidr(range) | RangeToken::Span(range) => collection.add_range(*range),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RangeToken::Single(_) => 1,
            RangeToken::Cidr(range) | RangeToken::Span(range) => range.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromStr for RangeToken {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some((ip_str, prefix_str)) = s.split_once('/') {
            return parse_cidr(s, ip_str, prefix_str);
        }

        if let Some((start_str, end_str)) = s.split_once('-') {
            let start = parse_v4(s, &pad_block(start_str, "0"))?;
            let end = parse_v4(s, &pad_block(end_str, "255"))?;
            return Ok(RangeToken::Span(Ipv4Range::new(start, end)));
        }

        if s.ends_with('.') {
            let start = parse_v4(s, &pad_block(s, "0"))?;
            let end = parse_v4(s, &pad_block(s, "255"))?;
            return Ok(RangeToken::Span(Ipv4Range::new(start, end)));
        }

        s.parse::<IpAddr>()
            .map(RangeToken::Single)
            .map_err(|source| RangeError::InvalidAddress {
                token: s.to_string(),
                addr: s.to_string(),
                source,
            })
    }
}

/// Completes a trailing-dot block with `fill` for every missing octet.
///
/// `"10."` becomes `"10.0.0.0"` with a fill of `"0"`. Anything without a
/// trailing dot, or with more than three dots, is returned untouched.
fn pad_block(addr: &str, fill: &str) -> String {
    let addr = addr.trim();
    if !addr.ends_with('.') {
        return addr.to_string();
    }

    let missing: usize = match addr.matches('.').count() {
        1 => 3,
        2 => 2,
        3 => 1,
        _ => return addr.to_string(),
    };

    let mut padded = addr.to_string();
    padded.push_str(&vec![fill; missing].join("."));
    padded
}

fn parse_v4(token: &str, addr: &str) -> Result<Ipv4Addr, RangeError> {
    addr.parse::<Ipv4Addr>()
        .map_err(|source| RangeError::InvalidAddress {
            token: token.to_string(),
            addr: addr.to_string(),
            source,
        })
}

fn parse_cidr(token: &str, ip_str: &str, prefix_str: &str) -> Result<RangeToken, RangeError> {
    let ipv4_addr = parse_v4(token, ip_str.trim())?;

    let prefix = prefix_str
        .trim()
        .parse::<u8>()
        .map_err(|_| RangeError::InvalidPrefix {
            token: token.to_string(),
            prefix: prefix_str.to_string(),
        })?;

    let ipv4_range = range::cidr_range(ipv4_addr, prefix).map_err(|source| {
        RangeError::InvalidNetwork {
            token: token.to_string(),
            source,
        }
    })?;

    Ok(RangeToken::Cidr(ipv4_range))
}

/// Meaningful lines of a range file, de-duplicated, in file order.
///
/// Blank lines and `#` comments are skipped; `\r` line endings are tolerated.
pub fn token_lines(content: &str) -> Vec<&str> {
    let mut seen: HashSet<&str> = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(*line))
        .collect()
}

/// Parses and expands a whole range file into `collection`.
///
/// Invalid tokens are reported and skipped; returns the number of tokens used.
pub fn extend_collection(content: &str, collection: &mut IpCollection) -> usize {
    let mut used: usize = 0;
    for line in token_lines(content) {
        match line.parse::<RangeToken>() {
            Ok(token) => {
                token.add_to(collection);
                used += 1;
            }
            Err(e) => warn!("Skipping range token: {e}"),
        }
    }

    let len: usize = collection.len();
    let unit: &str = if len == 1 { "address has been" } else { "addresses have been" };
    success!("{len} {unit} queued from {used} range tokens");

    used
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
