//! # Probe Record
//!
//! One probe attempt, serialized as one line of an outcome file:
//!
//! ```text
//! <address> <delay>ms <common-name> <category> <country> [<bandwidth>KB/s]
//! ```
//!
//! Fields are separated by exactly one space, so an empty category or common
//! name still occupies its slot. A delay of `-ms` marks a probe that never
//! completed a handshake.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

/// Placeholder for an unknown country or a missing common name.
pub const UNKNOWN: &str = "-";

/// Bandwidth recorded when the bandwidth phase could not measure an address.
pub const UNMEASURED_BANDWIDTH: u64 = 0;

const DELAY_SUFFIX: &str = "ms";
const BANDWIDTH_SUFFIX: &str = "KB/s";

/// Front-end bucket an address was classified into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Category {
    #[default]
    Unclassified,
    /// Category A (`gws`).
    Gws,
    /// Category B (`gvs`).
    Gvs,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Unclassified => "",
            Category::Gws => "gws",
            Category::Gvs => "gvs",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Category::Unclassified),
            "gws" => Ok(Category::Gws),
            "gvs" => Ok(Category::Gvs),
            other => Err(RecordError::Category(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected 5 or 6 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid address '{0}'")]
    Address(String),
    #[error("invalid delay '{0}'")]
    Delay(String),
    #[error("invalid category '{0}'")]
    Category(String),
    #[error("invalid bandwidth '{0}'")]
    Bandwidth(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRecord {
    pub address: IpAddr,
    /// Handshake duration in milliseconds.
    pub delay: Option<u64>,
    pub common_name: String,
    /// Only used for classification, never written out.
    pub organization: String,
    pub category: Category,
    pub country: String,
    /// Throughput in KB/s, present once the bandwidth phase has run.
    pub bandwidth: Option<u64>,
}

impl ProbeRecord {
    /// A record with every sentinel field set, as written for failed probes.
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            delay: None,
            common_name: String::new(),
            organization: String::new(),
            category: Category::Unclassified,
            country: UNKNOWN.to_string(),
            bandwidth: None,
        }
    }

    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_bandwidth(mut self, bandwidth: u64) -> Self {
        self.bandwidth = Some(bandwidth);
        self
    }

    /// The record as one outcome-file line, newline included.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for ProbeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delay: String = match self.delay {
            Some(ms) => ms.to_string(),
            None => UNKNOWN.to_string(),
        };
        let country: &str = if self.country.is_empty() { UNKNOWN } else { &self.country };

        write!(
            f,
            "{} {}{} {} {} {}",
            self.address,
            delay,
            DELAY_SUFFIX,
            field(&self.common_name),
            self.category,
            field(country),
        )?;

        if let Some(bandwidth) = self.bandwidth {
            write!(f, " {bandwidth}{BANDWIDTH_SUFFIX}")?;
        }
        Ok(())
    }
}

impl FromStr for ProbeRecord {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() != 5 && fields.len() != 6 {
            return Err(RecordError::FieldCount(fields.len()));
        }

        let address: IpAddr = fields[0]
            .parse()
            .map_err(|_| RecordError::Address(fields[0].to_string()))?;

        let delay_str = fields[1]
            .strip_suffix(DELAY_SUFFIX)
            .ok_or_else(|| RecordError::Delay(fields[1].to_string()))?;
        let delay: Option<u64> = match delay_str {
            UNKNOWN => None,
            ms => Some(
                ms.parse()
                    .map_err(|_| RecordError::Delay(fields[1].to_string()))?,
            ),
        };

        let bandwidth: Option<u64> = match fields.get(5) {
            Some(raw) => Some(
                raw.strip_suffix(BANDWIDTH_SUFFIX)
                    .and_then(|kb| kb.parse().ok())
                    .ok_or_else(|| RecordError::Bandwidth(raw.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            address,
            delay,
            common_name: fields[2].to_string(),
            organization: String::new(),
            category: fields[3].parse()?,
            country: fields[4].to_string(),
            bandwidth,
        })
    }
}

/// Keeps a free-text certificate field inside its single-space slot.
fn field(value: &str) -> String {
    value.split_whitespace().collect::<Vec<&str>>().join("_")
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
