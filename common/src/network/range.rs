//! # IPv4 Range Model
//!
//! Continuous, inclusive IPv4 ranges plus the ordered collection of addresses
//! produced by expanding a whole range file.

use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::RangeInclusive;

use pnet::ipnetwork::{IpNetworkError, Ipv4Network};

/// Represents a continuous range of IPv4 addresses, inclusive.
///
/// A range whose start is numerically above its end is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    /// A range that yields no address.
    pub fn empty() -> Self {
        Self::new(Ipv4Addr::BROADCAST, Ipv4Addr::UNSPECIFIED)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Ipv4Addr> + Clone {
        let start: u32 = u32::from(self.start_addr);
        let end: u32 = u32::from(self.end_addr);
        (start..=end).map(Ipv4Addr::from)
    }

    pub fn to_iter(&self) -> impl Iterator<Item = IpAddr> {
        self.iter().map(IpAddr::V4)
    }

    pub fn len(&self) -> usize {
        let start: u32 = u32::from(self.start_addr);
        let end: u32 = u32::from(self.end_addr);
        if start > end {
            0
        } else {
            (end - start) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Usable host range of a CIDR block: network and broadcast are stripped.
///
/// Blocks with a prefix of 31 or 32 have no usable host and yield an empty range.
pub fn cidr_range(ip: Ipv4Addr, prefix: u8) -> Result<Ipv4Range, IpNetworkError> {
    let network = Ipv4Network::new(ip, prefix)?;
    let net_u32: u32 = u32::from(network.network());
    let broadcast_u32: u32 = u32::from(network.broadcast());

    if prefix >= 31 {
        return Ok(Ipv4Range::empty());
    }

    Ok(Ipv4Range::new(
        Ipv4Addr::from(net_u32 + 1),
        Ipv4Addr::from(broadcast_u32 - 1),
    ))
}

/// Ordered, de-duplicated list of addresses to probe.
///
/// Insertion order is kept: re-checked addresses go first, then every range
/// in the order it appeared in the range file. Ranges are stored as segments
/// trimmed to the part no earlier entry covers, and only expanded while
/// iterating, so a `/8` costs a few words until it is consumed.
#[derive(Debug, Default, Clone)]
pub struct IpCollection {
    segments: Vec<Segment>,
    /// Merged, disjoint IPv4 intervals already present, keyed by start.
    covered: BTreeMap<u32, u32>,
    v6: HashSet<Ipv6Addr>,
    len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    V4 { start: u32, end: u32 },
    V6(Ipv6Addr),
}

impl IpCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_single(&mut self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(v4) => self.add_range(Ipv4Range::new(v4, v4)) == 1,
            IpAddr::V6(v6) => {
                if !self.v6.insert(v6) {
                    return false;
                }
                self.segments.push(Segment::V6(v6));
                self.len += 1;
                true
            }
        }
    }

    /// Adds the addresses of `range` not present yet; returns how many were new.
    pub fn add_range(&mut self, range: Ipv4Range) -> usize {
        if range.is_empty() {
            return 0;
        }
        let start: u32 = u32::from(range.start_addr);
        let end: u32 = u32::from(range.end_addr);

        let mut added: usize = 0;
        let mut cursor: u64 = u64::from(start);
        let mut gaps: Vec<(u32, u32)> = Vec::new();
        for (&lo, &hi) in self.covered.range(..=end) {
            if u64::from(hi) < cursor {
                continue;
            }
            if u64::from(lo) > cursor {
                gaps.push((cursor as u32, lo - 1));
            }
            cursor = u64::from(hi) + 1;
        }
        if cursor <= u64::from(end) {
            gaps.push((cursor as u32, end));
        }

        for (lo, hi) in gaps {
            added += (hi - lo) as usize + 1;
            self.push_v4(lo, hi);
        }
        self.cover(start, end);
        self.len += added;
        added
    }

    /// Moves every address of `other` behind the current ones.
    pub fn append(&mut self, other: IpCollection) {
        for segment in other.segments {
            match segment {
                Segment::V4 { start, end } => {
                    self.add_range(Ipv4Range::new(Ipv4Addr::from(start), Ipv4Addr::from(end)));
                }
                Segment::V6(v6) => {
                    self.add_single(IpAddr::V6(v6));
                }
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = IpAddr>>(&mut self, addrs: I) {
        for addr in addrs {
            self.add_single(addr);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push_v4(&mut self, lo: u32, hi: u32) {
        if let Some(Segment::V4 { end, .. }) = self.segments.last_mut()
            && u64::from(*end) + 1 == u64::from(lo)
        {
            *end = hi;
            return;
        }
        self.segments.push(Segment::V4 { start: lo, end: hi });
    }

    fn cover(&mut self, start: u32, end: u32) {
        let (mut lo, mut hi) = (start, end);
        let touching: Vec<u32> = self
            .covered
            .range(..=end.saturating_add(1))
            .filter(|&(_, &h)| u64::from(h) + 1 >= u64::from(start))
            .map(|(&l, _)| l)
            .collect();
        for l in touching {
            if let Some(h) = self.covered.remove(&l) {
                lo = lo.min(l);
                hi = hi.max(h);
            }
        }
        self.covered.insert(lo, hi);
    }
}

impl FromIterator<IpAddr> for IpCollection {
    fn from_iter<I: IntoIterator<Item = IpAddr>>(iter: I) -> Self {
        let mut collection = IpCollection::new();
        collection.extend(iter);
        collection
    }
}

impl IntoIterator for IpCollection {
    type Item = IpAddr;
    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            segments: self.segments.into_iter(),
            current: None,
            remaining: self.len,
        }
    }
}

/// Expands the segments of an [`IpCollection`] one address at a time.
#[derive(Debug)]
pub struct IntoIter {
    segments: std::vec::IntoIter<Segment>,
    current: Option<RangeInclusive<u32>>,
    remaining: usize,
}

impl Iterator for IntoIter {
    type Item = IpAddr;

    fn next(&mut self) -> Option<IpAddr> {
        loop {
            if let Some(n) = self.current.as_mut().and_then(|range| range.next()) {
                self.remaining -= 1;
                return Some(IpAddr::V4(Ipv4Addr::from(n)));
            }
            match self.segments.next()? {
                Segment::V4 { start, end } => self.current = Some(start..=end),
                Segment::V6(v6) => {
                    self.remaining -= 1;
                    return Some(IpAddr::V6(v6));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for IntoIter {}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
