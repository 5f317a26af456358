//! Stream storage: ordered entries addressed by 128-bit IDs
//!
//! A stream ID is a `(milliseconds, sequence)` pair ordered
//! lexicographically. XADD accepts fully or partially auto-generated IDs;
//! range queries use inclusive bounds with `-`/`+` as the extremes.

use std::cmp::Ordering as CmpOrdering;
use std::fmt::{self, Display};
use std::time::{SystemTime, UNIX_EPOCH};
use crate::error::{CommandError, CuprousError, Result};

/// A stream entry ID
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub fn new(ms: u64, seq: u64) -> Self {
        StreamId { ms, seq }
    }

    pub fn min() -> Self {
        StreamId { ms: 0, seq: 0 }
    }

    pub fn max() -> Self {
        StreamId { ms: u64::MAX, seq: u64::MAX }
    }

    pub fn is_zero(&self) -> bool {
        self.ms == 0 && self.seq == 0
    }
}

impl PartialOrd for StreamId {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for StreamId {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.ms, self.seq).cmp(&(other.ms, other.seq))
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// An XADD ID argument: fully auto, auto sequence, or explicit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpec {
    /// `*`: both parts generated
    Auto,
    /// `<ms>-*`: sequence generated
    AutoSeq(u64),
    /// `<ms>-<seq>` explicit
    Exact(StreamId),
}

/// An XRANGE bound: `-`, `+`, or an ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Min,
    Max,
    Id(StreamId),
}

impl RangeBound {
    pub fn resolve(&self) -> StreamId {
        match self {
            RangeBound::Min => StreamId::min(),
            RangeBound::Max => StreamId::max(),
            RangeBound::Id(id) => *id,
        }
    }
}

/// An XREAD start position: `$` (entries after the current tail) or an ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStart {
    Latest,
    After(StreamId),
}

/// One stream entry. Fields keep their insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Vec<u8>, Vec<u8>)>,
}

/// An append-only stream with a monotonic ID cursor
#[derive(Debug, Clone)]
pub struct Stream {
    entries: Vec<StreamEntry>,
    last_id: StreamId,
}

impl Stream {
    pub fn new() -> Self {
        Stream {
            entries: Vec::new(),
            last_id: StreamId::min(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    /// Append an entry, resolving any auto-generated ID parts against
    /// `last_id`. Returns the ID actually assigned.
    pub fn add(&mut self, spec: IdSpec, fields: Vec<(Vec<u8>, Vec<u8>)>) -> Result<StreamId> {
        let id = self.resolve_id(spec)?;
        self.entries.push(StreamEntry { id, fields });
        self.last_id = id;
        Ok(id)
    }

    /// Entries with `start <= id <= end`, in insertion order
    pub fn range(&self, start: RangeBound, end: RangeBound) -> Vec<StreamEntry> {
        let start = start.resolve();
        let end = end.resolve();
        if start > end {
            return Vec::new();
        }
        let from = self.entries.partition_point(|e| e.id < start);
        let to = self.entries.partition_point(|e| e.id <= end);
        self.entries[from..to].to_vec()
    }

    /// Entries with `id > after`, in insertion order
    pub fn read_after(&self, after: StreamId) -> Vec<StreamEntry> {
        let from = self.entries.partition_point(|e| e.id <= after);
        self.entries[from..].to_vec()
    }

    fn resolve_id(&self, spec: IdSpec) -> Result<StreamId> {
        let last = self.last_id;
        match spec {
            IdSpec::Auto => {
                let now_ms = wall_clock_ms();
                if now_ms > last.ms {
                    Ok(StreamId::new(now_ms, 0))
                } else {
                    Ok(StreamId::new(last.ms, last.seq + 1))
                }
            }
            IdSpec::AutoSeq(ms) => {
                if ms < last.ms {
                    Err(CuprousError::Command(CommandError::StreamIdTooSmall))
                } else if ms == last.ms {
                    Ok(StreamId::new(ms, last.seq + 1))
                } else {
                    Ok(StreamId::new(ms, 0))
                }
            }
            IdSpec::Exact(id) => {
                if id.is_zero() {
                    Err(CuprousError::Command(CommandError::StreamIdZero))
                } else if id <= last {
                    Err(CuprousError::Command(CommandError::StreamIdTooSmall))
                } else {
                    Ok(id)
                }
            }
        }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Parse an XADD ID argument: `*`, `<ms>-*`, or `<ms>-<seq>`
pub fn parse_xadd_id(raw: &str) -> Result<IdSpec> {
    if raw == "*" {
        return Ok(IdSpec::Auto);
    }
    match raw.split_once('-') {
        Some((ms, "*")) => {
            let ms = parse_id_part(ms)?;
            Ok(IdSpec::AutoSeq(ms))
        }
        Some((ms, seq)) => {
            let id = StreamId::new(parse_id_part(ms)?, parse_id_part(seq)?);
            Ok(IdSpec::Exact(id))
        }
        // A bare millisecond value means sequence 0
        None => {
            let id = StreamId::new(parse_id_part(raw)?, 0);
            Ok(IdSpec::Exact(id))
        }
    }
}

/// Parse an XRANGE bound. A bare millisecond value covers the whole
/// sequence range on the appropriate side.
pub fn parse_range_bound(raw: &str, is_start: bool) -> Result<RangeBound> {
    match raw {
        "-" => Ok(RangeBound::Min),
        "+" => Ok(RangeBound::Max),
        _ => match raw.split_once('-') {
            Some((ms, seq)) => Ok(RangeBound::Id(StreamId::new(
                parse_id_part(ms)?,
                parse_id_part(seq)?,
            ))),
            None => {
                let ms = parse_id_part(raw)?;
                let seq = if is_start { 0 } else { u64::MAX };
                Ok(RangeBound::Id(StreamId::new(ms, seq)))
            }
        },
    }
}

/// Parse an XREAD position: `$` or an ID (bare milliseconds mean sequence 0)
pub fn parse_read_start(raw: &str) -> Result<ReadStart> {
    if raw == "$" {
        return Ok(ReadStart::Latest);
    }
    match raw.split_once('-') {
        Some((ms, seq)) => Ok(ReadStart::After(StreamId::new(
            parse_id_part(ms)?,
            parse_id_part(seq)?,
        ))),
        None => Ok(ReadStart::After(StreamId::new(parse_id_part(raw)?, 0))),
    }
}

fn parse_id_part(raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|_| {
        CuprousError::Command(CommandError::Generic(
            "Invalid stream ID specified as stream command argument".into(),
        ))
    })
}
