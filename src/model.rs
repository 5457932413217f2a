//! Profile data model - interned positions, cost rows, calls, entries.
//!
//! The call graph contains cycles (mutual recursion), so entries live in an
//! arena (`Profile::entries`) and refer to each other through plain
//! `EntryId` indices. Caller back-edges are ids too: non-owning, so an
//! entry's inbound links never keep anything alive and never form an
//! ownership cycle. Positions are interned the same way - one canonical
//! `Position` record per `(object, source, symbol)` triple, shared by id.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serde helpers for `Arc<str>` fields.
mod arc_str_serde {
    use super::*;

    pub fn serialize<S>(arc: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(arc.as_ref())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.into())
    }
}

/// One coordinate axis of a sub-position, as declared by `positions:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionAxis {
    /// Instruction address.
    Instr,
    /// Source line number.
    Line,
    /// Basic block id.
    Bb,
}

impl PositionAxis {
    /// Parse an axis token from a `positions:` header. Anything outside the
    /// known set means the header line is not a valid axis declaration.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "instr" => Some(PositionAxis::Instr),
            "line" => Some(PositionAxis::Line),
            "bb" => Some(PositionAxis::Bb),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionAxis::Instr => "instr",
            PositionAxis::Line => "line",
            PositionAxis::Bb => "bb",
        }
    }
}

/// Index of an interned [`Position`] in [`Profile::positions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub usize);

/// Index of an [`Entry`] in [`Profile::entries`].
///
/// Ids are assigned after ranking, so id order is hot-list order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub usize);

/// The identity of a code site: binary object, source file, function symbol.
///
/// Interned - two entries with the same triple share one record (and one
/// `PositionId`). Fields left undeclared by the dump are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Binary object (`ob=`).
    #[serde(with = "arc_str_serde")]
    pub object: Arc<str>,
    /// Source file (`fl=`, `fi=`, `fe=`).
    #[serde(with = "arc_str_serde")]
    pub source: Arc<str>,
    /// Function symbol (`fn=`).
    #[serde(with = "arc_str_serde")]
    pub symbol: Arc<str>,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fl: {} fn: {}", self.source, self.symbol)
    }
}

/// One cost line: `positions_axis_count` sub-positions followed by
/// `events_axis_count` event costs, already resolved from the differential
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRow {
    pub sub_positions: Vec<u64>,
    pub costs: Vec<u64>,
}

/// One outbound call group inside an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Call count from the `calls=` line.
    pub ncalls: u64,
    /// Sub-positions of the call target, decoded from the `calls=` line.
    pub sub_positions: Vec<u64>,
    /// Cost rows charged to this call.
    pub rows: Vec<CostRow>,
    /// Identity of the callee, recorded at parse time. Always valid, even
    /// when the callee never shows up as a top-level entry.
    pub target_position: PositionId,
    /// Canonical callee entry, filled in by the stitch phase. `None` when
    /// the target was never observed as a top-level entry.
    pub target: Option<EntryId>,
}

impl Call {
    /// Per-event sum over this call's cost rows.
    pub fn total_cost(&self, n_events: usize) -> Vec<u64> {
        sum_rows(&self.rows, n_events)
    }
}

/// One function's aggregated record: its position, own cost rows, outbound
/// calls, and inbound callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub position: PositionId,
    pub rows: Vec<CostRow>,
    pub calls: Vec<Call>,
    /// Entries that call this one. Populated by the stitch phase; each
    /// caller appears exactly once.
    pub callers: Vec<EntryId>,
}

impl Entry {
    /// Per-event total: own cost rows plus every outbound call's cost rows.
    pub fn total_cost(&self, n_events: usize) -> Vec<u64> {
        let mut total = sum_rows(&self.rows, n_events);
        for call in &self.calls {
            for row in &call.rows {
                for (slot, cost) in total.iter_mut().zip(&row.costs) {
                    *slot += cost;
                }
            }
        }
        total
    }
}

fn sum_rows(rows: &[CostRow], n_events: usize) -> Vec<u64> {
    let mut total = vec![0u64; n_events];
    for row in rows {
        for (slot, cost) in total.iter_mut().zip(&row.costs) {
            *slot += cost;
        }
    }
    total
}

/// Headline numbers for a parsed profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub n_entries: usize,
    pub n_unique_positions: usize,
    /// Lines consumed from the input, including ignored ones.
    pub n_lines: u64,
}

/// The finished parse result: axis declarations, interned positions, and
/// the ranked entry arena.
///
/// Immutable after `parse()` returns; everything here is plain owned data
/// plus `Arc<str>`, so shared read access across threads is fine.
#[derive(Debug, Default, Serialize)]
pub struct Profile {
    pub(crate) position_axes: Vec<PositionAxis>,
    pub(crate) events: Vec<String>,
    pub(crate) positions: Vec<Position>,
    pub(crate) entries: Vec<Entry>,
    /// Lookup index for [`Profile::intern_position`]. Skipped in the
    /// export, and the reason `Profile` is serialize-only: a derived
    /// `Deserialize` would leave this empty, so later interning on a
    /// deserialized profile would silently mint duplicate ids. Consumers
    /// round-trip the flat tables (positions, entries) instead.
    #[serde(skip)]
    pub(crate) position_index: HashMap<Position, PositionId>,
}

impl Profile {
    /// Sub-position axis names, in declaration order.
    pub fn position_axes(&self) -> &[PositionAxis] {
        &self.position_axes
    }

    /// Event (cost dimension) names, in declaration order. The first one is
    /// the ranking key (canonically `Ir`).
    pub fn events(&self) -> &[String] {
        &self.events
    }

    /// Entries ordered by first-event total cost, descending; ties keep
    /// parse order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[id.0]
    }

    pub fn position(&self, id: PositionId) -> &Position {
        &self.positions[id.0]
    }

    /// All interned positions. Length is the unique-position count.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Per-event total for an entry (own rows + call rows).
    pub fn total_cost(&self, entry: &Entry) -> Vec<u64> {
        entry.total_cost(self.events.len())
    }

    /// Intern a position: returns the existing id when the triple was seen
    /// before, otherwise inserts a new canonical record.
    pub(crate) fn intern_position(&mut self, position: &Position) -> PositionId {
        if let Some(&id) = self.position_index.get(position) {
            return id;
        }
        let id = PositionId(self.positions.len());
        self.positions.push(position.clone());
        self.position_index.insert(position.clone(), id);
        id
    }
}
