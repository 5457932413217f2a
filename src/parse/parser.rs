//! The entry-assembly state machine and the parser facade.
//!
//! The grammar of an entry, after the axis headers, is:
//!
//! ```text
//! Entry    := CostPosLines CostRows (CallGroup)*
//! CostRows := CostLine (CostLine | fi/fe line)*
//! CallGroup := CalledPosLines "calls=..." CostRows
//! ```
//!
//! Entries end at a blank line, at end of file, or at the next
//! `ob=`/`fl=`/`fn=` line - real dumps routinely run entries together with
//! only a position line between them. Position state is *sticky* and
//! file-global: every assignment persists until overwritten, so an entry
//! (or call target) inherits whatever fields it does not set itself.
//!
//! Builders ride inside the state enum, so a state can never be observed
//! without the data it needs, and an error leaves no partially committed
//! entry behind.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ParseError;
use crate::graph;
use crate::model::{Call, CostRow, Entry, Position, PositionId, Profile, Summary};

use super::classify::{classify, Line, PositionKey, PositionSpec};
use super::compress::{CompressionTables, ResolveError};
use super::subpos::{parse_number, RunningPositions};

/// Sticky position state. Fields default to empty strings and persist
/// across lines and across entry boundaries until overwritten.
#[derive(Debug, Clone)]
struct StickyPosition {
    object: Arc<str>,
    source: Arc<str>,
    symbol: Arc<str>,
}

impl Default for StickyPosition {
    fn default() -> Self {
        let empty: Arc<str> = Arc::from("");
        StickyPosition {
            object: empty.clone(),
            source: empty.clone(),
            symbol: empty,
        }
    }
}

impl StickyPosition {
    fn set(&mut self, key: PositionKey, value: Arc<str>) {
        match key {
            PositionKey::Object => self.object = value,
            PositionKey::File | PositionKey::InlineFile | PositionKey::EndFile => {
                self.source = value
            }
            PositionKey::Function => self.symbol = value,
        }
    }

    fn to_position(&self) -> Position {
        Position {
            object: self.object.clone(),
            source: self.source.clone(),
            symbol: self.symbol.clone(),
        }
    }
}

/// An entry past its first cost row, waiting for its terminator.
#[derive(Debug)]
struct PendingEntry {
    position: PositionId,
    rows: Vec<CostRow>,
    calls: Vec<Call>,
}

/// A call group past its `calls=` line, accumulating cost rows.
#[derive(Debug)]
struct PendingCall {
    ncalls: u64,
    sub_positions: Vec<u64>,
    target_position: PositionId,
    rows: Vec<CostRow>,
}

impl PendingCall {
    fn into_call(self) -> Call {
        Call {
            ncalls: self.ncalls,
            sub_positions: self.sub_positions,
            rows: self.rows,
            target_position: self.target_position,
            // Resolved by the stitch phase.
            target: None,
        }
    }
}

/// Assembly states.
#[derive(Debug)]
enum State {
    /// Between entries (also: the header region).
    Idle,
    /// Collecting the position block of the next entry.
    EntryPosition,
    /// Appending cost rows to an open entry.
    EntryCosts(PendingEntry),
    /// Collecting called-position lines for the next call group.
    CallPosition(PendingEntry, StickyPosition),
    /// `calls=` seen; the next line must be a cost row.
    ExpectCallCost(PendingEntry, PendingCall),
    /// Appending cost rows to an open call group.
    CallCosts(PendingEntry, PendingCall),
}

struct Assembler {
    verbose: bool,
    state: State,
    profile: Profile,
    tables: CompressionTables,
    running: RunningPositions,
    current: StickyPosition,
    n_lines: u64,
}

impl Assembler {
    fn new(verbose: bool) -> Self {
        Assembler {
            verbose,
            state: State::Idle,
            profile: Profile::default(),
            tables: CompressionTables::default(),
            running: RunningPositions::default(),
            current: StickyPosition::default(),
            n_lines: 0,
        }
    }

    fn feed(&mut self, line_no: u64, text: &str) -> Result<(), ParseError> {
        self.n_lines = line_no;
        // Taking the state out means a failed step leaves us Idle with the
        // half-built entry dropped, never partially committed.
        let state = std::mem::replace(&mut self.state, State::Idle);
        self.state = self.step(state, line_no, text)?;
        Ok(())
    }

    fn step(&mut self, state: State, line_no: u64, text: &str) -> Result<State, ParseError> {
        match (state, classify(text)) {
            // Axis headers, legal only before the first entry.
            (State::Idle, Line::Positions(axes)) if self.profile.entries.is_empty() => {
                self.trace(line_no, text);
                self.running.reset(axes.len());
                self.profile.position_axes = axes;
                Ok(State::Idle)
            }
            (State::Idle, Line::Events(events)) if self.profile.entries.is_empty() => {
                self.trace(line_no, text);
                self.profile.events = events.iter().map(|e| e.to_string()).collect();
                Ok(State::Idle)
            }

            // A position line opens (or extends) an entry's position block.
            // fi=/fe= count here too: before any cost row they set the
            // source field like fl= does.
            (State::Idle, Line::CostPosition(spec) | Line::FiFePosition(spec)) => {
                self.trace(line_no, "begin entry");
                self.apply_to_current(line_no, text, spec)?;
                Ok(State::EntryPosition)
            }
            (State::EntryPosition, Line::CostPosition(spec) | Line::FiFePosition(spec)) => {
                self.apply_to_current(line_no, text, spec)?;
                Ok(State::EntryPosition)
            }

            // First cost row closes the position block: the entry's
            // identity is interned now and further fi=/fe= lines no longer
            // touch it.
            (State::EntryPosition, Line::CostRow(tokens)) => {
                let row = self.decode_cost_row(line_no, text, &tokens)?;
                let position = self.current.to_position();
                let position = self.profile.intern_position(&position);
                Ok(State::EntryCosts(PendingEntry {
                    position,
                    rows: vec![row],
                    calls: Vec::new(),
                }))
            }
            (State::EntryCosts(mut entry), Line::CostRow(tokens)) => {
                let row = self.decode_cost_row(line_no, text, &tokens)?;
                entry.rows.push(row);
                Ok(State::EntryCosts(entry))
            }
            // fi=/fe= between cost rows switch files for line mapping we do
            // not track; any alias they define must still be installed.
            (State::EntryCosts(entry), Line::FiFePosition(spec)) => {
                self.resolve_spec(line_no, text, &spec)?;
                self.trace(line_no, "ignore fi/fe");
                Ok(State::EntryCosts(entry))
            }

            // A fresh ob=/fl=/fn= after cost data ends the entry and opens
            // the next one; blank separators are optional in real dumps.
            (State::EntryCosts(entry), Line::CostPosition(spec)) => {
                self.commit_entry(line_no, entry);
                self.trace(line_no, "begin entry");
                self.apply_to_current(line_no, text, spec)?;
                Ok(State::EntryPosition)
            }
            (State::CallCosts(mut entry, call), Line::CostPosition(spec)) => {
                entry.calls.push(call.into_call());
                self.commit_entry(line_no, entry);
                self.trace(line_no, "begin entry");
                self.apply_to_current(line_no, text, spec)?;
                Ok(State::EntryPosition)
            }

            // Call groups: called-position lines seed the target from the
            // enclosing entry's position, then overwrite per key.
            (State::EntryCosts(entry), Line::CalledPosition(spec)) => {
                self.trace(line_no, "begin call");
                let mut target = self.current.clone();
                self.apply_to_call(line_no, text, spec, &mut target)?;
                Ok(State::CallPosition(entry, target))
            }
            (State::CallPosition(entry, mut target), Line::CalledPosition(spec)) => {
                self.apply_to_call(line_no, text, spec, &mut target)?;
                Ok(State::CallPosition(entry, target))
            }
            (State::CallCosts(mut entry, call), Line::CalledPosition(spec)) => {
                entry.calls.push(call.into_call());
                self.trace(line_no, "begin call");
                let mut target = self.current.clone();
                self.apply_to_call(line_no, text, spec, &mut target)?;
                Ok(State::CallPosition(entry, target))
            }

            (
                State::CallPosition(entry, target),
                Line::CallHeader {
                    ncalls,
                    sub_positions,
                },
            ) => {
                let ncalls = parse_number(ncalls).map_err(|_| ParseError::MalformedNumber {
                    line: line_no,
                    token: ncalls.to_string(),
                    text: text.to_string(),
                })?;
                let sub_positions = self.decode_sub_positions(line_no, text, &sub_positions)?;
                let position = target.to_position();
                let target_position = self.profile.intern_position(&position);
                Ok(State::ExpectCallCost(
                    entry,
                    PendingCall {
                        ncalls,
                        sub_positions,
                        target_position,
                        rows: Vec::new(),
                    },
                ))
            }
            (State::ExpectCallCost(entry, mut call), Line::CostRow(tokens)) => {
                let row = self.decode_cost_row(line_no, text, &tokens)?;
                call.rows.push(row);
                Ok(State::CallCosts(entry, call))
            }
            (State::CallCosts(entry, mut call), Line::CostRow(tokens)) => {
                let row = self.decode_cost_row(line_no, text, &tokens)?;
                call.rows.push(row);
                Ok(State::CallCosts(entry, call))
            }
            (State::CallCosts(entry, call), Line::FiFePosition(spec)) => {
                self.resolve_spec(line_no, text, &spec)?;
                self.trace(line_no, "ignore fi/fe");
                Ok(State::CallCosts(entry, call))
            }

            // Blank lines terminate blocks.
            (State::Idle, Line::Empty) => Ok(State::Idle),
            // A position block with no cost rows is dropped silently; its
            // assignments stay in the sticky state.
            (State::EntryPosition, Line::Empty) => Ok(State::Idle),
            (State::EntryCosts(entry), Line::Empty) => {
                self.commit_entry(line_no, entry);
                Ok(State::Idle)
            }
            (State::CallCosts(mut entry, call), Line::Empty) => {
                entry.calls.push(call.into_call());
                self.commit_entry(line_no, entry);
                Ok(State::Idle)
            }

            // Informational lines between entries (cmd:, summary:, comments,
            // stray called-positions) fall through.
            (State::Idle, Line::Other | Line::CalledPosition(_)) => {
                if self.verbose {
                    eprintln!("{line_no}: {text}");
                }
                Ok(State::Idle)
            }

            // Cost or call data before the axis headers.
            (State::Idle, Line::CostRow(_) | Line::CallHeader { .. })
                if !self.headers_seen() =>
            {
                Err(ParseError::MissingHeader {
                    line: line_no,
                    text: text.to_string(),
                })
            }

            // Everything else violates the entry grammar (a calls= line
            // with no preceding called-position, headers mid-entry, ...).
            _ => Err(ParseError::UnexpectedLine {
                line: line_no,
                text: text.to_string(),
            }),
        }
    }

    /// End of input acts as an implicit blank line, so a dump without a
    /// trailing newline still commits its last entry. Ending mid-call-group
    /// is a truncated file.
    fn finish(mut self) -> Result<(Profile, u64), ParseError> {
        let line_no = self.n_lines;
        let state = std::mem::replace(&mut self.state, State::Idle);
        match state {
            State::Idle | State::EntryPosition => {}
            State::EntryCosts(entry) => self.commit_entry(line_no, entry),
            State::CallCosts(mut entry, call) => {
                entry.calls.push(call.into_call());
                self.commit_entry(line_no, entry);
            }
            State::CallPosition(..) | State::ExpectCallCost(..) => {
                return Err(ParseError::UnexpectedLine {
                    line: line_no,
                    text: String::from("<end of file>"),
                });
            }
        }
        Ok((self.profile, self.n_lines))
    }

    fn headers_seen(&self) -> bool {
        !self.profile.position_axes.is_empty() && !self.profile.events.is_empty()
    }

    fn trace(&self, line_no: u64, what: &str) {
        if self.verbose {
            eprintln!("{line_no}: {what}");
        }
    }

    /// Run the aliasing contract for one position-shaped line and yield
    /// the effective value.
    fn resolve_spec(
        &mut self,
        line_no: u64,
        text: &str,
        spec: &PositionSpec<'_>,
    ) -> Result<Arc<str>, ParseError> {
        let index = match spec.index {
            Some(token) => {
                Some(
                    parse_number(token).map_err(|_| ParseError::MalformedNumber {
                        line: line_no,
                        token: token.to_string(),
                        text: text.to_string(),
                    })?,
                )
            }
            None => None,
        };
        match self.tables.resolve(spec.key.table(), index, spec.value) {
            Ok(Some(value)) => Ok(value),
            // Neither an alias nor a value on the line.
            Ok(None) => Err(ParseError::UnexpectedLine {
                line: line_no,
                text: text.to_string(),
            }),
            Err(ResolveError::Missing(index)) => Err(ParseError::MissingCompression {
                line: line_no,
                index,
                text: text.to_string(),
            }),
            Err(ResolveError::Duplicate(index)) => Err(ParseError::DuplicateCompression {
                line: line_no,
                index,
                text: text.to_string(),
            }),
        }
    }

    fn apply_to_current(
        &mut self,
        line_no: u64,
        text: &str,
        spec: PositionSpec<'_>,
    ) -> Result<(), ParseError> {
        let value = self.resolve_spec(line_no, text, &spec)?;
        self.current.set(spec.key, value);
        Ok(())
    }

    fn apply_to_call(
        &mut self,
        line_no: u64,
        text: &str,
        spec: PositionSpec<'_>,
        target: &mut StickyPosition,
    ) -> Result<(), ParseError> {
        // The called axis supports cob/cfl/cfn/cfi; cfe is outside the set.
        if spec.key == PositionKey::EndFile {
            return Err(ParseError::UnknownPositionKey {
                line: line_no,
                key: format!("c{}", spec.key.as_str()),
                text: text.to_string(),
            });
        }
        let value = self.resolve_spec(line_no, text, &spec)?;
        target.set(spec.key, value);
        Ok(())
    }

    fn decode_cost_row(
        &mut self,
        line_no: u64,
        text: &str,
        tokens: &[&str],
    ) -> Result<CostRow, ParseError> {
        if !self.headers_seen() {
            return Err(ParseError::MissingHeader {
                line: line_no,
                text: text.to_string(),
            });
        }
        let n_axes = self.profile.position_axes.len();
        let n_events = self.profile.events.len();
        if tokens.len() != n_axes + n_events {
            return Err(ParseError::WrongColumnCount {
                line: line_no,
                expected: n_axes + n_events,
                found: tokens.len(),
                text: text.to_string(),
            });
        }
        let sub_positions = self.decode_sub_positions(line_no, text, &tokens[..n_axes])?;
        let mut costs = Vec::with_capacity(n_events);
        for token in &tokens[n_axes..] {
            // Cost slots take plain numbers; the differential forms are a
            // sub-position affordance only.
            let malformed = |t: &str| ParseError::MalformedNumber {
                line: line_no,
                token: t.to_string(),
                text: text.to_string(),
            };
            if matches!(token.chars().next(), Some('*' | '+' | '-')) {
                return Err(malformed(token));
            }
            costs.push(parse_number(token).map_err(|_| malformed(token))?);
        }
        Ok(CostRow {
            sub_positions,
            costs,
        })
    }

    /// Decode a sub-position token group (cost-row prefix or `calls=`
    /// group) against the running vector.
    fn decode_sub_positions(
        &mut self,
        line_no: u64,
        text: &str,
        tokens: &[&str],
    ) -> Result<Vec<u64>, ParseError> {
        let n_axes = self.profile.position_axes.len();
        if tokens.len() != n_axes {
            return Err(ParseError::WrongColumnCount {
                line: line_no,
                expected: n_axes,
                found: tokens.len(),
                text: text.to_string(),
            });
        }
        tokens
            .iter()
            .enumerate()
            .map(|(axis, token)| {
                self.running
                    .decode(token, axis)
                    .map_err(|_| ParseError::MalformedNumber {
                        line: line_no,
                        token: token.to_string(),
                        text: text.to_string(),
                    })
            })
            .collect()
    }

    fn commit_entry(&mut self, line_no: u64, entry: PendingEntry) {
        self.trace(line_no, "end entry");
        self.profile.entries.push(Entry {
            position: entry.position,
            rows: entry.rows,
            calls: entry.calls,
            callers: Vec::new(),
        });
    }
}

/// The parser facade: owns the path, the verbosity flag, and (after a
/// successful `parse`) the finished [`Profile`].
pub struct CallgrindParser {
    path: PathBuf,
    verbose: bool,
    profile: Profile,
    n_lines: u64,
}

impl CallgrindParser {
    /// Construct against a filesystem path. No I/O happens here.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CallgrindParser {
            path: path.into(),
            verbose: false,
            profile: Profile::default(),
            n_lines: 0,
        }
    }

    /// Toggle diagnostic tracing on stderr: ignored lines are echoed with
    /// their line number, entry/call opens and closes are announced.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Open the file, drive the state machine over it line by line, then
    /// rank and stitch. Any previous parse result is discarded first.
    pub fn parse(&mut self) -> Result<(), ParseError> {
        let file = File::open(&self.path).map_err(|source| ParseError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.parse_reader(BufReader::new(file))
    }

    /// Same as [`parse`](Self::parse), over any buffered line source.
    pub fn parse_reader<R: BufRead>(&mut self, reader: R) -> Result<(), ParseError> {
        self.profile = Profile::default();
        self.n_lines = 0;

        let mut assembler = Assembler::new(self.verbose);
        for (index, line) in reader.lines().enumerate() {
            let text = line.map_err(|source| ParseError::Io {
                path: self.path.clone(),
                source,
            })?;
            // lines() strips the \n but keeps a \r from CRLF dumps.
            let text = text.strip_suffix('\r').unwrap_or(&text);
            assembler.feed(index as u64 + 1, text)?;
        }
        let (mut profile, n_lines) = assembler.finish()?;

        graph::rank(&mut profile);
        graph::stitch(&mut profile);

        if self.verbose {
            eprintln!("parsed {n_lines} lines");
        }
        self.n_lines = n_lines;
        self.profile = profile;
        Ok(())
    }

    /// Entries ordered by first-event total cost, descending; ties keep
    /// parse order.
    pub fn entries(&self) -> &[Entry] {
        self.profile.entries()
    }

    /// The full parse result, for position lookup and graph navigation.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Consume the parser, keeping only the profile.
    pub fn into_profile(self) -> Profile {
        self.profile
    }

    pub fn summary(&self) -> Summary {
        Summary {
            n_entries: self.profile.entries.len(),
            n_unique_positions: self.profile.positions.len(),
            n_lines: self.n_lines,
        }
    }
}

impl Profile {
    /// One-shot convenience: parse `path` and return the finished profile.
    pub fn load(path: impl Into<PathBuf>) -> Result<Profile, ParseError> {
        let mut parser = CallgrindParser::new(path);
        parser.parse()?;
        Ok(parser.into_profile())
    }
}
