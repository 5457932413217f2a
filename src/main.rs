//! grindmap CLI - hot-list viewer for callgrind dumps.
//!
//! Parses one callgrind output file and prints the ranked hot-list, with
//! optional caller/callee detail per entry and a JSON export mode for
//! downstream tooling. Exit code 0 on a successful parse; non-zero with an
//! error report on I/O or parse failure.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use grindmap::render::{render_hot_list, render_summary};
use grindmap::{CallgrindParser, Entry, Position, PositionAxis, Summary};

/// Parse a callgrind.out dump and rank functions by cost
///
/// grindmap builds the call graph recorded by `valgrind --tool=callgrind`:
/// every function's own cost, its outbound calls with per-call costs, and
/// its inbound callers. The hot-list shows each entry's share of the
/// hottest one.
///
/// Examples:
///   grindmap callgrind.out.18859           # top 100 by Ir
///   grindmap callgrind.out.18859 --calls   # plus caller/callee arrows
///   grindmap callgrind.out.18859 --json    # machine-readable export
#[derive(Parser, Debug)]
#[command(name = "grindmap")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// Callgrind output file (callgrind.out.<pid>)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Number of entries to show in the hot-list
    #[arg(short = 'n', long, default_value = "100")]
    top: usize,

    /// Show outbound calls and inbound callers per entry
    ///
    /// Adds arrow lines under each hot-list row:
    ///   -> calls: helper() x3 (3021)
    ///   <- called by: main()
    #[arg(long)]
    calls: bool,

    /// Emit the ranked profile as JSON on stdout
    ///
    /// The export carries the summary, the axis/event declarations, the
    /// interned position table and every entry with its cost rows, calls
    /// and caller ids. Suppresses the text views.
    #[arg(long)]
    json: bool,

    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,

    /// Trace parser diagnostics on stderr
    ///
    /// Echoes ignored informational lines with their line numbers and
    /// announces entry/call boundaries. Useful for debugging a dump the
    /// parser rejects.
    #[arg(short, long)]
    verbose: bool,
}

/// Shape of the `--json` export: the summary plus the profile's flat
/// tables. Entries reference positions by id, so the interned position
/// table is inlined for consumers to resolve against.
#[derive(Serialize)]
struct JsonReport<'a> {
    summary: Summary,
    position_axes: &'a [PositionAxis],
    events: &'a [String],
    positions: &'a [Position],
    entries: &'a [Entry],
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut parser = CallgrindParser::new(&cli.file);
    parser.set_verbose(cli.verbose);
    parser
        .parse()
        .with_context(|| format!("failed to parse `{}`", cli.file.display()))?;

    if cli.json {
        let profile = parser.profile();
        let report = JsonReport {
            summary: parser.summary(),
            position_axes: profile.position_axes(),
            events: profile.events(),
            positions: profile.positions(),
            entries: profile.entries(),
        };
        serde_json::to_writer_pretty(std::io::stdout().lock(), &report)?;
        println!();
        return Ok(());
    }

    let use_color = !cli.no_color;
    let profile = parser.profile();

    print!("{}", render_summary(&parser.summary(), use_color));
    println!();
    print!("{}", render_hot_list(profile, cli.top, use_color, cli.calls));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    /// Owned mirror of [`JsonReport`] for reading an export back.
    #[derive(Deserialize)]
    struct OwnedReport {
        summary: Summary,
        position_axes: Vec<PositionAxis>,
        events: Vec<String>,
        positions: Vec<Position>,
        entries: Vec<Entry>,
    }

    #[test]
    fn test_json_export_round_trips_entries_and_costs() {
        let mut parser = CallgrindParser::new("test.out");
        parser
            .parse_reader(Cursor::new(
                "positions: line\nevents: Ir\nfl=a.c\nfn=A\n1 10\ncfn=B\ncalls=1 1\n1 5\n\nfl=a.c\nfn=B\n1 20\n\n",
            ))
            .unwrap();

        let profile = parser.profile();
        let report = JsonReport {
            summary: parser.summary(),
            position_axes: profile.position_axes(),
            events: profile.events(),
            positions: profile.positions(),
            entries: profile.entries(),
        };
        let json = serde_json::to_string_pretty(&report).unwrap();
        let read: OwnedReport = serde_json::from_str(&json).unwrap();

        assert_eq!(read.summary, parser.summary());
        assert_eq!(read.entries.len(), parser.entries().len());
        assert_eq!(read.positions.len(), profile.positions().len());
        assert_eq!(read.position_axes, profile.position_axes());
        assert_eq!(read.events, profile.events());

        let n_events = read.events.len();
        for (exported, original) in read.entries.iter().zip(parser.entries()) {
            assert_eq!(exported.position, original.position);
            assert_eq!(
                exported.total_cost(n_events),
                original.total_cost(n_events)
            );
        }
        // Position handles in the export resolve against the inlined table.
        for entry in &read.entries {
            assert!(entry.position.0 < read.positions.len());
        }
    }
}
