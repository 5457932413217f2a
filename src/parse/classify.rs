//! Line classification for the callgrind grammar.
//!
//! Classification is purely syntactic: a line becomes one tagged variant
//! with its captured fields still borrowed from the input. Numeric parsing
//! and alias resolution happen later, in the assembler, where line numbers
//! are available for error reporting.
//!
//! Order matters and is fixed (first match wins): position lines would
//! otherwise be shadowed by the all-numeric cost-row check, and `fn=12` must
//! classify as a position, not a cost row.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::PositionAxis;

/// Compiled patterns for the line grammar. Cached as statics so a parse
/// never recompiles them.
mod patterns {
    use super::*;

    /// `positions: instr line` - axis declaration header.
    pub static POSITIONS: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^positions:[ \t]+(.+?)[ \t]*$").expect("invalid positions regex")
    });

    /// `events: Ir Dr Dw` - event declaration header.
    pub static EVENTS: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^events:[ \t]+(\w+(?:[ \t]+\w+)*)[ \t]*$").expect("invalid events regex")
    });

    /// `ob=`, `fl=`, `fn=`, `fi=`, `fe=` with optional `(N)` alias and
    /// optional value.
    pub static COST_POSITION: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(ob|fl|fi|fe|fn)=[ \t]*(?:\((\d+)\))?[ \t]*(.*)$")
            .expect("invalid cost-position regex")
    });

    /// `cob=`, `cfl=`, `cfn=`, `cfi=`, `cfe=` - same shape on the called
    /// axis. `cfe` classifies but the assembler rejects it.
    pub static CALLED_POSITION: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^c(ob|fl|fi|fe|fn)=[ \t]*(?:\((\d+)\))?[ \t]*(.*)$")
            .expect("invalid called-position regex")
    });

    /// `calls=3 5` - call count plus the callee sub-position group.
    pub static CALL_HEADER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^calls=[ \t]*(\d+)[ \t]+(.+?)[ \t]*$").expect("invalid call-header regex")
    });

    /// One cost-row token: `*`, `+N`, `-N`, hex, or decimal.
    pub static NUMBER_TOKEN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?:\*|[+-]\d+|0[xX][0-9a-fA-F]+|\d+)$").expect("invalid number regex")
    });
}

/// Which identity field a position key addresses, and which compression
/// table it consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionKey {
    /// `ob` / `cob` - binary object.
    Object,
    /// `fl` / `cfl` - source file.
    File,
    /// `fi` / `cfi` - inlined/included source file.
    InlineFile,
    /// `fe` - source file at function end. Not supported on the called axis.
    EndFile,
    /// `fn` / `cfn` - function symbol.
    Function,
}

impl PositionKey {
    fn from_token(token: &str) -> PositionKey {
        match token {
            "ob" => PositionKey::Object,
            "fl" => PositionKey::File,
            "fi" => PositionKey::InlineFile,
            "fe" => PositionKey::EndFile,
            "fn" => PositionKey::Function,
            // The regexes only capture the five tokens above.
            _ => unreachable!("position regex captured unknown key"),
        }
    }

    /// `fi`/`fe` lines are swallowed between cost rows rather than mutating
    /// the entry's identity.
    pub fn is_fife(&self) -> bool {
        matches!(self, PositionKey::InlineFile | PositionKey::EndFile)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionKey::Object => "ob",
            PositionKey::File => "fl",
            PositionKey::InlineFile => "fi",
            PositionKey::EndFile => "fe",
            PositionKey::Function => "fn",
        }
    }
}

/// A position-shaped line: key, optional `(N)` alias index (still raw
/// digits), optional value text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSpec<'a> {
    pub key: PositionKey,
    pub index: Option<&'a str>,
    pub value: Option<&'a str>,
}

/// One classified line. Borrowed fields point into the input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// `positions:` header with its validated axis list.
    Positions(Vec<PositionAxis>),
    /// `events:` header with its event names.
    Events(Vec<&'a str>),
    /// `ob=`/`fl=`/`fn=` - the entry position axis.
    CostPosition(PositionSpec<'a>),
    /// `fi=`/`fe=` - file-switch lines, swallowed inside cost blocks.
    FiFePosition(PositionSpec<'a>),
    /// `cob=`/`cfl=`/`cfn=`/`cfi=`/`cfe=` - the called position axis, with
    /// the `c` prefix already stripped.
    CalledPosition(PositionSpec<'a>),
    /// A line of sub-position/number tokens.
    CostRow(Vec<&'a str>),
    /// `calls=N <subpositions>`.
    CallHeader {
        ncalls: &'a str,
        sub_positions: Vec<&'a str>,
    },
    Empty,
    /// Anything else (`cmd:`, `summary:`, comments, ...). Ignored upstream.
    Other,
}

fn position_spec<'a>(caps: regex::Captures<'a>) -> PositionSpec<'a> {
    let key = PositionKey::from_token(caps.get(1).map_or("", |m| m.as_str()));
    let index = caps.get(2).map(|m| m.as_str());
    // An empty trailing capture means "no value given", i.e. an aliased
    // reference rather than a definition.
    let value = caps.get(3).map(|m| m.as_str()).filter(|v| !v.is_empty());
    PositionSpec { key, index, value }
}

/// Classify one raw line (no trailing newline).
pub fn classify(line: &str) -> Line<'_> {
    if let Some(caps) = patterns::POSITIONS.captures(line) {
        let tokens = caps.get(1).map_or("", |m| m.as_str());
        let axes: Option<Vec<PositionAxis>> = tokens
            .split_whitespace()
            .map(PositionAxis::from_token)
            .collect();
        // A positions: line naming unknown axes is not an axis declaration;
        // it falls through to Other like any informational line.
        if let Some(axes) = axes {
            if !axes.is_empty() {
                return Line::Positions(axes);
            }
        }
    }

    if let Some(caps) = patterns::EVENTS.captures(line) {
        let events = caps
            .get(1)
            .map_or("", |m| m.as_str())
            .split_whitespace()
            .collect();
        return Line::Events(events);
    }

    if let Some(caps) = patterns::COST_POSITION.captures(line) {
        let spec = position_spec(caps);
        return if spec.key.is_fife() {
            Line::FiFePosition(spec)
        } else {
            Line::CostPosition(spec)
        };
    }

    if let Some(caps) = patterns::CALLED_POSITION.captures(line) {
        return Line::CalledPosition(position_spec(caps));
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if !tokens.is_empty() && tokens.iter().all(|t| patterns::NUMBER_TOKEN.is_match(t)) {
        return Line::CostRow(tokens);
    }

    if let Some(caps) = patterns::CALL_HEADER.captures(line) {
        let ncalls = caps.get(1).map_or("", |m| m.as_str());
        let sub_positions = caps
            .get(2)
            .map_or("", |m| m.as_str())
            .split_whitespace()
            .collect();
        return Line::CallHeader {
            ncalls,
            sub_positions,
        };
    }

    if line.trim().is_empty() {
        return Line::Empty;
    }

    Line::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_header() {
        assert_eq!(
            classify("positions: instr line"),
            Line::Positions(vec![PositionAxis::Instr, PositionAxis::Line])
        );
        assert_eq!(classify("positions: line"), Line::Positions(vec![PositionAxis::Line]));
        // Unknown axis name -> informational fall-through.
        assert_eq!(classify("positions: addr"), Line::Other);
    }

    #[test]
    fn test_events_header() {
        assert_eq!(
            classify("events: Ir Dr Dw"),
            Line::Events(vec!["Ir", "Dr", "Dw"])
        );
        assert_eq!(classify("events: Ir"), Line::Events(vec!["Ir"]));
    }

    #[test]
    fn test_cost_position_shapes() {
        assert_eq!(
            classify("fn=(1) foo"),
            Line::CostPosition(PositionSpec {
                key: PositionKey::Function,
                index: Some("1"),
                value: Some("foo"),
            })
        );
        assert_eq!(
            classify("fn=(1)"),
            Line::CostPosition(PositionSpec {
                key: PositionKey::Function,
                index: Some("1"),
                value: None,
            })
        );
        assert_eq!(
            classify("fl=main.c"),
            Line::CostPosition(PositionSpec {
                key: PositionKey::File,
                index: None,
                value: Some("main.c"),
            })
        );
        // A symbol that merely looks like an alias is a value: the index
        // group requires digits only.
        assert_eq!(
            classify("fn=(below main)"),
            Line::CostPosition(PositionSpec {
                key: PositionKey::Function,
                index: None,
                value: Some("(below main)"),
            })
        );
    }

    #[test]
    fn test_fife_is_its_own_kind() {
        assert!(matches!(classify("fi=inline.h"), Line::FiFePosition(_)));
        assert!(matches!(classify("fe=main.c"), Line::FiFePosition(_)));
    }

    #[test]
    fn test_called_position_strips_prefix() {
        assert_eq!(
            classify("cfn=(2) callee"),
            Line::CalledPosition(PositionSpec {
                key: PositionKey::Function,
                index: Some("2"),
                value: Some("callee"),
            })
        );
        assert!(matches!(
            classify("cob=/usr/lib/libc.so"),
            Line::CalledPosition(PositionSpec {
                key: PositionKey::Object,
                ..
            })
        ));
        // cfe classifies; the assembler decides it is unsupported.
        assert!(matches!(
            classify("cfe=x.c"),
            Line::CalledPosition(PositionSpec {
                key: PositionKey::EndFile,
                ..
            })
        ));
    }

    #[test]
    fn test_cost_row_tokens() {
        assert_eq!(classify("42 100"), Line::CostRow(vec!["42", "100"]));
        assert_eq!(
            classify("* +2 -1 0x1F 7"),
            Line::CostRow(vec!["*", "+2", "-1", "0x1F", "7"])
        );
        // A stray word disqualifies the whole line.
        assert_eq!(classify("42 quack"), Line::Other);
    }

    #[test]
    fn test_position_wins_over_cost_row() {
        // `fn=12` contains only digits after the key but must stay a
        // position line.
        assert!(matches!(classify("fn=12"), Line::CostPosition(_)));
    }

    #[test]
    fn test_call_header() {
        assert_eq!(
            classify("calls=3 5"),
            Line::CallHeader {
                ncalls: "3",
                sub_positions: vec!["5"],
            }
        );
        assert_eq!(
            classify("calls=12 0x4000 88"),
            Line::CallHeader {
                ncalls: "12",
                sub_positions: vec!["0x4000", "88"],
            }
        );
    }

    #[test]
    fn test_empty_and_other() {
        assert_eq!(classify(""), Line::Empty);
        assert_eq!(classify("  \t "), Line::Empty);
        assert_eq!(classify("summary: 1234"), Line::Other);
        assert_eq!(classify("cmd: ./prog --flag"), Line::Other);
        assert_eq!(classify("# interval: 1000"), Line::Other);
        assert_eq!(classify("version: 1"), Line::Other);
    }
}
