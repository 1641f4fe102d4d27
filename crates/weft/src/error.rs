use std::cell::RefCell;

use crate::rule::SharedStr;

/// Error signaled by an action runner, see [`crate::action::ActionRunner`].
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("unknown production `{name}` referenced at {position}")]
    UnresolvedIdentifier { name: SharedStr, position: u32 },
    #[error("identifier `{name}` at {position} targets production #{index}, but the grammar has {len}")]
    InvalidTarget {
        name: SharedStr,
        position: u32,
        index: u32,
        len: usize,
    },
    #[error("duplicate production `{name}` at {position}")]
    DuplicateProduction { name: SharedStr, position: u32 },
    #[error("start production #{index} is out of range, the grammar has {len}")]
    StartOutOfRange { index: u32, len: usize },
    #[error("unknown start production `{name}`")]
    UnknownStart { name: String },
    #[error("unknown command `{name}` at {position}")]
    UnknownCommand { name: SharedStr, position: u32 },
    #[error("malformed `{name}` command at {position}: {reason}")]
    MalformedCommand {
        name: SharedStr,
        position: u32,
        reason: &'static str,
    },
    #[error("invalid width {width} for `{name}` at {position}, expected 1, 2, 3, 4 or 8")]
    InvalidDecodeWidth {
        name: SharedStr,
        width: u64,
        position: u32,
    },
    #[error("repetition at {position} requires {min} matches but allows at most {max}")]
    InvalidTimes { min: u32, max: u32, position: u32 },
    #[error("invalid range {low:#X}..={high:#X} at {position}")]
    InvalidRange { low: u32, high: u32, position: u32 },
}

/// Every problem found while building a grammar.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{}", display_all(.0))]
pub struct GrammarErrors(pub Vec<GrammarError>);

fn display_all(errors: &[GrammarError]) -> String {
    let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
    lines.join("\n")
}

impl GrammarErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, GrammarError> {
        self.0.iter()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    /// Line and column are one-based, column counts unicode code points.
    #[error("could not parse all input, furthest match at {line}:{column} (offset {offset})")]
    Incomplete { offset: u32, line: u32, column: u32 },
    #[error("input of {len} bytes is too large")]
    InputTooLarge { len: usize },
}

impl ParseError {
    pub fn offset(&self) -> Option<u32> {
        match self {
            ParseError::Incomplete { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("action {{{body}}} at {position} failed: {source}")]
    Action {
        position: u32,
        body: SharedStr,
        source: ActionError,
    },
}

#[derive(Default)]
pub struct ErrorAccumulator {
    errors: RefCell<Vec<GrammarError>>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn error(&self, err: GrammarError) {
        self.errors.borrow_mut().push(err);
    }
    pub fn finish(self) -> Result<(), GrammarErrors> {
        let errors = self.errors.into_inner();
        match errors.is_empty() {
            true => Ok(()),
            false => Err(GrammarErrors(errors)),
        }
    }
}
