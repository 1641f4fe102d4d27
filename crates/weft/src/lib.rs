pub mod action;
pub mod command;
pub mod compile;
pub mod cursor;
pub mod display;
pub mod error;
pub mod grammar;
pub mod interpret;
pub mod linemap;
pub mod memo;
pub mod rule;
pub mod value;

mod resolve;

pub use action::{ActionContext, ActionRunner, ClosureTable};
pub use compile::{compile, Compiled, Compiler};
pub use error::{ActionError, CompileError, GrammarError, GrammarErrors, ParseError};
pub use grammar::{Grammar, GrammarDef, Production, ProductionDef, ProductionHandle, StartRef};
pub use interpret::{interpret, Options, DEFAULT_SPACING, UNBOUNDED_TIMES};
pub use rule::{RangeUnit, Rule, RuleKind, Text};
pub use value::{Accumulator, KeyShape, Value};
