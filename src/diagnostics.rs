//! Problem records and the sink boundary through which every lexical, macro,
//! conditional and expression diagnostic is routed. The sink decides whether
//! a reported problem aborts the scan or is collected while scanning goes on.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Lexical,
    Preprocessor,
    Expression,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProblemCode {
    BadCharacter,
    UnterminatedLiteral,
    UnterminatedComment,
    InvalidDirective,
    InvalidMacroDefinition,
    MacroRedefinition,
    MacroArgumentMismatch,
    MacroPasting,
    ExpressionEvaluation,
    ConditionalMisuse,
    UnterminatedConditional,
    InclusionNotFound,
    InclusionDepth,
    PoundError,
}

/// One reported diagnostic: what went wrong, and where.
#[derive(Clone, Debug)]
pub struct Problem {
    pub category: Category,
    pub code: ProblemCode,
    pub offset: usize,
    pub len: usize,
    pub line: usize,
    pub message: String,
}

impl Problem {
    pub fn new(
        category: Category,
        code: ProblemCode,
        offset: usize,
        len: usize,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code,
            offset,
            len,
            line,
            message: message.into(),
        }
    }

    /// Convert a refused problem into the error that aborts the scan.
    pub fn into_error(self) -> Error {
        let Self {
            code,
            line,
            message,
            ..
        } = self;
        match code {
            ProblemCode::BadCharacter
            | ProblemCode::UnterminatedLiteral
            | ProblemCode::UnterminatedComment => Error::Lexical { line, message },
            ProblemCode::InvalidDirective => Error::InvalidDirective { line, message },
            ProblemCode::InvalidMacroDefinition | ProblemCode::MacroPasting => {
                Error::MacroSyntax { line, message }
            }
            ProblemCode::MacroRedefinition => Error::MacroRedefinition { line, message },
            ProblemCode::MacroArgumentMismatch => Error::MacroArgumentCount { line, message },
            ProblemCode::ExpressionEvaluation => Error::ExpressionEvaluation { line, message },
            ProblemCode::ConditionalMisuse => Error::ConditionalSequence { line, message },
            ProblemCode::UnterminatedConditional => Error::UnterminatedConditional { line },
            ProblemCode::InclusionNotFound | ProblemCode::InclusionDepth => {
                Error::InclusionNotFound { line, message }
            }
            ProblemCode::PoundError => Error::ErrorDirective { line, message },
        }
    }
}

pub trait DiagnosticSink {
    /// Returns true to keep scanning, false to abort with this problem.
    fn accept(&mut self, problem: &Problem) -> bool;
}

/// The default sink: the first problem ends the scan.
pub struct AbortingSink;

impl DiagnosticSink for AbortingSink {
    fn accept(&mut self, _problem: &Problem) -> bool {
        false
    }
}

/// Records every problem and lets the scan continue. The handle is cheaply
/// cloneable so a caller can keep one end while the scanner owns the other.
#[derive(Clone, Default)]
pub struct CollectingSink {
    problems: Rc<RefCell<Vec<Problem>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn problems(&self) -> Vec<Problem> {
        self.problems.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.problems.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.borrow().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn accept(&mut self, problem: &Problem) -> bool {
        log::debug!("collected problem: {problem:?}");
        self.problems.borrow_mut().push(problem.clone());
        true
    }
}
