#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("lexical error at line {line}: {message}")]
    Lexical { line: usize, message: String },
    #[error("macro redefinition at line {line}: {message}")]
    MacroRedefinition { line: usize, message: String },
    #[error("macro argument mismatch at line {line}: {message}")]
    MacroArgumentCount { line: usize, message: String },
    #[error("invalid macro definition at line {line}: {message}")]
    MacroSyntax { line: usize, message: String },
    #[error("conditional directive misuse at line {line}: {message}")]
    ConditionalSequence { line: usize, message: String },
    #[error("unterminated conditional opened at line {line}")]
    UnterminatedConditional { line: usize },
    #[error("cannot evaluate expression at line {line}: {message}")]
    ExpressionEvaluation { line: usize, message: String },
    #[error("inclusion failed at line {line}: {message}")]
    InclusionNotFound { line: usize, message: String },
    #[error("#error at line {line}: {message}")]
    ErrorDirective { line: usize, message: String },
    #[error("invalid preprocessor directive at line {line}: {message}")]
    InvalidDirective { line: usize, message: String },
    #[error("scan cancelled")]
    Cancelled,
    #[error("error processing io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait GetExitCode {
    fn get_exit_code(&self) -> i32;
}

impl<T> GetExitCode for Result<T> {
    fn get_exit_code(&self) -> i32 {
        match self {
            Ok(_) => 0,
            Err(_) => 1,
        }
    }
}
