use std::io::Write;
use std::path::PathBuf;

use error::GetExitCode;
use token::Language;

pub mod conditional;
pub mod diagnostics;
pub mod error;
pub mod expression;
pub mod include;
pub mod lexer;
pub mod macros;
pub mod scanner;
pub mod token;

pub use diagnostics::{CollectingSink, DiagnosticSink, Problem};
pub use error::{Error, Result};
pub use scanner::{ScanMode, Scanner};
pub use token::{Token, TokenKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LanguageArg {
    C,
    #[default]
    #[value(name = "c++")]
    Cpp,
}

impl From<LanguageArg> for Language {
    fn from(value: LanguageArg) -> Self {
        match value {
            LanguageArg::C => Language::C,
            LanguageArg::Cpp => Language::Cpp,
        }
    }
}

#[derive(Debug, clap::Parser, Clone)]
#[command(version, about)]
pub struct Args {
    /// `name[=value]`
    ///
    /// Predefine `name` as an object-style macro; the value defaults to
    /// empty when `=value` is omitted.
    #[arg(short = 'D', long = "define")]
    pub define: Vec<String>,
    /// Remove any predefinition of `name`.
    #[arg(short = 'U', long = "undefine")]
    pub undefine: Vec<String>,
    /// Append a directory to the include search path.
    #[arg(short = 'I', long = "include-dir")]
    pub include_dir: Vec<PathBuf>,
    /// Source language variant.
    #[arg(long, value_enum, default_value = "c++")]
    pub language: LanguageArg,
    /// Input files.
    pub files: Vec<PathBuf>,
}

/// Scan each input file and write the expanded token stream to `stdout`,
/// one space-separated line of tokens per source line. Problems go through a
/// collecting sink to stderr so a bad directive does not stop the run.
pub fn run<W: Write>(mut stdout: W, args: Args) -> Result<()> {
    for path in &args.files {
        let text = std::fs::read_to_string(path)?;
        let mut scanner = Scanner::new(&text, path.clone());
        scanner.set_language(args.language.into());
        for dir in &args.include_dir {
            scanner.add_include_path(dir.clone());
        }
        for define in &args.define {
            let (name, value) = match define.split_once('=') {
                Some((name, value)) => (name, value),
                None => (define.as_str(), ""),
            };
            scanner.define_object(name, value);
        }
        for name in &args.undefine {
            scanner.undefine(name);
        }

        let sink = CollectingSink::new();
        scanner.set_sink(Box::new(sink.clone()));

        let result = write_tokens(&mut stdout, &mut scanner);
        for problem in sink.problems() {
            eprintln!("{}: line {}: {}", path.display(), problem.line, problem.message);
        }
        result?;
    }
    Ok(())
}

fn write_tokens<W: Write>(out: &mut W, scanner: &mut Scanner) -> Result<()> {
    let mut line = 0;
    let mut first = true;
    while let Some(token) = scanner.next_token()? {
        if token.line != line && !first {
            writeln!(out)?;
        } else if !first {
            write!(out, " ")?;
        }
        line = token.line;
        first = false;
        write!(out, "{}", token.spelling())?;
    }
    if !first {
        writeln!(out)?;
    }
    Ok(())
}

/// Exit-code mapping for the binary.
pub fn exit_code(result: &Result<()>) -> i32 {
    result.get_exit_code()
}
