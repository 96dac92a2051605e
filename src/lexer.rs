//! Character-level scanning over the inclusion-context stack. The lexer knows
//! nothing about macros or directives; it turns bytes into classified tokens,
//! splices `\`-newline continuations, discards comments, and tracks the
//! line/column bookkeeping the scanner builds diagnostics from.
//!
//! Sources form a stack: `#include` pushes a context, end of an included
//! source pops back to the parent exactly where it left off. A token never
//! spans two sources.

use std::path::{Path, PathBuf};

use crate::diagnostics::{Category, Problem, ProblemCode};
use crate::token::{HideSet, Punct, Token, TokenKind};

#[derive(Clone, Copy, Debug)]
pub struct LexerConfig {
    /// Accept `$` in identifiers, a common vendor extension.
    pub dollar_in_identifiers: bool,
}

impl Default for LexerConfig {
    fn default() -> Self {
        Self {
            dollar_in_identifiers: true,
        }
    }
}

struct Context {
    text: Vec<u8>,
    pos: usize,
    line: usize,
    file: usize,
    /// Only whitespace and comments seen since the last newline.
    bol: bool,
}

pub struct Lexer {
    files: Vec<PathBuf>,
    stack: Vec<Context>,
    config: LexerConfig,
}

impl Lexer {
    pub fn new(text: &str, path: impl Into<PathBuf>, config: LexerConfig) -> Self {
        Self {
            files: vec![path.into()],
            stack: vec![Context {
                text: text.as_bytes().to_vec(),
                pos: 0,
                line: 1,
                file: 0,
                bol: true,
            }],
            config,
        }
    }

    /// A throwaway lexer over directive or replacement text. Tokens are
    /// stamped with the surrounding file and line; there is no directive
    /// recognition because fragments never reach the scanner's line logic.
    pub fn for_fragment(text: &str, file: usize, line: usize) -> Self {
        Self {
            files: Vec::new(),
            stack: vec![Context {
                text: text.as_bytes().to_vec(),
                pos: 0,
                line,
                file,
                bol: false,
            }],
            config: LexerConfig::default(),
        }
    }

    /// Lex an entire fragment, separating tokens from any lexical problems.
    pub fn tokenize_fragment(text: &str, file: usize, line: usize) -> (Vec<Token>, Vec<Problem>) {
        let mut lexer = Self::for_fragment(text, file, line);
        let mut tokens = Vec::new();
        let mut problems = Vec::new();
        loop {
            match lexer.next_token() {
                Ok(Some(token)) => tokens.push(token),
                Ok(None) => break,
                Err(problem) => problems.push(problem),
            }
        }
        (tokens, problems)
    }

    pub fn push_source(&mut self, text: &str, path: impl Into<PathBuf>) {
        self.files.push(path.into());
        self.stack.push(Context {
            text: text.as_bytes().to_vec(),
            pos: 0,
            line: 1,
            file: self.files.len() - 1,
            bol: true,
        });
    }

    /// Number of open sources, the top-level one included.
    pub fn source_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn set_dollar_in_identifiers(&mut self, enabled: bool) {
        self.config.dollar_in_identifiers = enabled;
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.files
            .get(self.top().file)
            .map(|path| path.as_path())
    }

    pub fn current_line(&self) -> usize {
        self.top().line
    }

    pub fn current_offset(&self) -> usize {
        self.top().pos
    }

    pub fn current_file_index(&self) -> usize {
        self.top().file
    }

    fn top(&self) -> &Context {
        self.stack.last().expect("at least one source")
    }

    fn top_mut(&mut self) -> &mut Context {
        self.stack.last_mut().expect("at least one source")
    }

    /// Consume `\`-newline splices at the read position. Physical lines are
    /// still counted; the logical line just keeps going.
    fn skip_splices(&mut self) {
        let ctx = self.top_mut();
        loop {
            if ctx.text.get(ctx.pos) != Some(&b'\\') {
                return;
            }
            match (ctx.text.get(ctx.pos + 1), ctx.text.get(ctx.pos + 2)) {
                (Some(b'\n'), _) => {
                    ctx.pos += 2;
                    ctx.line += 1;
                }
                (Some(b'\r'), Some(b'\n')) => {
                    ctx.pos += 3;
                    ctx.line += 1;
                }
                _ => return,
            }
        }
    }

    pub fn peek_char(&mut self) -> Option<u8> {
        self.skip_splices();
        let ctx = self.top();
        ctx.text.get(ctx.pos).copied()
    }

    pub fn bump_char(&mut self) -> Option<u8> {
        let c = self.peek_char()?;
        let ctx = self.top_mut();
        ctx.pos += 1;
        if c == b'\n' {
            ctx.line += 1;
            ctx.bol = true;
        }
        Some(c)
    }

    /// Splice-aware lookahead one past the current character.
    fn peek_second(&mut self) -> Option<u8> {
        let saved = {
            let ctx = self.top();
            (ctx.pos, ctx.line, ctx.bol)
        };
        self.bump_char()?;
        let second = self.peek_char();
        let ctx = self.top_mut();
        (ctx.pos, ctx.line, ctx.bol) = saved;
        second
    }

    fn top_at_end(&mut self) -> bool {
        self.skip_splices();
        let ctx = self.top();
        ctx.pos >= ctx.text.len()
    }

    fn problem(&self, code: ProblemCode, message: impl Into<String>) -> Problem {
        let category = match code {
            ProblemCode::BadCharacter
            | ProblemCode::UnterminatedLiteral
            | ProblemCode::UnterminatedComment => Category::Lexical,
            _ => Category::Preprocessor,
        };
        Problem::new(
            category,
            code,
            self.top().pos,
            1,
            self.top().line,
            message,
        )
    }

    /// Skip horizontal whitespace only; returns whether anything was skipped.
    pub fn skip_hspace(&mut self) -> bool {
        let mut skipped = false;
        while let Some(c) = self.peek_char() {
            if c == b' ' || c == b'\t' {
                self.bump_char();
                skipped = true;
            } else {
                break;
            }
        }
        skipped
    }

    /// Read an identifier at the current position; empty if none starts here.
    pub fn read_identifier(&mut self) -> String {
        let mut out = String::new();
        if let Some(c) = self.peek_char() {
            if self.is_ident_start(c) {
                out.push(self.bump_char().unwrap() as char);
                while let Some(c) = self.peek_char() {
                    if self.is_ident_continue(c) {
                        out.push(self.bump_char().unwrap() as char);
                    } else {
                        break;
                    }
                }
            }
        }
        out
    }

    fn is_ident_start(&self, c: u8) -> bool {
        c.is_ascii_alphabetic() || c == b'_' || (c == b'$' && self.config.dollar_in_identifiers)
    }

    fn is_ident_continue(&self, c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'_' || (c == b'$' && self.config.dollar_in_identifiers)
    }

    /// Whitespace and comments before the next token. Newlines keep the
    /// beginning-of-line flag; comments count as whitespace and do not
    /// disturb it.
    fn skip_blanks(&mut self) -> Result<bool, Problem> {
        let mut saw = false;
        loop {
            let Some(c) = self.peek_char() else {
                return Ok(saw);
            };
            match c {
                b' ' | b'\t' | b'\r' | 0x0B | 0x0C | b'\n' => {
                    self.bump_char();
                    saw = true;
                }
                b'/' => match self.peek_second() {
                    Some(b'/') => {
                        self.bump_char();
                        self.bump_char();
                        while let Some(c) = self.peek_char() {
                            if c == b'\n' {
                                break;
                            }
                            self.bump_char();
                        }
                        saw = true;
                    }
                    Some(b'*') => {
                        self.bump_char();
                        self.bump_char();
                        self.skip_block_comment()?;
                        saw = true;
                    }
                    _ => return Ok(saw),
                },
                _ => return Ok(saw),
            }
        }
    }

    /// Consume up to and including the closing `*/`; returns whether the
    /// comment crossed a newline.
    fn skip_block_comment(&mut self) -> Result<bool, Problem> {
        let start_line = self.top().line;
        loop {
            match self.bump_char() {
                None => {
                    return Err(self.problem(
                        ProblemCode::UnterminatedComment,
                        "unterminated block comment",
                    ))
                }
                Some(b'*') => {
                    if self.peek_char() == Some(b'/') {
                        self.bump_char();
                        return Ok(self.top().line != start_line);
                    }
                }
                Some(_) => {}
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, Problem> {
        let mut has_space = false;
        loop {
            has_space |= self.skip_blanks()?;
            if self.top_at_end() {
                if self.stack.len() > 1 {
                    self.stack.pop();
                    has_space = true;
                    continue;
                }
                return Ok(None);
            }
            break;
        }

        let first_on_line = self.top().bol;
        let offset = self.top().pos;
        let line = self.top().line;
        let file = self.top().file;
        let (kind, image) = self.lex_one()?;
        let len = self.top().pos.saturating_sub(offset);
        self.top_mut().bol = false;
        Ok(Some(Token {
            kind,
            image,
            offset,
            len,
            file,
            line,
            first_on_line,
            has_space,
            hideset: HideSet::default(),
        }))
    }

    fn lex_one(&mut self) -> Result<(TokenKind, String), Problem> {
        let c = self.peek_char().expect("caller checked for input");
        match c {
            b'"' => {
                self.bump_char();
                self.lex_string_tail(false)
            }
            b'\'' => {
                self.bump_char();
                self.lex_char_tail(false)
            }
            b'L' => match self.peek_second() {
                Some(b'"') => {
                    self.bump_char();
                    self.bump_char();
                    self.lex_string_tail(true)
                }
                Some(b'\'') => {
                    self.bump_char();
                    self.bump_char();
                    self.lex_char_tail(true)
                }
                _ => Ok(self.lex_identifier()),
            },
            c if self.is_ident_start(c) => Ok(self.lex_identifier()),
            c if c.is_ascii_digit() => Ok(self.lex_number()),
            b'.' => {
                if matches!(self.peek_second(), Some(d) if d.is_ascii_digit()) {
                    Ok(self.lex_number())
                } else {
                    Ok(self.lex_punct_or_other())
                }
            }
            _ => Ok(self.lex_punct_or_other()),
        }
    }

    fn lex_identifier(&mut self) -> (TokenKind, String) {
        (TokenKind::Identifier, self.read_identifier())
    }

    /// C-style numeric literal, greedy. The image keeps everything the
    /// automaton consumed, suffixes included.
    fn lex_number(&mut self) -> (TokenKind, String) {
        let mut image = String::new();
        let mut floating = false;
        let mut radix = 10u32;

        let first = self.bump_char().unwrap();
        image.push(first as char);
        if first == b'.' {
            floating = true;
        } else if first == b'0' {
            match self.peek_char() {
                Some(b'x') | Some(b'X') => {
                    image.push(self.bump_char().unwrap() as char);
                    radix = 16;
                }
                Some(b'b') | Some(b'B') => {
                    image.push(self.bump_char().unwrap() as char);
                    radix = 2;
                }
                _ => {}
            }
        }

        let digit_ok = |c: u8, radix: u32| -> bool {
            if radix == 16 {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            }
        };

        while let Some(c) = self.peek_char() {
            if digit_ok(c, radix) {
                image.push(self.bump_char().unwrap() as char);
            } else {
                break;
            }
        }

        if !floating && self.peek_char() == Some(b'.') {
            image.push(self.bump_char().unwrap() as char);
            floating = true;
            while let Some(c) = self.peek_char() {
                if digit_ok(c, radix) {
                    image.push(self.bump_char().unwrap() as char);
                } else {
                    break;
                }
            }
        }

        let is_exponent = |c: u8| -> bool {
            if radix == 16 {
                c == b'p' || c == b'P'
            } else {
                c == b'e' || c == b'E'
            }
        };
        if matches!(self.peek_char(), Some(c) if is_exponent(c)) {
            floating = true;
            image.push(self.bump_char().unwrap() as char);
            if matches!(self.peek_char(), Some(b'+') | Some(b'-')) {
                image.push(self.bump_char().unwrap() as char);
            }
            while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                image.push(self.bump_char().unwrap() as char);
            }
        }

        while matches!(
            self.peek_char(),
            Some(b'u') | Some(b'U') | Some(b'l') | Some(b'L') | Some(b'f') | Some(b'F')
        ) {
            image.push(self.bump_char().unwrap() as char);
        }

        let kind = if floating {
            TokenKind::Floating
        } else {
            TokenKind::Integer
        };
        (kind, image)
    }

    /// Body of a string literal, opening quote already consumed. The image is
    /// the raw text between the quotes; escape sequences are not decoded.
    fn lex_string_tail(&mut self, wide: bool) -> Result<(TokenKind, String), Problem> {
        let mut image = Vec::new();
        loop {
            let Some(c) = self.bump_char() else {
                return Err(self.problem(
                    ProblemCode::UnterminatedLiteral,
                    "unterminated string literal",
                ));
            };
            match c {
                b'"' => break,
                b'\n' => {
                    return Err(self.problem(
                        ProblemCode::UnterminatedLiteral,
                        "unterminated string literal",
                    ))
                }
                b'\\' => {
                    image.push(b'\\');
                    match self.bump_char() {
                        Some(escaped) => image.push(escaped),
                        None => {
                            return Err(self.problem(
                                ProblemCode::UnterminatedLiteral,
                                "unterminated string literal",
                            ))
                        }
                    }
                }
                other => image.push(other),
            }
        }
        let kind = if wide {
            TokenKind::WideStringLit
        } else {
            TokenKind::StringLit
        };
        Ok((kind, String::from_utf8_lossy(&image).into_owned()))
    }

    /// Character literals accept multiple characters; validation of the
    /// contents is not the lexer's business.
    fn lex_char_tail(&mut self, wide: bool) -> Result<(TokenKind, String), Problem> {
        let mut image = Vec::new();
        loop {
            let Some(c) = self.bump_char() else {
                return Err(self.problem(
                    ProblemCode::UnterminatedLiteral,
                    "unterminated character literal",
                ));
            };
            match c {
                b'\'' => break,
                b'\n' => {
                    return Err(self.problem(
                        ProblemCode::UnterminatedLiteral,
                        "unterminated character literal",
                    ))
                }
                b'\\' => {
                    image.push(b'\\');
                    match self.bump_char() {
                        Some(escaped) => image.push(escaped),
                        None => {
                            return Err(self.problem(
                                ProblemCode::UnterminatedLiteral,
                                "unterminated character literal",
                            ))
                        }
                    }
                }
                other => image.push(other),
            }
        }
        let kind = if wide {
            TokenKind::WideCharLit
        } else {
            TokenKind::CharLit
        };
        Ok((kind, String::from_utf8_lossy(&image).into_owned()))
    }

    fn lex_punct_or_other(&mut self) -> (TokenKind, String) {
        use Punct::*;
        let c = self.bump_char().unwrap();
        let punct = match c {
            b'(' => LParen,
            b')' => RParen,
            b'[' => LBracket,
            b']' => RBracket,
            b'{' => LBrace,
            b'}' => RBrace,
            b';' => Semi,
            b',' => Comma,
            b'?' => Question,
            b'~' => Tilde,
            b':' => {
                if self.peek_char() == Some(b':') {
                    self.bump_char();
                    ColonColon
                } else {
                    Colon
                }
            }
            b'+' => match self.peek_char() {
                Some(b'=') => {
                    self.bump_char();
                    PlusAssign
                }
                Some(b'+') => {
                    self.bump_char();
                    PlusPlus
                }
                _ => Plus,
            },
            b'-' => match self.peek_char() {
                Some(b'=') => {
                    self.bump_char();
                    MinusAssign
                }
                Some(b'-') => {
                    self.bump_char();
                    MinusMinus
                }
                Some(b'>') => {
                    self.bump_char();
                    if self.peek_char() == Some(b'*') {
                        self.bump_char();
                        ArrowStar
                    } else {
                        Arrow
                    }
                }
                _ => Minus,
            },
            b'*' => {
                if self.peek_char() == Some(b'=') {
                    self.bump_char();
                    StarAssign
                } else {
                    Star
                }
            }
            b'/' => {
                if self.peek_char() == Some(b'=') {
                    self.bump_char();
                    SlashAssign
                } else {
                    Slash
                }
            }
            b'%' => {
                if self.peek_char() == Some(b'=') {
                    self.bump_char();
                    PercentAssign
                } else {
                    Percent
                }
            }
            b'^' => {
                if self.peek_char() == Some(b'=') {
                    self.bump_char();
                    CaretAssign
                } else {
                    Caret
                }
            }
            b'&' => match self.peek_char() {
                Some(b'=') => {
                    self.bump_char();
                    AmpAssign
                }
                Some(b'&') => {
                    self.bump_char();
                    AmpAmp
                }
                _ => Amp,
            },
            b'|' => match self.peek_char() {
                Some(b'=') => {
                    self.bump_char();
                    PipeAssign
                }
                Some(b'|') => {
                    self.bump_char();
                    PipePipe
                }
                _ => Pipe,
            },
            b'!' => {
                if self.peek_char() == Some(b'=') {
                    self.bump_char();
                    BangEq
                } else {
                    Bang
                }
            }
            b'=' => {
                if self.peek_char() == Some(b'=') {
                    self.bump_char();
                    EqEq
                } else {
                    Assign
                }
            }
            b'<' => match self.peek_char() {
                Some(b'<') => {
                    self.bump_char();
                    if self.peek_char() == Some(b'=') {
                        self.bump_char();
                        ShiftLeftAssign
                    } else {
                        ShiftLeft
                    }
                }
                Some(b'=') => {
                    self.bump_char();
                    LessEq
                }
                _ => Less,
            },
            b'>' => match self.peek_char() {
                Some(b'>') => {
                    self.bump_char();
                    if self.peek_char() == Some(b'=') {
                        self.bump_char();
                        ShiftRightAssign
                    } else {
                        ShiftRight
                    }
                }
                Some(b'=') => {
                    self.bump_char();
                    GreaterEq
                }
                _ => Greater,
            },
            b'.' => match self.peek_char() {
                Some(b'*') => {
                    self.bump_char();
                    DotStar
                }
                Some(b'.') => {
                    if self.peek_second() == Some(b'.') {
                        self.bump_char();
                        self.bump_char();
                        Ellipsis
                    } else {
                        Dot
                    }
                }
                _ => Dot,
            },
            b'#' => {
                if self.peek_char() == Some(b'#') {
                    self.bump_char();
                    HashHash
                } else {
                    Hash
                }
            }
            other => {
                let ch = other as char;
                return (TokenKind::Other(ch), ch.to_string());
            }
        };
        (TokenKind::Punct(punct), punct.as_str().to_string())
    }

    /// The raw remainder of the current logical line: comments elided,
    /// continuations spliced, string and character literals protected. Stops
    /// before the terminating newline (which stays in the input), or at the
    /// end of a block comment that crossed one.
    pub fn rest_of_line(&mut self) -> String {
        let mut out = Vec::new();
        let mut in_string = false;
        let mut in_char = false;
        loop {
            let Some(c) = self.peek_char() else { break };
            match c {
                b'\n' => break,
                b'\r' => {
                    self.bump_char();
                }
                b'/' if !in_string && !in_char => match self.peek_second() {
                    Some(b'/') => {
                        self.bump_char();
                        self.bump_char();
                        while let Some(c) = self.peek_char() {
                            if c == b'\n' {
                                break;
                            }
                            self.bump_char();
                        }
                        break;
                    }
                    Some(b'*') => {
                        self.bump_char();
                        self.bump_char();
                        match self.skip_block_comment() {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(_) => break,
                        }
                    }
                    _ => {
                        self.bump_char();
                        out.push(b'/');
                    }
                },
                b'\\' => {
                    // a real backslash (continuations were spliced away);
                    // an escaped quote must not toggle the literal state
                    self.bump_char();
                    out.push(b'\\');
                    if matches!(self.peek_char(), Some(b'"') | Some(b'\'')) {
                        out.push(self.bump_char().unwrap());
                    }
                }
                b'"' if !in_char => {
                    self.bump_char();
                    in_string = !in_string;
                    out.push(b'"');
                }
                b'\'' if !in_string => {
                    self.bump_char();
                    in_char = !in_char;
                    out.push(b'\'');
                }
                other => {
                    self.bump_char();
                    out.push(other);
                }
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Discard the remainder of the line, the newline included.
    pub fn skip_rest_of_line(&mut self) {
        while let Some(c) = self.bump_char() {
            if c == b'\n' {
                break;
            }
        }
    }

    /// Fast-forward through an inactive conditional region to the next `#`
    /// that begins a logical line. Comments are honored so a `#endif` inside
    /// one stays inert. Returns false when all input is exhausted first.
    pub fn skip_inactive_until_pound(&mut self) -> bool {
        loop {
            if self.top_at_end() {
                if self.stack.len() > 1 {
                    self.stack.pop();
                    continue;
                }
                return false;
            }
            let Some(c) = self.peek_char() else { continue };
            match c {
                b'\n' | b' ' | b'\t' | b'\r' => {
                    self.bump_char();
                }
                b'/' => match self.peek_second() {
                    Some(b'/') => {
                        self.bump_char();
                        self.bump_char();
                        while let Some(c) = self.peek_char() {
                            if c == b'\n' {
                                break;
                            }
                            self.bump_char();
                        }
                    }
                    Some(b'*') => {
                        self.bump_char();
                        self.bump_char();
                        if self.skip_block_comment().is_err() {
                            // unterminated comment at end of input; the outer
                            // loop will pop or stop
                        }
                    }
                    _ => {
                        self.bump_char();
                        self.top_mut().bol = false;
                    }
                },
                b'#' => {
                    let at_line_start = self.top().bol;
                    self.bump_char();
                    if at_line_start {
                        return true;
                    }
                    self.top_mut().bol = false;
                }
                _ => {
                    self.bump_char();
                    self.top_mut().bol = false;
                }
            }
        }
    }
}
