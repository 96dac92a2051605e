//! The preprocessor proper. One `Scanner` per translation unit pulls raw
//! tokens from the lexer, processes `#`-directives, expands macros (replayed
//! through a pending queue so expansion output is rescanned), gates token
//! emission on the conditional branch tracker, and hands the survivors to the
//! consumer one token at a time.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::conditional::BranchTracker;
use crate::diagnostics::{AbortingSink, Category, DiagnosticSink, Problem, ProblemCode};
use crate::error::{Error, Result};
use crate::expression;
use crate::include::{FileResolver, IncludeResolver};
use crate::lexer::{Lexer, LexerConfig};
use crate::macros::{DefineOutcome, Expander, MacroDefinition, MacroTable};
use crate::token::{lookup_keyword, HideSet, Language, Punct, Token, TokenKind};

/// Quick mode records inclusions without opening them and accepts macro
/// redefinitions; complete mode resolves and enforces. Both evaluate
/// conditionals for real.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanMode {
    Quick,
    #[default]
    Complete,
}

#[derive(Clone, Copy, Debug)]
enum Directive {
    Define,
    Undef,
    Include,
    If,
    Ifdef,
    Ifndef,
    Elif,
    Else,
    Endif,
    Error,
    Pragma,
    Line,
}

static DIRECTIVES: Lazy<HashMap<&'static str, Directive>> = Lazy::new(|| {
    HashMap::from([
        ("define", Directive::Define),
        ("undef", Directive::Undef),
        ("include", Directive::Include),
        ("if", Directive::If),
        ("ifdef", Directive::Ifdef),
        ("ifndef", Directive::Ifndef),
        ("elif", Directive::Elif),
        ("else", Directive::Else),
        ("endif", Directive::Endif),
        ("error", Directive::Error),
        ("pragma", Directive::Pragma),
        ("line", Directive::Line),
    ])
});

const MAX_INCLUDE_DEPTH: usize = 100;

pub struct Scanner {
    lexer: Lexer,
    macros: MacroTable,
    branches: BranchTracker,
    pending: VecDeque<Token>,
    sink: Box<dyn DiagnosticSink>,
    resolver: Box<dyn IncludeResolver>,
    include_paths: Vec<PathBuf>,
    language: Language,
    mode: ScanMode,
    /// Composed branch activity; false while inside a dead conditional arm.
    active: bool,
    count: usize,
    inclusions: Vec<String>,
    cancel: Option<Arc<AtomicBool>>,
    end_diagnosed: bool,
}

impl Scanner {
    pub fn new(source: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            lexer: Lexer::new(source, path, LexerConfig::default()),
            macros: MacroTable::new(),
            branches: BranchTracker::new(),
            pending: VecDeque::new(),
            sink: Box::new(AbortingSink),
            resolver: Box::new(FileResolver),
            include_paths: Vec::new(),
            language: Language::default(),
            mode: ScanMode::default(),
            active: true,
            count: 0,
            inclusions: Vec::new(),
            cancel: None,
            end_diagnosed: false,
        }
    }

    pub fn set_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.sink = sink;
    }

    pub fn set_resolver(&mut self, resolver: Box<dyn IncludeResolver>) {
        self.resolver = resolver;
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn set_mode(&mut self, mode: ScanMode) {
        self.mode = mode;
    }

    /// Cooperative cancellation: the flag is checked at token boundaries and
    /// aborts the whole scan when raised.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    /// Accept `$` in identifiers (on by default).
    pub fn set_dollar_in_identifiers(&mut self, enabled: bool) {
        self.lexer.set_dollar_in_identifiers(enabled);
    }

    pub fn add_include_path(&mut self, path: impl Into<PathBuf>) {
        self.include_paths.push(path.into());
    }

    /// Pre-seed an object-style definition, the `-D name=value` surface.
    pub fn define_object(&mut self, name: &str, value: &str) {
        let (tokens, problems) = Lexer::tokenize_fragment(value, 0, 0);
        for problem in problems {
            log::warn!("problem in predefined macro {name}: {}", problem.message);
        }
        self.macros
            .define(MacroDefinition::object(name, tokens, value));
    }

    pub fn undefine(&mut self, name: &str) {
        self.macros.undefine(name);
    }

    /// Current conditional nesting depth; zero again at a balanced end of
    /// translation unit.
    pub fn depth(&self) -> usize {
        self.branches.depth()
    }

    /// Monotonic count of tokens handed to the consumer.
    pub fn token_count(&self) -> usize {
        self.count
    }

    /// Include names seen (and in complete mode entered), in order.
    pub fn inclusions(&self) -> &[String] {
        &self.inclusions
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// Replacement text of a live macro, for table introspection.
    pub fn definition_text(&self, name: &str) -> Option<String> {
        self.macros.definition_text(name)
    }

    /// The public stream. `None` is the ordinary end of the translation
    /// unit; errors are problems the sink refused or terminal failures.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        let Some(mut tok) = self.next_expanded()? else {
            return Ok(None);
        };
        // adjacent string literals of one width merge into a single token
        if matches!(tok.kind, TokenKind::StringLit | TokenKind::WideStringLit) {
            loop {
                let Some(next) = self.next_expanded()? else {
                    break;
                };
                if next.kind == tok.kind {
                    tok.image.push_str(&next.image);
                } else {
                    self.pending.push_front(next);
                    break;
                }
            }
        }
        self.count += 1;
        Ok(Some(tok))
    }

    /// Drain the whole stream.
    pub fn scan(&mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        while let Some(tok) = self.next_token()? {
            out.push(tok);
        }
        Ok(out)
    }

    fn next_expanded(&mut self) -> Result<Option<Token>> {
        loop {
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
            }

            if !self.active {
                // inside a dead arm only directives matter
                if !self.lexer.skip_inactive_until_pound() {
                    return self.end_of_source();
                }
                self.handle_directive()?;
                continue;
            }

            let Some(tok) = self.fetch()? else {
                return self.end_of_source();
            };

            if tok.is_punct(Punct::Hash) && tok.first_on_line {
                self.handle_directive()?;
                continue;
            }

            match tok.kind {
                TokenKind::Identifier => {
                    if self.try_expand(&tok)? {
                        continue;
                    }
                    let mut tok = tok;
                    if let Some(keyword) = lookup_keyword(&tok.image, self.language) {
                        tok.kind = TokenKind::Keyword(keyword);
                    }
                    return Ok(Some(tok));
                }
                TokenKind::Other(ch) => {
                    self.report(Problem::new(
                        Category::Lexical,
                        ProblemCode::BadCharacter,
                        tok.offset,
                        tok.len.max(1),
                        tok.line,
                        format!("unexpected character `{ch}`"),
                    ))?;
                    // dropped when the sink keeps going
                }
                _ => return Ok(Some(tok)),
            }
        }
    }

    /// Next token from the replay queue or, failing that, the lexer.
    fn fetch(&mut self) -> Result<Option<Token>> {
        if let Some(tok) = self.pending.pop_front() {
            return Ok(Some(tok));
        }
        loop {
            match self.lexer.next_token() {
                Ok(tok) => return Ok(tok),
                Err(problem) => self.report(problem)?,
            }
        }
    }

    fn end_of_source(&mut self) -> Result<Option<Token>> {
        if self.branches.depth() != 0 && !self.end_diagnosed {
            self.end_diagnosed = true;
            let line = self.branches.unterminated_line().unwrap_or(0);
            let problem = Problem::new(
                Category::Preprocessor,
                ProblemCode::UnterminatedConditional,
                self.lexer.current_offset(),
                1,
                line,
                format!("conditional opened at line {line} is never closed"),
            );
            let _ = self.sink.accept(&problem);
            return Err(Error::UnterminatedConditional { line });
        }
        Ok(None)
    }

    fn report(&mut self, problem: Problem) -> Result<()> {
        log::debug!(
            "problem at line {}: {} ({:?})",
            problem.line,
            problem.message,
            problem.code
        );
        if self.sink.accept(&problem) {
            Ok(())
        } else {
            Err(problem.into_error())
        }
    }

    fn problem(
        &self,
        code: ProblemCode,
        offset: usize,
        line: usize,
        message: impl Into<String>,
    ) -> Problem {
        let category = match code {
            ProblemCode::ExpressionEvaluation => Category::Expression,
            _ => Category::Preprocessor,
        };
        Problem::new(category, code, offset, 1, line, message)
    }

    /// Attempt macro expansion of an identifier token. True means the token
    /// was consumed (its expansion, possibly empty, is queued for replay).
    fn try_expand(&mut self, tok: &Token) -> Result<bool> {
        if tok.hideset.contains(&tok.image) {
            return Ok(false);
        }
        let Some(def) = self.macros.lookup(&tok.image) else {
            return Ok(false);
        };

        if def.is_object() {
            let result = Expander::new(&self.macros).expand_object(&def, tok);
            match result {
                Ok(body) => self.replay(body),
                Err(problem) => self.report(problem)?,
            }
            return Ok(true);
        }

        // function-style: no parenthesis, no invocation
        let next = self.fetch()?;
        let Some(next) = next else {
            return Ok(false);
        };
        if !next.is_punct(Punct::LParen) {
            self.pending.push_front(next);
            return Ok(false);
        }

        let Some((args, rparen_hideset)) = self.collect_arguments(tok)? else {
            // problem already reported; the invocation yields nothing
            return Ok(true);
        };
        let result = Expander::new(&self.macros).expand_function(&def, tok, args, &rparen_hideset);
        match result {
            Ok(body) => self.replay(body),
            Err(problem) => self.report(problem)?,
        }
        Ok(true)
    }

    fn replay(&mut self, body: Vec<Token>) {
        for tok in body.into_iter().rev() {
            self.pending.push_front(tok);
        }
    }

    /// Collect comma-separated argument lists from the live stream, honoring
    /// nested parentheses; arguments may span lines.
    fn collect_arguments(
        &mut self,
        invocation: &Token,
    ) -> Result<Option<(Vec<Vec<Token>>, HideSet)>> {
        let mut depth = 1usize;
        let mut args: Vec<Vec<Token>> = vec![Vec::new()];
        loop {
            let Some(tok) = self.fetch()? else {
                self.report(Problem::new(
                    Category::Preprocessor,
                    ProblemCode::MacroArgumentMismatch,
                    invocation.offset,
                    invocation.len.max(1),
                    invocation.line,
                    format!(
                        "unterminated argument list for macro `{}`",
                        invocation.image
                    ),
                ))?;
                return Ok(None);
            };
            match tok.kind {
                TokenKind::Punct(Punct::LParen) => {
                    depth += 1;
                    args.last_mut().unwrap().push(tok);
                }
                TokenKind::Punct(Punct::RParen) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Some((args, tok.hideset)));
                    }
                    args.last_mut().unwrap().push(tok);
                }
                TokenKind::Punct(Punct::Comma) if depth == 1 => args.push(Vec::new()),
                _ => args.last_mut().unwrap().push(tok),
            }
        }
    }

    // --- directives -------------------------------------------------------

    fn handle_directive(&mut self) -> Result<()> {
        let line = self.lexer.current_line();
        let offset = self.lexer.current_offset();
        self.lexer.skip_hspace();
        let name = self.lexer.read_identifier();

        if name.is_empty() {
            // a lone `#` is the null directive; anything else after it is not
            let rest = self.lexer.rest_of_line();
            let rest = rest.trim().to_string();
            if !rest.is_empty() && self.active {
                let problem = self.problem(
                    ProblemCode::InvalidDirective,
                    offset,
                    line,
                    format!("invalid preprocessor directive `# {rest}`"),
                );
                self.report(problem)?;
            }
            return Ok(());
        }

        let Some(directive) = DIRECTIVES.get(name.as_str()).copied() else {
            if self.active {
                let problem = self.problem(
                    ProblemCode::InvalidDirective,
                    offset,
                    line,
                    format!("unknown preprocessor directive `#{name}`"),
                );
                self.report(problem)?;
            }
            self.lexer.skip_rest_of_line();
            return Ok(());
        };

        log::trace!("directive #{name} at line {line}");
        match directive {
            Directive::Define => self.pound_define(offset, line),
            Directive::Undef => self.pound_undef(),
            Directive::Include => self.pound_include(offset, line),
            Directive::If => self.pound_if(line),
            Directive::Ifdef => self.pound_ifdef(line, false),
            Directive::Ifndef => self.pound_ifdef(line, true),
            Directive::Elif => self.pound_elif(offset, line),
            Directive::Else => self.pound_else(offset, line),
            Directive::Endif => self.pound_endif(offset, line),
            Directive::Error => self.pound_error(offset, line),
            Directive::Pragma | Directive::Line => {
                self.lexer.skip_rest_of_line();
                Ok(())
            }
        }
    }

    fn pound_define(&mut self, offset: usize, line: usize) -> Result<()> {
        if !self.active {
            self.lexer.skip_rest_of_line();
            return Ok(());
        }
        self.lexer.skip_hspace();
        let name = self.lexer.read_identifier();
        if name.is_empty() {
            let problem = self.problem(
                ProblemCode::InvalidMacroDefinition,
                offset,
                line,
                "macro name must be an identifier",
            );
            self.report(problem)?;
            self.lexer.skip_rest_of_line();
            return Ok(());
        }

        let def = match self.lexer.peek_char() {
            // a parenthesis directly after the name (no whitespace) opens
            // the parameter list
            Some(b'(') => {
                self.lexer.bump_char();
                let Some((params, variadic)) = self.read_macro_params(offset, line, &name)? else {
                    return Ok(());
                };
                self.lexer.skip_hspace();
                let text = self.lexer.rest_of_line().trim_end().to_string();
                let replacement = self.tokenize_replacement(&text, line);
                if let Some(message) =
                    validate_function_replacement(&name, &params, variadic, &replacement)
                {
                    let problem =
                        self.problem(ProblemCode::InvalidMacroDefinition, offset, line, message);
                    self.report(problem)?;
                    return Ok(());
                }
                MacroDefinition::function(name.clone(), params, variadic, replacement, text)
            }
            None | Some(b'\n') | Some(b'\r') | Some(b' ') | Some(b'\t') | Some(b'/') => {
                self.lexer.skip_hspace();
                let text = self.lexer.rest_of_line().trim_end().to_string();
                let replacement = self.tokenize_replacement(&text, line);
                if let Some(message) = validate_object_replacement(&name, &replacement) {
                    let problem =
                        self.problem(ProblemCode::InvalidMacroDefinition, offset, line, message);
                    self.report(problem)?;
                    return Ok(());
                }
                MacroDefinition::object(name.clone(), replacement, text)
            }
            Some(other) => {
                let problem = self.problem(
                    ProblemCode::InvalidMacroDefinition,
                    offset,
                    line,
                    format!(
                        "unexpected `{}` after macro name `{name}`",
                        other as char
                    ),
                );
                self.report(problem)?;
                self.lexer.skip_rest_of_line();
                return Ok(());
            }
        };

        if let DefineOutcome::Replaced { previous } = self.macros.define(def) {
            if self.mode == ScanMode::Complete {
                let problem = self.problem(
                    ProblemCode::MacroRedefinition,
                    offset,
                    line,
                    format!("macro `{name}` redefined; previous replacement was `{previous}`"),
                );
                self.report(problem)?;
            }
        }
        Ok(())
    }

    /// Parameter list at character level; the closing parenthesis must
    /// arrive before the end of the logical line.
    fn read_macro_params(
        &mut self,
        offset: usize,
        line: usize,
        name: &str,
    ) -> Result<Option<(Vec<String>, bool)>> {
        let mut text = String::new();
        loop {
            match self.lexer.bump_char() {
                None => {
                    let problem = self.problem(
                        ProblemCode::InvalidMacroDefinition,
                        offset,
                        line,
                        format!("unterminated parameter list in definition of macro `{name}`"),
                    );
                    self.report(problem)?;
                    return Ok(None);
                }
                Some(b')') => break,
                Some(b'\n') => {
                    let problem = self.problem(
                        ProblemCode::InvalidMacroDefinition,
                        offset,
                        line,
                        format!("unterminated parameter list in definition of macro `{name}`"),
                    );
                    self.report(problem)?;
                    return Ok(None);
                }
                Some(c) => text.push(c as char),
            }
        }

        let mut params = Vec::new();
        let mut variadic = false;
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            let pieces: Vec<&str> = trimmed.split(',').map(str::trim).collect();
            for (index, piece) in pieces.iter().enumerate() {
                if *piece == "..." {
                    if index + 1 != pieces.len() {
                        let problem = self.problem(
                            ProblemCode::InvalidMacroDefinition,
                            offset,
                            line,
                            format!("`...` must be the last parameter of macro `{name}`"),
                        );
                        self.report(problem)?;
                        return Ok(None);
                    }
                    variadic = true;
                } else if is_identifier(piece) {
                    params.push(piece.to_string());
                } else {
                    let problem = self.problem(
                        ProblemCode::InvalidMacroDefinition,
                        offset,
                        line,
                        format!("invalid parameter `{piece}` in definition of macro `{name}`"),
                    );
                    self.report(problem)?;
                    return Ok(None);
                }
            }
        }
        Ok(Some((params, variadic)))
    }

    /// Replacement lists are tokenized eagerly. Lexical trouble inside one
    /// surfaces when (and if) the macro is actually used, so problems here
    /// are only logged.
    fn tokenize_replacement(&self, text: &str, line: usize) -> Vec<Token> {
        let (tokens, problems) =
            Lexer::tokenize_fragment(text, self.lexer.current_file_index(), line);
        for problem in problems {
            log::debug!("ignoring problem in replacement list: {}", problem.message);
        }
        tokens
    }

    fn pound_undef(&mut self) -> Result<()> {
        if !self.active {
            self.lexer.skip_rest_of_line();
            return Ok(());
        }
        self.lexer.skip_hspace();
        let name = self.lexer.read_identifier();
        if !name.is_empty() {
            self.macros.undefine(&name);
        }
        self.lexer.skip_rest_of_line();
        Ok(())
    }

    fn pound_if(&mut self, line: usize) -> Result<()> {
        let text = self.lexer.rest_of_line();
        let condition = if self.active {
            match self.eval_condition(&text, line) {
                Ok(value) => value,
                Err(problem) => {
                    self.report(problem)?;
                    false
                }
            }
        } else {
            false
        };
        self.active = self.branches.push_if(condition, line);
        Ok(())
    }

    fn pound_ifdef(&mut self, line: usize, negated: bool) -> Result<()> {
        self.lexer.skip_hspace();
        let name = self.lexer.read_identifier();
        let defined = !name.is_empty() && self.macros.is_defined(&name);
        let condition = if negated { !defined } else { defined };
        self.active = self.branches.push_if(condition, line);
        self.lexer.skip_rest_of_line();
        Ok(())
    }

    fn pound_elif(&mut self, offset: usize, line: usize) -> Result<()> {
        let text = self.lexer.rest_of_line();
        let condition = if self.branches.enclosing_active() {
            if text.trim().is_empty() {
                let problem = self.problem(
                    ProblemCode::InvalidDirective,
                    offset,
                    line,
                    "#elif with no controlling expression",
                );
                self.report(problem)?;
                false
            } else {
                match self.eval_condition(&text, line) {
                    Ok(value) => value,
                    Err(problem) => {
                        self.report(problem)?;
                        false
                    }
                }
            }
        } else {
            false
        };
        match self.branches.elif(condition, line) {
            Ok(active) => {
                self.active = active;
                Ok(())
            }
            Err(err) => self.conditional_misuse(err, offset, line),
        }
    }

    fn pound_else(&mut self, offset: usize, line: usize) -> Result<()> {
        self.lexer.skip_rest_of_line();
        match self.branches.else_(line) {
            Ok(active) => {
                self.active = active;
                Ok(())
            }
            Err(err) => self.conditional_misuse(err, offset, line),
        }
    }

    fn pound_endif(&mut self, offset: usize, line: usize) -> Result<()> {
        let rest = self.lexer.rest_of_line();
        if !rest.trim().is_empty() {
            let problem = self.problem(
                ProblemCode::InvalidDirective,
                offset,
                line,
                format!("extra tokens after #endif: `{}`", rest.trim()),
            );
            self.report(problem)?;
        }
        match self.branches.endif(line) {
            Ok(active) => {
                self.active = active;
                Ok(())
            }
            Err(err) => self.conditional_misuse(err, offset, line),
        }
    }

    /// Stray `#elif`/`#else`/`#endif` and duplicate `#else` are terminal:
    /// the sink is told, but the scan ends regardless.
    fn conditional_misuse(&mut self, err: Error, offset: usize, line: usize) -> Result<()> {
        let problem = self.problem(
            ProblemCode::ConditionalMisuse,
            offset,
            line,
            err.to_string(),
        );
        let _ = self.sink.accept(&problem);
        Err(err)
    }

    fn pound_error(&mut self, offset: usize, line: usize) -> Result<()> {
        if !self.active {
            self.lexer.skip_rest_of_line();
            return Ok(());
        }
        let text = self.lexer.rest_of_line();
        let problem = self.problem(
            ProblemCode::PoundError,
            offset,
            line,
            text.trim().to_string(),
        );
        self.report(problem)
    }

    fn pound_include(&mut self, offset: usize, line: usize) -> Result<()> {
        if !self.active {
            self.lexer.skip_rest_of_line();
            return Ok(());
        }
        self.lexer.skip_hspace();
        let text = self.lexer.rest_of_line();
        let text = text.trim();
        let Some((name, angle)) = self.parse_include_spec(text, line) else {
            let problem = self.problem(
                ProblemCode::InvalidDirective,
                offset,
                line,
                format!("invalid inclusion directive `#include {text}`"),
            );
            return self.report(problem);
        };

        self.inclusions.push(name.clone());
        if self.mode == ScanMode::Quick {
            return Ok(());
        }

        if self.lexer.source_depth() >= MAX_INCLUDE_DEPTH {
            let problem = self.problem(
                ProblemCode::InclusionDepth,
                offset,
                line,
                format!("inclusion nested deeper than {MAX_INCLUDE_DEPTH} levels"),
            );
            return self.report(problem);
        }

        let current = self
            .lexer
            .current_path()
            .unwrap_or(Path::new("<input>"))
            .to_path_buf();
        match self
            .resolver
            .resolve(&name, angle, &current, &self.include_paths)
        {
            Some(source) => {
                log::debug!("entering include {:?}", source.path);
                self.lexer.push_source(&source.text, source.path);
                Ok(())
            }
            None => {
                let problem = self.problem(
                    ProblemCode::InclusionNotFound,
                    offset,
                    line,
                    format!("cannot find include file `{name}`"),
                );
                self.report(problem)
            }
        }
    }

    /// The `<...>` and `"..."` spellings are taken verbatim; anything else is
    /// macro-expanded once and re-read.
    fn parse_include_spec(&self, text: &str, line: usize) -> Option<(String, bool)> {
        if let Some(spec) = parse_include_literal(text) {
            return Some(spec);
        }
        if text.is_empty() {
            return None;
        }
        let (tokens, _) =
            Lexer::tokenize_fragment(text, self.lexer.current_file_index(), line);
        let expanded = Expander::new(&self.macros).expand_list(tokens).ok()?;
        parse_include_literal(&render_tokens(&expanded))
    }

    /// Conditional controlling expressions: `defined` is resolved first,
    /// then macros expand, then the arithmetic runs.
    fn eval_condition(&mut self, text: &str, line: usize) -> std::result::Result<bool, Problem> {
        let (tokens, problems) =
            Lexer::tokenize_fragment(text, self.lexer.current_file_index(), line);
        for problem in problems {
            log::debug!("ignoring lexical problem in condition: {}", problem.message);
        }
        let tokens = self.resolve_defined(tokens, line)?;
        let tokens = Expander::new(&self.macros).expand_list(tokens)?;
        let value = expression::evaluate(&tokens, line)?;
        Ok(value != 0)
    }

    /// Replace `defined NAME` / `defined(NAME)` with 1 or 0 before macro
    /// expansion touches the line.
    fn resolve_defined(
        &self,
        tokens: Vec<Token>,
        line: usize,
    ) -> std::result::Result<Vec<Token>, Problem> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            if !tok.is_identifier("defined") {
                out.push(tok.clone());
                i += 1;
                continue;
            }
            let (name, consumed) = if matches!(tokens.get(i + 1), Some(t) if t.is_punct(Punct::LParen))
            {
                match (tokens.get(i + 2), tokens.get(i + 3)) {
                    (Some(name), Some(close))
                        if name.kind == TokenKind::Identifier
                            && close.is_punct(Punct::RParen) =>
                    {
                        (name.image.clone(), 4)
                    }
                    _ => {
                        return Err(Problem::new(
                            Category::Expression,
                            ProblemCode::ExpressionEvaluation,
                            tok.offset,
                            tok.len.max(1),
                            line,
                            "malformed defined() operator",
                        ))
                    }
                }
            } else {
                match tokens.get(i + 1) {
                    Some(name) if name.kind == TokenKind::Identifier => (name.image.clone(), 2),
                    _ => {
                        return Err(Problem::new(
                            Category::Expression,
                            ProblemCode::ExpressionEvaluation,
                            tok.offset,
                            tok.len.max(1),
                            line,
                            "operand of `defined` must be an identifier",
                        ))
                    }
                }
            };
            let value = if self.macros.is_defined(&name) { "1" } else { "0" };
            out.push(Token::synthesized_at(TokenKind::Integer, value, tok));
            i += consumed;
        }
        Ok(out)
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn parse_include_literal(text: &str) -> Option<(String, bool)> {
    let (rest, close, angle) = if let Some(rest) = text.strip_prefix('<') {
        (rest, '>', true)
    } else if let Some(rest) = text.strip_prefix('"') {
        (rest, '"', false)
    } else {
        return None;
    };
    let end = rest.find(close)?;
    let name = rest[..end].trim().to_string();
    if name.is_empty() || !rest[end + 1..].trim().is_empty() {
        return None;
    }
    Some((name, angle))
}

/// Source-ish rendering of a token list, one space wherever the line had any.
fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (index, tok) in tokens.iter().enumerate() {
        if index > 0 && tok.has_space {
            out.push(' ');
        }
        out.push_str(&tok.spelling());
    }
    out
}

/// Definition-time checks shared by both macro kinds: `##` may not sit at
/// either end of a replacement list.
fn validate_object_replacement(name: &str, replacement: &[Token]) -> Option<String> {
    edge_paste_error(name, replacement)
}

/// Function-style macros additionally require every `#` to be followed by a
/// parameter name.
fn validate_function_replacement(
    name: &str,
    params: &[String],
    variadic: bool,
    replacement: &[Token],
) -> Option<String> {
    if let Some(message) = edge_paste_error(name, replacement) {
        return Some(message);
    }
    let mut i = 0;
    while i < replacement.len() {
        if replacement[i].is_punct(Punct::Hash) {
            let param_ok = match replacement.get(i + 1) {
                Some(next) if next.kind == TokenKind::Identifier => {
                    params.iter().any(|p| *p == next.image)
                        || (variadic && next.image == "__VA_ARGS__")
                }
                _ => false,
            };
            if !param_ok {
                return Some(format!(
                    "`#` is not followed by a parameter in definition of macro `{name}`"
                ));
            }
            i += 2;
            continue;
        }
        i += 1;
    }
    None
}

fn edge_paste_error(name: &str, replacement: &[Token]) -> Option<String> {
    if matches!(replacement.first(), Some(t) if t.is_punct(Punct::HashHash)) {
        return Some(format!(
            "`##` at start of replacement list of macro `{name}`"
        ));
    }
    if matches!(replacement.last(), Some(t) if t.is_punct(Punct::HashHash)) {
        return Some(format!("`##` at end of replacement list of macro `{name}`"));
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn include_literal_forms() {
        assert_eq!(
            parse_include_literal("<stdio.h>"),
            Some(("stdio.h".to_string(), true))
        );
        assert_eq!(
            parse_include_literal("\"foo.h\""),
            Some(("foo.h".to_string(), false))
        );
        assert_eq!(parse_include_literal("<stdio.h"), None);
        assert_eq!(parse_include_literal("\"foo.h"), None);
        assert_eq!(parse_include_literal("stdio.h"), None);
        assert_eq!(parse_include_literal("<foo.h> junk"), None);
    }

    #[test]
    fn identifier_validation() {
        assert!(is_identifier("abc"));
        assert!(is_identifier("_a1"));
        assert!(!is_identifier("1a"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier(""));
    }
}
