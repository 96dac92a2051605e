//! Macro substitution, rescanning included. Every token produced by an
//! expansion carries the expanding macro's name in its hide set, so a token
//! that re-appears inside its own expansion is never expanded again; that is
//! what makes `#define A B` / `#define B A` terminate with a plain
//! identifier. Function-style expansion additionally intersects the hide
//! sets of the invocation name and the closing parenthesis before adding its
//! own name.

use crate::diagnostics::{Category, Problem, ProblemCode};
use crate::lexer::Lexer;
use crate::token::{HideSet, Punct, Token, TokenKind};

use super::{MacroDefinition, MacroTable};

pub(crate) struct MacroArg {
    name: String,
    tokens: Vec<Token>,
}

fn find_arg<'x>(args: &'x [MacroArg], tok: &Token) -> Option<&'x MacroArg> {
    if tok.kind != TokenKind::Identifier {
        return None;
    }
    args.iter().find(|arg| arg.name == tok.image)
}

pub(crate) struct Expander<'a> {
    macros: &'a MacroTable,
}

impl<'a> Expander<'a> {
    pub fn new(macros: &'a MacroTable) -> Self {
        Self { macros }
    }

    fn problem_at(site: &Token, code: ProblemCode, message: impl Into<String>) -> Problem {
        Problem::new(
            Category::Preprocessor,
            code,
            site.offset,
            site.len.max(1),
            site.line,
            message,
        )
    }

    pub fn expand_object(
        &self,
        def: &MacroDefinition,
        invocation: &Token,
    ) -> Result<Vec<Token>, Problem> {
        log::trace!("expanding object macro {}", def.name);
        let mut hs = invocation.hideset.clone();
        hs.insert(def.name.clone());
        self.substitute(def, &[], &hs, invocation)
    }

    pub fn expand_function(
        &self,
        def: &MacroDefinition,
        invocation: &Token,
        raw_args: Vec<Vec<Token>>,
        rparen_hideset: &HideSet,
    ) -> Result<Vec<Token>, Problem> {
        log::trace!(
            "expanding function macro {} with {} argument list(s)",
            def.name,
            raw_args.len()
        );
        let args = Self::bind_args(def, invocation, raw_args)?;
        let mut hs = invocation.hideset.intersection(rparen_hideset);
        hs.insert(def.name.clone());
        self.substitute(def, &args, &hs, invocation)
    }

    /// Bind collected argument token lists to parameter names. A trailing
    /// `...` parameter swallows all remaining arguments, commas included, as
    /// `__VA_ARGS__`.
    fn bind_args(
        def: &MacroDefinition,
        invocation: &Token,
        mut raw: Vec<Vec<Token>>,
    ) -> Result<Vec<MacroArg>, Problem> {
        let params = def.params.as_ref().expect("function-style macro");

        // `NAME()` parses as one empty argument; for a macro declared with
        // no parameters that means zero arguments.
        if params.is_empty() && raw.len() == 1 && raw[0].is_empty() {
            raw.clear();
        }

        let enough = if def.variadic {
            raw.len() >= params.len()
        } else {
            raw.len() == params.len()
        };
        if !enough {
            return Err(Self::problem_at(
                invocation,
                ProblemCode::MacroArgumentMismatch,
                format!(
                    "macro `{}` requires {} argument(s), {} given",
                    def.name,
                    params.len(),
                    raw.len()
                ),
            ));
        }

        let rest = raw.split_off(params.len());
        let mut args: Vec<MacroArg> = params
            .iter()
            .zip(raw)
            .map(|(name, tokens)| MacroArg {
                name: name.clone(),
                tokens,
            })
            .collect();

        if def.variadic {
            let mut tokens = Vec::new();
            for (index, arg) in rest.into_iter().enumerate() {
                if index > 0 {
                    tokens.push(Token::synthesized_at(
                        TokenKind::Punct(Punct::Comma),
                        ",",
                        invocation,
                    ));
                }
                tokens.extend(arg);
            }
            args.push(MacroArg {
                name: "__VA_ARGS__".to_string(),
                tokens,
            });
        }

        Ok(args)
    }

    /// Walk the replacement list, substituting parameters, stringizing and
    /// pasting, then stamp every produced token with the expansion hide set.
    fn substitute(
        &self,
        def: &MacroDefinition,
        args: &[MacroArg],
        hs: &HideSet,
        site: &Token,
    ) -> Result<Vec<Token>, Problem> {
        let body = &def.replacement;
        let mut out: Vec<Token> = Vec::new();
        let mut i = 0;

        while i < body.len() {
            let tok = &body[i];

            // `#param` makes a string literal of the unexpanded argument
            if tok.is_punct(Punct::Hash) && !def.is_object() {
                if let Some(next) = body.get(i + 1) {
                    if let Some(arg) = find_arg(args, next) {
                        out.push(Self::stringize(site, &arg.tokens));
                        i += 2;
                        continue;
                    }
                }
                return Err(Self::problem_at(
                    site,
                    ProblemCode::InvalidMacroDefinition,
                    format!("`#` is not followed by a parameter of macro `{}`", def.name),
                ));
            }

            // `lhs ## rhs` pastes lexemes; an abutting parameter contributes
            // its unexpanded tokens
            if tok.is_punct(Punct::HashHash) {
                let Some(next) = body.get(i + 1) else {
                    return Err(Self::problem_at(
                        site,
                        ProblemCode::InvalidMacroDefinition,
                        format!("`##` at end of replacement list of macro `{}`", def.name),
                    ));
                };
                if out.is_empty() {
                    return Err(Self::problem_at(
                        site,
                        ProblemCode::InvalidMacroDefinition,
                        format!("`##` at start of replacement list of macro `{}`", def.name),
                    ));
                }
                if let Some(arg) = find_arg(args, next) {
                    if !arg.tokens.is_empty() {
                        let pasted = self.paste(out.last().unwrap(), &arg.tokens[0], site)?;
                        *out.last_mut().unwrap() = pasted;
                        out.extend(arg.tokens[1..].iter().cloned());
                    }
                } else {
                    let pasted = self.paste(out.last().unwrap(), next, site)?;
                    *out.last_mut().unwrap() = pasted;
                }
                i += 2;
                continue;
            }

            if let Some(arg) = find_arg(args, tok) {
                // parameter directly left of `##`: unexpanded
                if matches!(body.get(i + 1), Some(n) if n.is_punct(Punct::HashHash)) {
                    if arg.tokens.is_empty() {
                        // empty left operand: the paste degenerates to the
                        // right operand alone
                        let Some(rhs) = body.get(i + 2) else {
                            return Err(Self::problem_at(
                                site,
                                ProblemCode::InvalidMacroDefinition,
                                format!("`##` at end of replacement list of macro `{}`", def.name),
                            ));
                        };
                        if let Some(arg2) = find_arg(args, rhs) {
                            out.extend(arg2.tokens.iter().cloned());
                        } else {
                            out.push(rhs.clone());
                        }
                        i += 3;
                        continue;
                    }
                    out.extend(arg.tokens.iter().cloned());
                    i += 1;
                    continue;
                }

                // plain position: the fully expanded argument
                let expanded = self.expand_list(arg.tokens.clone())?;
                out.extend(expanded);
                i += 1;
                continue;
            }

            out.push(tok.clone());
            i += 1;
        }

        for tok in &mut out {
            tok.hideset = tok.hideset.union(hs);
            tok.first_on_line = false;
        }
        Ok(out)
    }

    /// Textual reconstruction of the argument: one space wherever the source
    /// had whitespace, literals re-quoted, then `"` and `\` escaped.
    fn stringize(site: &Token, arg_tokens: &[Token]) -> Token {
        let mut text = String::new();
        for (index, tok) in arg_tokens.iter().enumerate() {
            if index > 0 && tok.has_space {
                text.push(' ');
            }
            text.push_str(&tok.spelling());
        }
        let mut escaped = String::new();
        for ch in text.chars() {
            if ch == '"' || ch == '\\' {
                escaped.push('\\');
            }
            escaped.push(ch);
        }
        Token::synthesized_at(TokenKind::StringLit, escaped, site)
    }

    /// Concatenate two lexemes and re-lex; anything but exactly one clean
    /// token is an error.
    fn paste(&self, lhs: &Token, rhs: &Token, site: &Token) -> Result<Token, Problem> {
        let text = format!("{}{}", lhs.spelling(), rhs.spelling());
        let (tokens, problems) = Lexer::tokenize_fragment(&text, site.file, site.line);
        if !problems.is_empty() || tokens.len() != 1 {
            return Err(Self::problem_at(
                site,
                ProblemCode::MacroPasting,
                format!("pasting forms `{text}`, an invalid token"),
            ));
        }
        let mut tok = tokens.into_iter().next().unwrap();
        tok.offset = site.offset;
        tok.len = site.len;
        tok.file = site.file;
        tok.line = site.line;
        tok.first_on_line = false;
        tok.has_space = lhs.has_space;
        Ok(tok)
    }

    /// Rescan a complete token list, expanding every macro invocation found
    /// in it. Used for macro arguments in plain positions and for the
    /// controlling expression of `#if`/`#elif`.
    pub fn expand_list(&self, mut tokens: Vec<Token>) -> Result<Vec<Token>, Problem> {
        let mut pos = 0;
        while pos < tokens.len() {
            let candidate = match tokens[pos].kind {
                TokenKind::Identifier if !tokens[pos].hideset.contains(&tokens[pos].image) => {
                    self.macros.lookup(&tokens[pos].image)
                }
                _ => None,
            };
            let Some(def) = candidate else {
                pos += 1;
                continue;
            };

            if def.is_object() {
                let invocation = tokens[pos].clone();
                let body = self.expand_object(&def, &invocation)?;
                tokens.splice(pos..pos + 1, body);
                continue;
            }

            // function-style used without parentheses stays an identifier
            if !matches!(tokens.get(pos + 1), Some(t) if t.is_punct(Punct::LParen)) {
                pos += 1;
                continue;
            }

            let invocation = tokens[pos].clone();
            let mut depth = 1usize;
            let mut args: Vec<Vec<Token>> = vec![Vec::new()];
            let mut i = pos + 2;
            let rparen = loop {
                let Some(t) = tokens.get(i) else {
                    return Err(Self::problem_at(
                        &invocation,
                        ProblemCode::MacroArgumentMismatch,
                        format!(
                            "unterminated argument list for macro `{}`",
                            invocation.image
                        ),
                    ));
                };
                match t.kind {
                    TokenKind::Punct(Punct::LParen) => {
                        depth += 1;
                        args.last_mut().unwrap().push(t.clone());
                    }
                    TokenKind::Punct(Punct::RParen) => {
                        depth -= 1;
                        if depth == 0 {
                            break i;
                        }
                        args.last_mut().unwrap().push(t.clone());
                    }
                    TokenKind::Punct(Punct::Comma) if depth == 1 => args.push(Vec::new()),
                    _ => args.last_mut().unwrap().push(t.clone()),
                }
                i += 1;
            };

            let rparen_hideset = tokens[rparen].hideset.clone();
            let body = self.expand_function(&def, &invocation, args, &rparen_hideset)?;
            tokens.splice(pos..=rparen, body);
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::macros::{MacroDefinition, MacroTable};
    use similar_asserts::assert_eq;
    use test_log::test;

    fn tokens_of(text: &str) -> Vec<Token> {
        let (tokens, problems) = Lexer::tokenize_fragment(text, 0, 1);
        assert!(problems.is_empty(), "{problems:?}");
        tokens
    }

    fn images(tokens: &[Token]) -> Vec<String> {
        tokens.iter().map(|t| t.image.clone()).collect()
    }

    fn table(defs: &[(&str, Option<&[&str]>, &str)]) -> MacroTable {
        let mut table = MacroTable::new();
        for (name, params, text) in defs {
            let replacement = tokens_of(text);
            let def = match params {
                None => MacroDefinition::object(*name, replacement, *text),
                Some(params) => MacroDefinition::function(
                    *name,
                    params.iter().map(|p| p.to_string()).collect(),
                    false,
                    replacement,
                    *text,
                ),
            };
            table.define(def);
        }
        table
    }

    #[test]
    fn object_substitution_identity() {
        let table = table(&[("SIMPLE_NUMERIC", None, "5")]);
        let expander = Expander::new(&table);
        let out = expander
            .expand_list(tokens_of("x = SIMPLE_NUMERIC ;"))
            .unwrap();
        assert_eq!(images(&out), vec!["x", "=", "5", ";"]);
    }

    #[test]
    fn chained_object_macros() {
        let table = table(&[("ONE", None, "1"), ("TWO", None, "ONE + ONE")]);
        let expander = Expander::new(&table);
        let out = expander.expand_list(tokens_of("TWO")).unwrap();
        assert_eq!(images(&out), vec!["1", "+", "1"]);
    }

    #[test]
    fn mutually_recursive_macros_terminate() {
        let table = table(&[("A", None, "B"), ("B", None, "A")]);
        let expander = Expander::new(&table);
        let out = expander.expand_list(tokens_of("A")).unwrap();
        assert_eq!(images(&out), vec!["A"]);
        assert_eq!(out[0].kind, TokenKind::Identifier);
    }

    #[test]
    fn nested_recursive_macros_paint_only_their_own_chain() {
        let table = table(&[("C", None, "B A"), ("B", None, "C C"), ("A", None, "B")]);
        let expander = Expander::new(&table);
        let out = expander.expand_list(tokens_of("A")).unwrap();
        assert_eq!(images(&out), vec!["B", "A", "B", "A"]);
    }

    #[test]
    fn function_macro_substitutes_arguments() {
        let table = table(&[("GO", Some(&["x"]), "x+1")]);
        let expander = Expander::new(&table);
        let out = expander.expand_list(tokens_of("y = GO(y);")).unwrap();
        assert_eq!(images(&out), vec!["y", "=", "y", "+", "1", ";"]);
    }

    #[test]
    fn function_macro_without_parens_is_plain() {
        let table = table(&[("GO", Some(&["x"]), "x+1")]);
        let expander = Expander::new(&table);
        let out = expander.expand_list(tokens_of("GO + 2")).unwrap();
        assert_eq!(images(&out), vec!["GO", "+", "2"]);
    }

    #[test]
    fn arguments_may_contain_parenthesized_commas() {
        let table = table(&[("FIRST", Some(&["a", "b"]), "a")]);
        let expander = Expander::new(&table);
        let out = expander
            .expand_list(tokens_of("FIRST(f(1, 2), g(3))"))
            .unwrap();
        assert_eq!(images(&out), vec!["f", "(", "1", ",", "2", ")"]);
    }

    #[test]
    fn paste_makes_one_identifier() {
        let table = table(&[("CAT", Some(&["a", "b"]), "a##b")]);
        let expander = Expander::new(&table);
        let out = expander.expand_list(tokens_of("CAT(foo, bar)")).unwrap();
        assert_eq!(images(&out), vec!["foobar"]);
        assert_eq!(out[0].kind, TokenKind::Identifier);
    }

    #[test]
    fn paste_of_digits_extends_a_number() {
        let table = table(&[("GLUE", Some(&["a", "b"]), "a##b")]);
        let expander = Expander::new(&table);
        let out = expander.expand_list(tokens_of("GLUE(12, 34)")).unwrap();
        assert_eq!(images(&out), vec!["1234"]);
        assert_eq!(out[0].kind, TokenKind::Integer);
    }

    #[test]
    fn invalid_paste_is_reported() {
        let table = table(&[("CAT", Some(&["a", "b"]), "a##b")]);
        let expander = Expander::new(&table);
        let err = expander
            .expand_list(tokens_of("CAT(foo, +)"))
            .unwrap_err();
        assert_eq!(err.code, ProblemCode::MacroPasting);
    }

    #[test]
    fn stringize_collapses_whitespace() {
        let table = table(&[("STR", Some(&["s"]), "# s")]);
        let expander = Expander::new(&table);
        let out = expander.expand_list(tokens_of("STR(x   +    1)")).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, TokenKind::StringLit);
        assert_eq!(out[0].image, "x + 1");
    }

    #[test]
    fn stringize_escapes_quotes_and_backslashes() {
        let table = table(&[("STR", Some(&["s"]), "# s")]);
        let expander = Expander::new(&table);
        let out = expander
            .expand_list(tokens_of("STR(strncmp(\"abc\\0d\", \"abc\", '\\4') == 0)"))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].image,
            "strncmp(\\\"abc\\\\0d\\\", \\\"abc\\\", '\\\\4') == 0"
        );
    }

    #[test]
    fn stringized_argument_is_not_expanded() {
        let table = table(&[("STR", Some(&["s"]), "# s"), ("FIVE", None, "5")]);
        let expander = Expander::new(&table);
        let out = expander.expand_list(tokens_of("STR(FIVE)")).unwrap();
        assert_eq!(out[0].image, "FIVE");
    }

    #[test]
    fn wrong_argument_count_names_both_counts() {
        let table = table(&[("SUM", Some(&["a", "b"]), "a + b")]);
        let expander = Expander::new(&table);
        let err = expander.expand_list(tokens_of("SUM(1)")).unwrap_err();
        assert_eq!(err.code, ProblemCode::MacroArgumentMismatch);
        assert!(err.message.contains("2 argument(s)"));
        assert!(err.message.contains("1 given"));
    }

    #[test]
    fn variadic_collects_the_tail() {
        let mut table = MacroTable::new();
        table.define(MacroDefinition::function(
            "LOG",
            vec!["fmt".to_string()],
            true,
            tokens_of("printf(fmt, __VA_ARGS__)"),
            "printf(fmt, __VA_ARGS__)",
        ));
        let expander = Expander::new(&table);
        let out = expander
            .expand_list(tokens_of("LOG(\"%d %d\", 1, 2)"))
            .unwrap();
        assert_eq!(
            images(&out),
            vec!["printf", "(", "%d %d", ",", "1", ",", "2", ")"]
        );
    }

    #[test]
    fn arguments_expand_before_plain_substitution() {
        let table = table(&[
            ("ONE", None, "1"),
            ("SUM", Some(&["a", "b"]), "( a + b )"),
        ]);
        let expander = Expander::new(&table);
        let out = expander.expand_list(tokens_of("SUM(ONE, 3)")).unwrap();
        assert_eq!(images(&out), vec!["(", "1", "+", "3", ")"]);
    }
}
