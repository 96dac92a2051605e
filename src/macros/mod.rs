//! The macro table: one live definition per name, owned by the translation
//! unit's scanner and consulted for every identifier the lexer produces.

mod expand;

pub(crate) use expand::Expander;

use std::collections::HashMap;
use std::rc::Rc;

use crate::token::Token;

#[derive(Debug)]
pub struct MacroDefinition {
    pub name: String,
    /// `None` for object-style macros; parameter names in declaration order
    /// for function-style ones. The variadic tail is not listed here.
    pub params: Option<Vec<String>>,
    /// A trailing `...` collects extra arguments as `__VA_ARGS__`.
    pub variadic: bool,
    /// Replacement list, pre-tokenized at definition time.
    pub replacement: Vec<Token>,
    /// The replacement exactly as written (comments elided, continuations
    /// spliced); kept for diagnostics and table introspection.
    pub text: String,
}

impl MacroDefinition {
    pub fn object(name: impl Into<String>, replacement: Vec<Token>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: None,
            variadic: false,
            replacement,
            text: text.into(),
        }
    }

    pub fn function(
        name: impl Into<String>,
        params: Vec<String>,
        variadic: bool,
        replacement: Vec<Token>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            params: Some(params),
            variadic,
            replacement,
            text: text.into(),
        }
    }

    pub fn is_object(&self) -> bool {
        self.params.is_none()
    }

    /// Token-for-token (and parameter-for-parameter) equality; the rule that
    /// makes a redefinition benign.
    pub fn same_replacement(&self, other: &Self) -> bool {
        if self.params != other.params || self.variadic != other.variadic {
            return false;
        }
        self.replacement.len() == other.replacement.len()
            && self
                .replacement
                .iter()
                .zip(other.replacement.iter())
                .all(|(a, b)| a.same_spelling(b))
    }
}

/// Outcome of a `define` attempt; the caller decides whether a conflict is
/// reported or tolerated (quick-parse mode tolerates).
#[derive(Debug, PartialEq, Eq)]
pub enum DefineOutcome {
    Inserted,
    /// An identical definition already existed; nothing changed.
    Identical,
    /// A different definition existed. It has been replaced; the previous
    /// replacement text is returned for the diagnostic.
    Replaced { previous: String },
}

#[derive(Default)]
pub struct MacroTable {
    defs: HashMap<String, Rc<MacroDefinition>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<Rc<MacroDefinition>> {
        self.defs.get(name).cloned()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    /// Replacement text of a live definition, for callers inspecting the
    /// table rather than the stream.
    pub fn definition_text(&self, name: &str) -> Option<String> {
        self.defs.get(name).map(|def| def.text.clone())
    }

    pub fn define(&mut self, def: MacroDefinition) -> DefineOutcome {
        match self.defs.get(&def.name) {
            Some(previous) if previous.same_replacement(&def) => DefineOutcome::Identical,
            Some(previous) => {
                let previous_text = previous.text.clone();
                log::debug!(
                    "macro {} redefined: {:?} -> {:?}",
                    def.name,
                    previous_text,
                    def.text
                );
                self.defs.insert(def.name.clone(), Rc::new(def));
                DefineOutcome::Replaced {
                    previous: previous_text,
                }
            }
            None => {
                log::trace!("macro {} defined as {:?}", def.name, def.text);
                self.defs.insert(def.name.clone(), Rc::new(def));
                DefineOutcome::Inserted
            }
        }
    }

    /// Removing an unknown name is a silent no-op.
    pub fn undefine(&mut self, name: &str) {
        self.defs.remove(name);
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}
