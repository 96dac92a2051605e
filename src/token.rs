//! The token model: closed kind/punctuator/keyword variants, source spans,
//! and the hide sets that keep macro rescanning from looping.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Language {
    C,
    #[default]
    Cpp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Keyword(Keyword),
    Integer,
    Floating,
    CharLit,
    WideCharLit,
    StringLit,
    WideStringLit,
    Punct(Punct),
    /// A character that is no token start at all. Carried through macro
    /// machinery verbatim, reported as a diagnostic if it reaches the consumer.
    Other(char),
}

/// Macro names an expanded token must not re-expand ("blue paint"): every
/// macro adds its own name to the hide set of each token it produces, so
/// `#define A B` / `#define B A` terminates with a plain identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HideSet(BTreeSet<String>);

impl HideSet {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.0.insert(name.into());
    }

    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).cloned().collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// The raw lexeme. Literal images hold the text between the quotes with
    /// escape sequences untouched.
    pub image: String,
    pub offset: usize,
    pub len: usize,
    /// Index into the scanner's source table.
    pub file: usize,
    pub line: usize,
    /// First token on its logical line; drives `#` directive recognition.
    pub first_on_line: bool,
    /// Preceded by whitespace or a comment; drives stringification spacing.
    pub has_space: bool,
    pub hideset: HideSet,
}

impl Token {
    pub fn new(kind: TokenKind, image: impl Into<String>) -> Self {
        Self {
            kind,
            image: image.into(),
            offset: 0,
            len: 0,
            file: 0,
            line: 1,
            first_on_line: false,
            has_space: false,
            hideset: HideSet::default(),
        }
    }

    /// A synthetic token placed at the location of `site`.
    pub fn synthesized_at(kind: TokenKind, image: impl Into<String>, site: &Token) -> Self {
        Self {
            kind,
            image: image.into(),
            offset: site.offset,
            len: site.len,
            file: site.file,
            line: site.line,
            first_on_line: false,
            has_space: site.has_space,
            hideset: HideSet::default(),
        }
    }

    /// Spelling as it would appear in source: literals get their quotes and
    /// width prefix back, everything else is the image itself.
    pub fn spelling(&self) -> String {
        match self.kind {
            TokenKind::StringLit => format!("\"{}\"", self.image),
            TokenKind::WideStringLit => format!("L\"{}\"", self.image),
            TokenKind::CharLit => format!("'{}'", self.image),
            TokenKind::WideCharLit => format!("L'{}'", self.image),
            _ => self.image.clone(),
        }
    }

    /// Same lexeme, ignoring position and expansion bookkeeping. This is the
    /// equality that decides whether a macro redefinition is benign.
    pub fn same_spelling(&self, other: &Self) -> bool {
        self.kind == other.kind && self.image == other.image
    }

    pub fn is_punct(&self, punct: Punct) -> bool {
        self.kind == TokenKind::Punct(punct)
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.image == name
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semi,
    Comma,
    Question,
    Colon,
    ColonColon,
    Dot,
    DotStar,
    Ellipsis,
    Arrow,
    ArrowStar,
    Plus,
    PlusPlus,
    PlusAssign,
    Minus,
    MinusMinus,
    MinusAssign,
    Star,
    StarAssign,
    Slash,
    SlashAssign,
    Percent,
    PercentAssign,
    Caret,
    CaretAssign,
    Amp,
    AmpAmp,
    AmpAssign,
    Pipe,
    PipePipe,
    PipeAssign,
    Tilde,
    Bang,
    BangEq,
    Assign,
    EqEq,
    Less,
    LessEq,
    ShiftLeft,
    ShiftLeftAssign,
    Greater,
    GreaterEq,
    ShiftRight,
    ShiftRightAssign,
    Hash,
    HashHash,
}

impl Punct {
    pub fn as_str(&self) -> &'static str {
        use Punct::*;
        match self {
            LParen => "(",
            RParen => ")",
            LBracket => "[",
            RBracket => "]",
            LBrace => "{",
            RBrace => "}",
            Semi => ";",
            Comma => ",",
            Question => "?",
            Colon => ":",
            ColonColon => "::",
            Dot => ".",
            DotStar => ".*",
            Ellipsis => "...",
            Arrow => "->",
            ArrowStar => "->*",
            Plus => "+",
            PlusPlus => "++",
            PlusAssign => "+=",
            Minus => "-",
            MinusMinus => "--",
            MinusAssign => "-=",
            Star => "*",
            StarAssign => "*=",
            Slash => "/",
            SlashAssign => "/=",
            Percent => "%",
            PercentAssign => "%=",
            Caret => "^",
            CaretAssign => "^=",
            Amp => "&",
            AmpAmp => "&&",
            AmpAssign => "&=",
            Pipe => "|",
            PipePipe => "||",
            PipeAssign => "|=",
            Tilde => "~",
            Bang => "!",
            BangEq => "!=",
            Assign => "=",
            EqEq => "==",
            Less => "<",
            LessEq => "<=",
            ShiftLeft => "<<",
            ShiftLeftAssign => "<<=",
            Greater => ">",
            GreaterEq => ">=",
            ShiftRight => ">>",
            ShiftRightAssign => ">>=",
            Hash => "#",
            HashHash => "##",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
    And,
    AndEq,
    Asm,
    Auto,
    Bitand,
    Bitor,
    Bool,
    Break,
    Case,
    Catch,
    Char,
    Class,
    Compl,
    Const,
    ConstCast,
    Continue,
    Default,
    Delete,
    Do,
    Double,
    DynamicCast,
    Else,
    Enum,
    Explicit,
    Export,
    Extern,
    False,
    Float,
    For,
    Friend,
    Goto,
    If,
    Inline,
    Int,
    Long,
    Mutable,
    Namespace,
    New,
    Not,
    NotEq,
    Operator,
    Or,
    OrEq,
    Private,
    Protected,
    Public,
    Register,
    ReinterpretCast,
    Restrict,
    Return,
    Short,
    Signed,
    Sizeof,
    Static,
    StaticCast,
    Struct,
    Switch,
    Template,
    This,
    Throw,
    True,
    Try,
    Typedef,
    Typeid,
    Typename,
    Union,
    Unsigned,
    Using,
    Virtual,
    Void,
    Volatile,
    WcharT,
    While,
    Xor,
    XorEq,
    UnderscoreBool,
    UnderscoreComplex,
    UnderscoreImaginary,
}

static CPP_KEYWORDS: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(|| {
    use Keyword::*;
    HashMap::from([
        ("and", And),
        ("and_eq", AndEq),
        ("asm", Asm),
        ("auto", Auto),
        ("bitand", Bitand),
        ("bitor", Bitor),
        ("bool", Bool),
        ("break", Break),
        ("case", Case),
        ("catch", Catch),
        ("char", Char),
        ("class", Class),
        ("compl", Compl),
        ("const", Const),
        ("const_cast", ConstCast),
        ("continue", Continue),
        ("default", Default),
        ("delete", Delete),
        ("do", Do),
        ("double", Double),
        ("dynamic_cast", DynamicCast),
        ("else", Else),
        ("enum", Enum),
        ("explicit", Explicit),
        ("export", Export),
        ("extern", Extern),
        ("false", False),
        ("float", Float),
        ("for", For),
        ("friend", Friend),
        ("goto", Goto),
        ("if", If),
        ("inline", Inline),
        ("int", Int),
        ("long", Long),
        ("mutable", Mutable),
        ("namespace", Namespace),
        ("new", New),
        ("not", Not),
        ("not_eq", NotEq),
        ("operator", Operator),
        ("or", Or),
        ("or_eq", OrEq),
        ("private", Private),
        ("protected", Protected),
        ("public", Public),
        ("register", Register),
        ("reinterpret_cast", ReinterpretCast),
        ("return", Return),
        ("short", Short),
        ("signed", Signed),
        ("sizeof", Sizeof),
        ("static", Static),
        ("static_cast", StaticCast),
        ("struct", Struct),
        ("switch", Switch),
        ("template", Template),
        ("this", This),
        ("throw", Throw),
        ("true", True),
        ("try", Try),
        ("typedef", Typedef),
        ("typeid", Typeid),
        ("typename", Typename),
        ("union", Union),
        ("unsigned", Unsigned),
        ("using", Using),
        ("virtual", Virtual),
        ("void", Void),
        ("volatile", Volatile),
        ("wchar_t", WcharT),
        ("while", While),
        ("xor", Xor),
        ("xor_eq", XorEq),
    ])
});

static C_KEYWORDS: Lazy<HashMap<&'static str, Keyword>> = Lazy::new(|| {
    use Keyword::*;
    HashMap::from([
        ("auto", Auto),
        ("break", Break),
        ("case", Case),
        ("char", Char),
        ("const", Const),
        ("continue", Continue),
        ("default", Default),
        ("do", Do),
        ("double", Double),
        ("else", Else),
        ("enum", Enum),
        ("extern", Extern),
        ("float", Float),
        ("for", For),
        ("goto", Goto),
        ("if", If),
        ("inline", Inline),
        ("int", Int),
        ("long", Long),
        ("register", Register),
        ("restrict", Restrict),
        ("return", Return),
        ("short", Short),
        ("signed", Signed),
        ("sizeof", Sizeof),
        ("static", Static),
        ("struct", Struct),
        ("switch", Switch),
        ("typedef", Typedef),
        ("union", Union),
        ("unsigned", Unsigned),
        ("void", Void),
        ("volatile", Volatile),
        ("while", While),
        ("_Bool", UnderscoreBool),
        ("_Complex", UnderscoreComplex),
        ("_Imaginary", UnderscoreImaginary),
    ])
});

/// Keyword lookup happens only after macro lookup has failed, so a macro may
/// shadow a keyword spelling.
pub fn lookup_keyword(ident: &str, language: Language) -> Option<Keyword> {
    match language {
        Language::Cpp => CPP_KEYWORDS.get(ident).copied(),
        Language::C => C_KEYWORDS.get(ident).copied(),
    }
}
