//! Token definitions

/// A lexed token: kind plus the source lexeme and its 1-based position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            line,
            col,
        }
    }
}

/// Token kinds for Pine-style script source
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    BoolLiteral(bool),

    // Identifiers and keywords
    Ident(String),
    Keyword(Keyword),

    // Operators
    Operator(Operator),

    // Delimiters
    Delimiter(Delimiter),

    // `//@version=N` pragma
    Version(u32),

    // Line structure
    Indent,
    Dedent,
    Newline,

    // End of file
    Eof,
}

/// Reserved words. `for`, `while`, `switch` and `var` are recognized so the
/// parser can reject them as deliberate coverage gaps instead of tripping
/// over a bare identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    And,
    Or,
    Not,
    Import,
    As,
    Export,
    Var,
    For,
    While,
    Switch,
}

impl Keyword {
    pub fn from_ident(text: &str) -> Option<Keyword> {
        match text {
            "if" => Some(Keyword::If),
            "else" => Some(Keyword::Else),
            "and" => Some(Keyword::And),
            "or" => Some(Keyword::Or),
            "not" => Some(Keyword::Not),
            "import" => Some(Keyword::Import),
            "as" => Some(Keyword::As),
            "export" => Some(Keyword::Export),
            "var" => Some(Keyword::Var),
            "for" => Some(Keyword::For),
            "while" => Some(Keyword::While),
            "switch" => Some(Keyword::Switch),
            _ => None,
        }
    }
}

/// Operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparison
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,

    // Binding
    Assign,      // =
    ColonAssign, // :=

    // Conditional expression
    Question,
    Colon,

    // Function declaration
    Arrow, // =>
}

/// Delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}
