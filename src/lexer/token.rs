/// Source location of a token: 1-based line and column plus the lexeme
/// length in bytes. Synthetic tokens (NEWLINE, INDENT, DEDENT, EOF) carry
/// a zero length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub len: usize,
}

impl Span {
    pub fn new(line: usize, column: usize, len: usize) -> Self {
        Self { line, column, len }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Int(i64),
    Float(f64),
    Str(String),

    // F-strings are lexed as a START / MIDDLE / `{` expr `}` / END group;
    // the tokens between braces come from recursively lexing the
    // placeholder text.
    FStringStart,
    FStringMiddle(String),
    FStringEnd,

    True,
    False,
    None,

    // Keywords
    Def,
    Class,
    Return,
    Global,
    Import,
    Assert,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Is,
    Not,
    And,
    Or,
    Break,
    Continue,
    Pass,
    Try,
    Except,
    Raise,
    As,

    // Operators
    Assign,     // =
    Plus,       // +
    Minus,      // -
    Star,       // *
    Slash,      // /
    FloorDiv,   // //
    Percent,    // %
    PlusEq,     // +=
    MinusEq,    // -=
    StarEq,     // *=
    SlashEq,    // /=
    FloorDivEq, // //=
    PercentEq,  // %=
    Eq,         // ==
    NotEq,      // !=
    Lt,         // <
    Lte,        // <=
    Gt,         // >
    Gte,        // >=
    Arrow,      // ->

    // Delimiters
    Colon,     // :
    Semicolon, // ;
    Comma,     // ,
    Dot,       // .
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    LBrace,    // {
    RBrace,    // }

    // Structural
    Newline,
    Indent,
    Dedent,
    EOF,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Keyword table. `True`/`False`/`None` are keywords; the lowercase
/// spellings stay ordinary identifiers.
pub fn keyword_kind(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "def" => TokenKind::Def,
        "class" => TokenKind::Class,
        "return" => TokenKind::Return,
        "global" => TokenKind::Global,
        "import" => TokenKind::Import,
        "assert" => TokenKind::Assert,
        "if" => TokenKind::If,
        "elif" => TokenKind::Elif,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "is" => TokenKind::Is,
        "not" => TokenKind::Not,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "pass" => TokenKind::Pass,
        "try" => TokenKind::Try,
        "except" => TokenKind::Except,
        "raise" => TokenKind::Raise,
        "as" => TokenKind::As,
        "True" => TokenKind::True,
        "False" => TokenKind::False,
        "None" => TokenKind::None,
        _ => return Option::None,
    };
    Some(kind)
}
