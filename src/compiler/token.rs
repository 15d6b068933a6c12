use std::fmt::{self, Display, Formatter};

/// The reserved words of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    ElseIf,
    Else,
    While,
    Function,
    Return,
    Import,
    Export,
    Language,
}

impl Keyword {
    pub fn try_new(name: &str) -> Option<Keyword> {
        Some(match name {
            "if" => Keyword::If,
            "elseif" => Keyword::ElseIf,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "function" => Keyword::Function,
            "return" => Keyword::Return,
            "import" => Keyword::Import,
            "export" => Keyword::Export,
            "language" => Keyword::Language,
            _ => return None,
        })
    }
}

/// These are the different tokens the lexer will output.
/// `Token`s with data contain that data,
/// e.g. an integer will be a `Token::Integer(...)`, not just a string.
/// `Token`s can be spanned using `Spanned<Token>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Delimiters
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenCurly,
    CloseCurly,
    Comma,
    Sep,

    /// `@`
    Variable,
    /// `@#`
    Constant,
    /// `#Speaker content`, the content runs to the end of the line.
    Dialogue { speaker: Option<String>, content: String },

    // Operators
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    Add,
    Sub,
    Mul,
    Div,
    Not,
    And,
    Or,
    Equal,
    NotEqual,
    Greater,
    Lesser,
    GreaterEqual,
    LesserEqual,
    Arrow,

    // Words
    Keyword(Keyword),
    Iden(String),

    // Literals
    Integer(i64),
    Float(f64),
    /// `'single quoted'`
    String(String),
    /// `"double quoted"`, resolved through the active language at run time.
    Translatable(String),
    Boolean(bool),
    Null,

    // EoS
    End,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // pretty formatting for tokens
        // just use debug if you're not printing a message or something.
        let message = match self {
            Token::OpenParen => "an opening paren",
            Token::CloseParen => "a closing paren",
            Token::OpenBracket => "an opening bracket",
            Token::CloseBracket => "a closing bracket",
            Token::OpenCurly => "an opening curly brace",
            Token::CloseCurly => "a closing curly brace",
            Token::Comma => "a comma",
            Token::Sep => "a separator",
            Token::Variable => "a variable sigil `@`",
            Token::Constant => "a constant sigil `@#`",
            Token::Dialogue { .. } => "a line of dialogue",
            Token::Assign => "an assignment",
            Token::AddAssign
            | Token::SubAssign
            | Token::MulAssign
            | Token::DivAssign => "a compound assignment",
            Token::Add
            | Token::Sub
            | Token::Mul
            | Token::Div
            | Token::Not
            | Token::And
            | Token::Or
            | Token::Equal
            | Token::NotEqual
            | Token::Greater
            | Token::Lesser
            | Token::GreaterEqual
            | Token::LesserEqual => "an operator",
            Token::Arrow => "a pick-child arrow `->`",
            Token::Keyword(_) => "a keyword",
            Token::Iden(_) => "a name",
            Token::Integer(_) => "an integer",
            Token::Float(_) => "a float",
            Token::String(_) => "a string",
            Token::Translatable(_) => "a translatable string",
            Token::Boolean(_) => "a boolean, like 'true' or 'false'",
            Token::Null => "null",
            Token::End => "end of source",
        };
        write!(f, "{}", message)
    }
}
