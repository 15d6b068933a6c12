use tracing::debug;

use crate::{
    common::{
        source::Source,
        span::{Position, Spanned},
    },
    compiler::{
        cursor::Cursor,
        syntax::{CompileError, Note},
        token::{Keyword, Token},
    },
};

/// Operators, longest first so that `+=` wins over `+`.
const OPERATORS: [(&str, Token); 20] = [
    ("+=", Token::AddAssign),
    ("-=", Token::SubAssign),
    ("*=", Token::MulAssign),
    ("/=", Token::DivAssign),
    ("==", Token::Equal),
    ("!=", Token::NotEqual),
    ("<=", Token::LesserEqual),
    (">=", Token::GreaterEqual),
    ("&&", Token::And),
    ("||", Token::Or),
    ("->", Token::Arrow),
    ("+", Token::Add),
    ("-", Token::Sub),
    ("*", Token::Mul),
    ("/", Token::Div),
    ("!", Token::Not),
    ("<", Token::Lesser),
    (">", Token::Greater),
    ("=", Token::Assign),
    (",", Token::Comma),
];

pub struct Lexer<'a> {
    source: &'a Source,
    cursor: Cursor<'a>,
    /// Open delimiters, newlines are not separators inside `(` and `[`.
    nesting: Vec<(char, Position)>,
    tokens: Vec<Spanned<Token>>,
}

impl<'a> Lexer<'a> {
    /// Lexes a source file into a stream of tokens.
    /// The stream always ends with `Token::End`.
    pub fn lex(source: &'a Source) -> Result<Vec<Spanned<Token>>, CompileError> {
        // build a base lexer for this file
        let mut lexer = Lexer {
            source,
            cursor: Cursor::new(&source.contents),
            nesting: vec![],
            tokens: vec![],
        };

        // prime the lexer
        lexer.strip()?;

        // consume!
        while !lexer.cursor.is_done() {
            let position = lexer.cursor.position();
            if let Some(token) = lexer.next_token()? {
                lexer.tokens.push(Spanned::new(token, position));
            }

            // Strip whitespace, but not newlines, and comments
            lexer.strip()?;
        }

        if let Some((open, position)) = lexer.nesting.pop() {
            return Err(CompileError::error(
                &format!("Unexpected end of source, `{}` is never closed", open),
                source,
                position,
            ));
        }

        lexer.tokens.push(Spanned::new(Token::End, lexer.cursor.position()));
        debug!(script = %source.identifier, tokens = lexer.tokens.len(), "lexed");

        // phew, nothing broke. Your tokens, sir!
        Ok(lexer.tokens)
    }

    fn error(&self, reason: &str, position: Position) -> CompileError {
        CompileError::error(reason, self.source, position)
    }

    fn grouped(&self) -> bool {
        matches!(self.nesting.last(), Some(('(', _)) | Some(('[', _)))
    }

    fn strip(&mut self) -> Result<(), CompileError> {
        loop {
            match self.cursor.current() {
                Some('\t') => {
                    return Err(CompileError::error_with_note(
                        "Tab characters are not allowed here",
                        self.source,
                        Note::new_with_hint("indent with spaces instead", self.cursor.position()),
                    ));
                },
                Some('\n') if self.grouped() => {
                    self.cursor.advance();
                },
                // strip whitespace...
                // ...but don't strip newlines!
                Some(c) if c.is_whitespace() && c != '\n' => {
                    self.cursor.advance();
                },
                Some('/') if self.cursor.next() == Some('/') => {
                    // eat comment until the end of the line
                    self.cursor.take_while(|c| c != '\n');
                },
                Some('/') if self.cursor.next() == Some('*') => {
                    let start = self.cursor.position();
                    self.cursor.skip(2);
                    let end = self.cursor.find_unescaped("*/").ok_or_else(|| {
                        self.error("Unexpected end of source while parsing block comment", start)
                    })?;
                    self.cursor.skip(end + 2);
                },
                _ => return Ok(()),
            }
        }
    }

    /// Consecutive separators collapse into one.
    fn separator(&mut self) -> Option<Token> {
        self.cursor.advance();
        match self.tokens.last() {
            None | Some(Spanned { item: Token::Sep, .. }) => None,
            _ => Some(Token::Sep),
        }
    }

    fn open(&mut self, delim: char, token: Token) -> Token {
        self.nesting.push((delim, self.cursor.position()));
        self.cursor.advance();
        token
    }

    fn close(&mut self, open: char, close: char, token: Token) -> Result<Token, CompileError> {
        match self.nesting.pop() {
            Some((found, _)) if found == open => {
                self.cursor.advance();
                Ok(token)
            },
            _ => Err(self.error(
                &format!("Closing `{}` does not have an opening `{}`", close, open),
                self.cursor.position(),
            )),
        }
    }

    /// Parses the next token.
    /// Expects all whitespace and comments to be stripped.
    /// Returns `None` when the text produced no token,
    /// e.g. for a redundant separator.
    fn next_token(&mut self) -> Result<Option<Token>, CompileError> {
        let c = match self.cursor.current() {
            Some(c) => c,
            None => return Ok(None),
        };

        let token = match c {
            // separator
            '\n' | ';' => return Ok(self.separator()),

            // Grouping
            '(' => self.open('(', Token::OpenParen),
            '[' => self.open('[', Token::OpenBracket),
            '{' => self.open('{', Token::OpenCurly),
            ')' => self.close('(', ')', Token::CloseParen)?,
            ']' => self.close('[', ']', Token::CloseBracket)?,
            '}' => self.close('{', '}', Token::CloseCurly)?,

            // Sigils
            '@' if self.cursor.next() == Some('#') => {
                self.cursor.skip(2);
                Token::Constant
            },
            '@' => {
                self.cursor.advance();
                Token::Variable
            },
            '#' => self.dialogue()?,

            // Literals
            '0'..='9' => self.number()?,
            '\'' => Token::String(self.string('\'')?),
            '"' => Token::Translatable(self.string('"')?),

            // Words
            c if c.is_alphabetic() || c == '_' => {
                let word = self.cursor.take_while(|n| n.is_alphanumeric() || n == '_');
                match word {
                    "true" => Token::Boolean(true),
                    "false" => Token::Boolean(false),
                    "null" => Token::Null,
                    _ => match Keyword::try_new(word) {
                        Some(keyword) => Token::Keyword(keyword),
                        None => Token::Iden(word.to_string()),
                    },
                }
            },

            // Operators
            _ => self.operator()?,
        };

        Ok(Some(token))
    }

    fn operator(&mut self) -> Result<Token, CompileError> {
        for (text, token) in OPERATORS.iter() {
            if self.cursor.starts_with(text) {
                self.cursor.skip(text.len());
                return Ok(token.clone());
            }
        }

        let unknown = self.cursor.current().unwrap_or('\0');
        Err(self.error(
            &format!(
                "Hmm... The character `{}` is not recognized - check for encoding issues or typos",
                unknown,
            ),
            self.cursor.position(),
        ))
    }

    /// Lexes `#Speaker content`.
    /// The content runs to the end of the line
    /// or to the first unescaped `//`.
    fn dialogue(&mut self) -> Result<Token, CompileError> {
        self.cursor.advance();

        let speaker = match self.cursor.current() {
            Some(c) if c.is_alphanumeric() || c == '_' => Some(
                self.cursor.take_while(|n| n.is_alphanumeric() || n == '_').to_string(),
            ),
            _ => None,
        };
        self.cursor.take_while(|c| c == ' ');

        let line_end = self.cursor.remaining().find('\n').unwrap_or(self.cursor.remaining().len());
        let end = match self.cursor.find_unescaped("//") {
            Some(comment) if comment < line_end => comment,
            _ => line_end,
        };

        let start = self.cursor.position();
        let raw = self.cursor.remaining()[..end].trim_end();
        let content = self.unescape(raw, start, true)?;
        self.cursor.skip(end);

        Ok(Token::Dialogue { speaker, content })
    }

    /// Lexes a quoted string, the cursor being on the opening quote.
    fn string(&mut self, quote: char) -> Result<String, CompileError> {
        let start = self.cursor.position();
        self.cursor.advance();

        let pattern = quote.to_string();
        let end = self.cursor.find_unescaped(&pattern).ok_or_else(|| {
            self.error("Unexpected end of source while parsing string literal", start)
        })?;

        let inner_start = self.cursor.position();
        let raw = &self.cursor.remaining()[..end];
        let string = self.unescape(raw, inner_start, false)?;
        self.cursor.skip(end + quote.len_utf8());
        Ok(string)
    }

    /// Resolves backslash escapes in `raw`, which starts at `start`.
    /// Dialogue content may also escape `/` and `#`.
    fn unescape(&self, raw: &str, start: Position, dialogue: bool) -> Result<String, CompileError> {
        let mut string = String::with_capacity(raw.len());
        let mut chars = Cursor::new(raw);

        loop {
            let here = chars.position();
            let c = match chars.advance() {
                Some(c) => c,
                None => break,
            };
            if c != '\\' {
                string.push(c);
                continue;
            }

            string.push(match chars.advance() {
                Some('\'') => '\'',
                Some('"') => '"',
                Some('\\') => '\\',
                Some('n') => '\n',
                Some('r') => '\r',
                Some('t') => '\t',
                Some('0') => '\0',
                Some(c @ ('/' | '#')) if dialogue => c,
                other => {
                    let position = if here.line == 0 {
                        Position::new(start.line, start.column + here.column)
                    } else {
                        Position::new(start.line + here.line, here.column)
                    };
                    let shown = other.map(|o| o.to_string()).unwrap_or_default();
                    return Err(CompileError::error_with_note(
                        &format!("Unknown escape code `\\{}` in string literal", shown),
                        self.source,
                        Note::new_with_hint(
                            "To include a single backslash `\\`, escape it first: `\\\\`",
                            position,
                        ),
                    ));
                },
            });
        }

        Ok(string)
    }

    /// Number literals:
    /// Integer: 28173908, etc.
    /// Radix:   0b1011001011, 0xFF, 0o17
    /// Float:   420.69, etc.
    fn number(&mut self) -> Result<Token, CompileError> {
        let start = self.cursor.position();

        if self.cursor.current() == Some('0') {
            let radix = match self.cursor.next() {
                Some('b') => Some(2),
                Some('o') => Some(8),
                Some('x') => Some(16),
                _ => None,
            };
            if let Some(radix) = radix {
                self.cursor.skip(2);
                let digits = self.cursor.take_while(|n| n.is_digit(radix));
                if digits.is_empty() {
                    return Err(self.error("Expected digits after the radix prefix", start));
                }
                return i64::from_str_radix(digits, radix).map(Token::Integer).map_err(|_| {
                    self.error("Integer literal too large to fit in a signed 64-bit integer", start)
                });
            }
        }

        let whole = self.cursor.take_while(|n| n.is_ascii_digit());

        // There's a decimal point followed by a digit, so we parse as a float
        if self.cursor.current() == Some('.')
            && self.cursor.next().map_or(false, |n| n.is_ascii_digit())
        {
            self.cursor.advance();
            let fraction = self.cursor.take_while(|n| n.is_ascii_digit());
            let text = format!("{}.{}", whole, fraction);
            return text.parse::<f64>().map(Token::Float).map_err(|_| {
                self.error("Float literal does not fit in a 64-bit floating-point number", start)
            });
        }

        whole.parse::<i64>().map(Token::Integer).map_err(|_| {
            self.error("Decimal literal too large to fit in a signed 64-bit integer", start)
        })
    }
}
