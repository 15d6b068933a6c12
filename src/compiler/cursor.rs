use crate::common::span::Position;

/// A cursor over source text.
/// Tracks the byte index alongside the 0-based line and column,
/// columns are counted in characters.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    contents: &'a str,
    index: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(contents: &'a str) -> Cursor<'a> {
        Cursor { contents, index: 0, line: 0, column: 0 }
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    pub fn is_done(&self) -> bool {
        self.index >= self.contents.len()
    }

    /// All text after the cursor.
    pub fn remaining(&self) -> &'a str {
        &self.contents[self.index..]
    }

    /// The character under the cursor.
    pub fn current(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// The character right before the cursor.
    pub fn previous(&self) -> Option<char> {
        self.contents[..self.index].chars().next_back()
    }

    /// The character right after the one under the cursor.
    pub fn next(&self) -> Option<char> {
        let mut chars = self.remaining().chars();
        chars.next();
        chars.next()
    }

    pub fn starts_with(&self, pattern: &str) -> bool {
        self.remaining().starts_with(pattern)
    }

    /// Moves past the character under the cursor, returning it.
    pub fn advance(&mut self) -> Option<char> {
        let c = self.current()?;
        self.index += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Moves forward by a number of bytes.
    /// `bytes` must land on a character boundary.
    pub fn skip(&mut self, bytes: usize) {
        let target = self.index + bytes;
        while self.index < target && self.advance().is_some() {}
    }

    /// Moves forward while the predicate holds, returning the text passed over.
    pub fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.index;
        while let Some(c) = self.current() {
            if !predicate(c) {
                break;
            }
            self.advance();
        }
        &self.contents[start..self.index]
    }

    /// Finds the byte offset, relative to the cursor,
    /// of the first occurrence of `pattern`
    /// that is not preceded by an unescaped backslash.
    /// A backslash escapes exactly the character after it,
    /// so in `\\'` the quote is not escaped.
    pub fn find_unescaped(&self, pattern: &str) -> Option<usize> {
        let remaining = self.remaining();
        let mut escaped = false;

        for (offset, c) in remaining.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            if remaining[offset..].starts_with(pattern) {
                return Some(offset);
            }
            if c == '\\' {
                escaped = true;
            }
        }

        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn neighbours() {
        let mut cursor = Cursor::new("ab");
        assert_eq!(cursor.previous(), None);
        assert_eq!(cursor.current(), Some('a'));
        assert_eq!(cursor.next(), Some('b'));
        cursor.advance();
        assert_eq!(cursor.previous(), Some('a'));
        assert_eq!(cursor.current(), Some('b'));
        assert_eq!(cursor.next(), None);
        cursor.advance();
        assert!(cursor.is_done());
        assert_eq!(cursor.current(), None);
    }

    #[test]
    fn tracks_lines_and_columns() {
        let mut cursor = Cursor::new("é\nxyz");
        cursor.skip("é\nxy".len());
        assert_eq!(cursor.position(), Position::new(1, 2));
    }

    #[test]
    fn skips_escaped_matches() {
        let cursor = Cursor::new(r"it\'s here' and more");
        assert_eq!(cursor.find_unescaped("'"), Some(10));

        let cursor = Cursor::new(r"back\\' slash");
        assert_eq!(cursor.find_unescaped("'"), Some(6));

        let cursor = Cursor::new(r"no \// comment // yes");
        assert_eq!(cursor.find_unescaped("//"), Some(15));

        let cursor = Cursor::new("nothing");
        assert_eq!(cursor.find_unescaped("*/"), None);
    }

    #[test]
    fn take_while_returns_text() {
        let mut cursor = Cursor::new("name_1 rest");
        assert_eq!(cursor.take_while(|c| c.is_alphanumeric() || c == '_'), "name_1");
        assert_eq!(cursor.current(), Some(' '));
    }
}
