use std::fmt::{self, Display, Formatter};

/// A point in a source, both 0-based.
/// Positions are what tokens, tree nodes and debug entries carry,
/// they're converted to 1-based numbers only when displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Position {
        Position { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// A wrapper for positioned types.
/// For example, a token, such as
/// ```ignore
/// pub enum Token {
///     Integer(i64),
///     OpenParen,
///     CloseParen,
/// }
/// ```
/// or the like, can be spanned to indicate where it was lexed from (a `Spanned<Token>`).
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub item: T,
    pub position: Position,
}

impl<T> Spanned<T> {
    /// Takes a generic item, and wraps it with a `Position` to make it `Spanned`.
    pub fn new(item: T, position: Position) -> Spanned<T> {
        Spanned { item, position }
    }

    /// Applies a function to a `Spanned`'s item, keeping the position.
    pub fn map<B>(self, f: impl FnOnce(T) -> B) -> Spanned<B> {
        Spanned::new(f(self.item), self.position)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn displays_one_based() {
        assert_eq!(Position::new(0, 0).to_string(), "1:1");
        assert_eq!(Position::new(11, 4).to_string(), "12:5");
    }

    #[test]
    fn map_keeps_position() {
        let spanned = Spanned::new(2, Position::new(3, 7));
        let mapped = spanned.map(|n| n * 21);
        assert_eq!(mapped.item, 42);
        assert_eq!(mapped.position, Position::new(3, 7));
    }
}
