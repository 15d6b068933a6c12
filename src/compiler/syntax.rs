use std::fmt;

use crate::common::{source::Source, span::Position};

/// Represents a note attached to a compile error,
/// i.e. a location in source code with an optional
/// specific hint or tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub position: Position,
    pub hint: Option<String>,
}

impl Note {
    pub fn new(position: Position) -> Note {
        Note { position, hint: None }
    }

    pub fn new_with_hint(hint: &str, position: Position) -> Note {
        Note { position, hint: Some(hint.to_string()) }
    }
}

/// Represents a static error (lexical or syntactic) found at compile time.
/// A compile error aborts the whole unit, no partial bytecode is produced.
/// The offending source line is captured when the error is raised,
/// so the error can be displayed after the `Source` is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub reason: String,
    pub identifier: String,
    pub note: Note,
    pub excerpt: String,
}

impl CompileError {
    /// Creates a new compile error pointing at a position in a source.
    pub fn error(reason: &str, source: &Source, position: Position) -> CompileError {
        CompileError::error_with_note(reason, source, Note::new(position))
    }

    /// Creates a new compile error, but with an added hint.
    pub fn error_with_note(reason: &str, source: &Source, note: Note) -> CompileError {
        CompileError {
            reason: reason.to_string(),
            identifier: source.identifier.clone(),
            excerpt: source.line(note.position.line).to_string(),
            note,
        }
    }

    pub fn position(&self) -> Position {
        self.note.position
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let position = self.note.position;
        let line = (position.line + 1).to_string();
        let gutter = " ".repeat(line.len());

        // columns count characters, so the caret lines up on multi-byte text
        let offset: String = self
            .excerpt
            .chars()
            .take(position.column)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();

        writeln!(f, "In {}:{}", self.identifier, position)?;
        writeln!(f, "{} │", gutter)?;
        writeln!(f, "{} │ {}", line, self.excerpt)?;
        match &self.note.hint {
            Some(hint) => writeln!(f, "{} │ {}^ note: {}", gutter, offset, hint)?,
            None => writeln!(f, "{} │ {}^", gutter, offset)?,
        }
        writeln!(f, "{} │", gutter)?;
        write!(f, "Syntax Error: {}", self.reason)
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error() {
        let source = Source::source("@x = 'Hello, world' -> y + 1");
        let error = CompileError::error(
            "Unexpected name `y`",
            &source,
            Position::new(0, 23),
        );

        let target = "In source:1:24
  │
1 │ @x = 'Hello, world' -> y + 1
  │                        ^
  │
Syntax Error: Unexpected name `y`";

        assert_eq!(error.to_string(), target);
    }

    #[test]
    fn hint_and_wide_gutter() {
        let mut contents = "\n".repeat(11);
        contents.push_str("[Wait ms=]");
        let source = Source::new(&contents, "chapter");
        let error = CompileError::error_with_note(
            "Expected a value after `=`",
            &source,
            Note::new_with_hint("remove the `=` to pass `true`", Position::new(11, 9)),
        );

        let target = "In chapter:12:10
   │
12 │ [Wait ms=]
   │          ^ note: remove the `=` to pass `true`
   │
Syntax Error: Expected a value after `=`";

        assert_eq!(error.to_string(), target);
        assert_eq!(error.position(), Position::new(11, 9));
    }
}
