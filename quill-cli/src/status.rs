use std::fmt::Display;

use colored::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Info,
    Success,
    Warn,
    Fatal,
}

/// A tagged message for the user, written to stderr
/// so script output on stdout stays clean.
pub struct Status {
    kind: Kind,
    tag: &'static str,
}

impl Status {
    pub const fn new(kind: Kind, tag: &'static str) -> Status {
        Status { kind, tag }
    }

    pub fn created() -> Status {
        Status::new(Kind::Success, "Created")
    }
    pub fn compiled() -> Status {
        Status::new(Kind::Success, "Compiled")
    }
    pub fn finished() -> Status {
        Status::new(Kind::Success, "Finished")
    }
    pub fn exported() -> Status {
        Status::new(Kind::Info, "Export")
    }
    pub fn warn() -> Status {
        Status::new(Kind::Warn, "Warning")
    }
    pub fn fatal() -> Status {
        Status::new(Kind::Fatal, "Fatal")
    }

    fn tag(&self) -> ColoredString {
        match self.kind {
            Kind::Info => self.tag.blue(),
            Kind::Success => self.tag.green(),
            Kind::Warn => self.tag.yellow(),
            Kind::Fatal => self.tag.red(),
        }
        .bold()
    }

    /// One-line messages sit right of the tag.
    /// Tracebacks and compile errors go underneath it, indented.
    pub fn render(&self, message: impl Display) -> String {
        let message = message.to_string();
        if message.lines().nth(1).is_none() {
            return format!("{:>12} {}", self.tag(), message);
        }

        let mut rendered = format!("\n{}\n", self.tag());
        for line in message.lines() {
            rendered.push_str("  ");
            rendered.push_str(line);
            rendered.push('\n');
        }
        rendered
    }

    pub fn log(&self, message: impl Display) {
        eprintln!("{}", self.render(message));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn layout() {
        colored::control::set_override(false);

        assert_eq!(Status::finished().render("'demo' returned 3"), "    Finished 'demo' returned 3");
        assert_eq!(
            Status::fatal().render("Traceback, most recent call last:\nRuntime Error: division by zero"),
            "\nFatal\n  Traceback, most recent call last:\n  Runtime Error: division by zero\n",
        );
    }
}
