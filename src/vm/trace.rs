use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::{
    common::{container::FormatError, span::Position},
    compiler::CompileError,
    value::operator::OperatorError,
};

/// What went wrong while running a script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    #[error(transparent)]
    Operator(#[from] OperatorError),
    #[error("can not reassign constant '{name}'")]
    ConstantReassignment { name: String },
    #[error("stack underflow")]
    StackUnderflow,
    #[error("unknown opcode {byte:#04x}")]
    UnknownOpcode { byte: u8 },
    #[error("label {id} is not in the label table")]
    UnresolvedLabel { id: usize },
    #[error("string {index} is not in the string pool")]
    MissingString { index: usize },
    #[error("left more scopes than were entered")]
    UnbalancedScope,
    #[error("instruction operand runs past the end of the code")]
    TruncatedOperand,
    #[error("a {kind} can not be used as a name")]
    InvalidName { kind: String },
    #[error("a {kind} can not be called")]
    NotCallable { kind: String },
    #[error("no function named '{name}'")]
    UndefinedFunction { name: String },
    #[error("no plugin named '{name}' is registered")]
    PluginNotFound { name: String },
    #[error("plugin '{name}' failed: {message}")]
    Plugin { name: String, message: String },
    #[error("script '{id}' could not be found")]
    ScriptNotFound { id: String },
    #[error("script '{id}' is already being loaded")]
    CircularLoad { id: String },
    #[error("script '{id}' failed to compile:\n{error}")]
    Compile { id: String, error: Box<CompileError> },
    #[error("script '{id}' is not a valid container: {source}")]
    Format { id: String, source: FormatError },
    #[error("no text for translation {id}")]
    MissingTranslation { id: u32 },
    #[error("the runtime has already finished")]
    NotRunnable,
    #[error("the runtime is not waiting on a plugin")]
    ResumeWithoutPending,
}

/// One activation in a traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub script: Arc<str>,
    pub offset: usize,
    pub position: Option<Position>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => writeln!(f, "  In {}:{} (offset {})", self.script, position, self.offset),
            None => writeln!(f, "  In {} (offset {})", self.script, self.offset),
        }
    }
}

/// Represents a runtime error, i.e. a traceback.
/// Frames are ordered oldest first, the faulting instruction last.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub fault: Fault,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    pub fn new(fault: Fault, trace: Vec<TraceFrame>) -> RuntimeError {
        RuntimeError { fault, trace }
    }

    /// Errors raised outside of any activation, e.g. when resuming a finished runtime.
    pub fn bare(fault: Fault) -> RuntimeError {
        RuntimeError::new(fault, vec![])
    }

    /// Used to add context (i.e. callers) while unwinding.
    pub fn add_context(&mut self, frame: TraceFrame) {
        self.trace.insert(0, frame);
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback, most recent call last:")?;
        for frame in self.trace.iter() {
            fmt::Display::fmt(frame, f)?;
        }
        write!(f, "Runtime Error: {}", self.fault)
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn traceback() {
        let mut error = RuntimeError::new(
            Fault::ConstantReassignment { name: "X".to_string() },
            vec![TraceFrame {
                script: Arc::from("helpers"),
                offset: 14,
                position: Some(Position::new(2, 4)),
            }],
        );
        error.add_context(TraceFrame { script: Arc::from("main"), offset: 3, position: None });

        let target = "\
            Traceback, most recent call last:\n  \
              In main (offset 3)\n  \
              In helpers:3:5 (offset 14)\n\
            Runtime Error: can not reassign constant 'X'";
        assert_eq!(error.to_string(), target);
    }

    #[test]
    fn operator_faults_are_transparent() {
        let fault = Fault::from(OperatorError::DivisionByZero);
        assert_eq!(fault.to_string(), "division by zero");
    }
}
