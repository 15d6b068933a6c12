//! Contains datastructures and utility functions
//! common to both the `compiler` and `vm`.
//!
//! - Source code representation, content hashing and positions.
//! - Opcodes and number splicing.
//! - The bytecode container and its binary codec.
//! - Translation tables.

pub mod container;
pub mod number;
pub mod opcode;
pub mod source;
pub mod span;
pub mod translation;
