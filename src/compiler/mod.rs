//! This module contains the compiler implementation.
//!
//! Each step in the compiler pipeline turns one datatype into another.
//! loosely, starting with `Source` (string + identifier):
//!
//! 1. Tokens:     `lex.rs`
//! 2. Tree:       `parse.rs`
//! 3. Container:  `gen.rs`
//!
//! The container can then be encoded to bytes, see `common::container`.

pub mod cursor;
pub mod gen;
pub mod lex;
pub mod parse;
pub mod syntax;
pub mod token;
pub mod tree;

use crate::common::{container::Container, source::Source, span::Spanned};

pub use gen::Generator;
pub use lex::Lexer;
pub use parse::Parser;
pub use syntax::CompileError;

use token::Token;
use tree::Expression;

pub fn lex(source: &Source) -> Result<Vec<Spanned<Token>>, CompileError> {
    Lexer::lex(source)
}

pub fn parse(
    tokens: Vec<Spanned<Token>>,
    source: &Source,
) -> Result<Spanned<Expression>, CompileError> {
    Parser::parse(tokens, source)
}

pub fn gen(tree: &Spanned<Expression>, source: &Source) -> Result<Container, CompileError> {
    Generator::generate(tree, source)
}

/// Runs the whole pipeline over a source.
pub fn compile(source: &Source) -> Result<Container, CompileError> {
    let tokens = lex(source)?;
    let tree = parse(tokens, source)?;
    gen(&tree, source)
}
