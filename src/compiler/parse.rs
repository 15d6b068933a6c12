use tracing::debug;

use crate::{
    common::{
        source::Source,
        span::{Position, Spanned},
    },
    compiler::{
        syntax::{CompileError, Note},
        token::{Keyword, Token},
        tree::{Argument, BinaryOperator, Branch, Expression, Parameter, UnaryOperator},
    },
};

/// This little enum defines the different precedence levels
/// of binary and postfix operators.
/// Each successive level is higher, so, for example,
/// multiplication is higher than addition: `* > +`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prec {
    /// No precedence.
    None = 0,
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==`, `!=`
    Equality,
    /// `<`, `>`, `<=`, `>=`
    Compare,
    /// `+`, `-`
    AddSub,
    /// `*`, `/`
    MulDiv,
    /// Prefix `-` and `!`.
    Unary,
    /// `->`
    PickChild,
    /// `f(...)`
    Call,
    /// Highest precedence.
    End,
}

impl Prec {
    /// Increments precedence level to cause the
    /// parser to associate infix operators to the left.
    /// For example, addition is left-associated:
    /// `a + b + c` becomes `(a + b) + c`.
    /// `Prec::End` is the highest precedence and stays put.
    pub fn left(&self) -> Prec {
        match self {
            Prec::None => Prec::Or,
            Prec::Or => Prec::And,
            Prec::And => Prec::Equality,
            Prec::Equality => Prec::Compare,
            Prec::Compare => Prec::AddSub,
            Prec::AddSub => Prec::MulDiv,
            Prec::MulDiv => Prec::Unary,
            Prec::Unary => Prec::PickChild,
            Prec::PickChild => Prec::Call,
            Prec::Call | Prec::End => Prec::End,
        }
    }
}

/// How deep statements and expressions may nest.
pub const MAX_DEPTH: usize = 256;

/// A recursive-descent parser over a token stream.
/// There is no error recovery, the first failure aborts the unit.
pub struct Parser<'a> {
    source: &'a Source,
    tokens: Vec<Spanned<Token>>,
    index: usize,
    /// Statements and expressions currently being parsed.
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Parses a token stream into a tree.
    /// The result is a `Scope` holding the top-level statements.
    pub fn parse(
        tokens: Vec<Spanned<Token>>,
        source: &'a Source,
    ) -> Result<Spanned<Expression>, CompileError> {
        let mut tokens = tokens;
        if !matches!(tokens.last(), Some(Spanned { item: Token::End, .. })) {
            let end = tokens.last().map(|t| t.position).unwrap_or_default();
            tokens.push(Spanned::new(Token::End, end));
        }

        let mut parser = Parser { source, tokens, index: 0, depth: 0 };
        let statements = parser.statements(&Token::End)?;
        debug!(script = %source.identifier, statements = statements.len(), "parsed");

        Ok(Spanned::new(Expression::Scope(statements), Position::default()))
    }

    // Cursor helpers

    fn current(&self) -> &Spanned<Token> {
        // the stream always ends with `Token::End`, which is never consumed
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn position(&self) -> Position {
        self.current().position
    }

    fn advance(&mut self) -> Spanned<Token> {
        let token = self.current().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn skip_seps(&mut self) {
        while self.current().item == Token::Sep {
            self.advance();
        }
    }

    /// The first token after any separators, without consuming anything.
    fn peek_past_seps(&self) -> &Token {
        self.tokens[self.index..]
            .iter()
            .map(|t| &t.item)
            .find(|t| **t != Token::Sep)
            .unwrap_or(&self.tokens[self.tokens.len() - 1].item)
    }

    fn error(&self, reason: &str, position: Position) -> CompileError {
        CompileError::error(reason, self.source, position)
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let token = self.current();
        self.error(&format!("Expected {}, found {}", expected, token.item), token.position)
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<Position, CompileError> {
        if self.current().item == token {
            Ok(self.advance().position)
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn name(&mut self, expected: &str) -> Result<Spanned<String>, CompileError> {
        match self.current().item.clone() {
            Token::Iden(name) => {
                let position = self.advance().position;
                Ok(Spanned::new(name, position))
            },
            _ => Err(self.unexpected(expected)),
        }
    }

    /// Runs a rule one level deeper,
    /// failing instead of recursing past `MAX_DEPTH`.
    fn nested<T>(
        &mut self,
        rule: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("This is nested too deeply", self.position()));
        }
        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }

    // Statements

    /// Parses separated statements until `until`, which is not consumed.
    fn statements(&mut self, until: &Token) -> Result<Vec<Spanned<Expression>>, CompileError> {
        let mut statements = vec![];
        self.skip_seps();

        while self.current().item != *until {
            statements.push(self.nested(Parser::statement)?);
            match &self.current().item {
                Token::Sep => self.skip_seps(),
                t if t == until => (),
                _ => return Err(self.unexpected("a new line or `;` after the statement")),
            }
        }

        Ok(statements)
    }

    /// Parses `{ statements }`.
    fn block(&mut self) -> Result<(Vec<Spanned<Expression>>, Position), CompileError> {
        let position = self.expect(Token::OpenCurly, "a block, like `{ ... }`")?;
        let statements = self.statements(&Token::CloseCurly)?;
        self.expect(Token::CloseCurly, "a closing curly brace")?;
        Ok((statements, position))
    }

    fn scope(&mut self) -> Result<Spanned<Expression>, CompileError> {
        let (statements, position) = self.block()?;
        Ok(Spanned::new(Expression::Scope(statements), position))
    }

    fn statement(&mut self) -> Result<Spanned<Expression>, CompileError> {
        let position = self.position();

        match self.current().item.clone() {
            Token::OpenCurly => self.scope(),
            Token::Keyword(Keyword::If) => self.condition(),
            Token::Keyword(Keyword::While) => {
                self.advance();
                let condition = self.expr(Prec::None)?;
                let body = self.scope()?;
                Ok(Spanned::new(
                    Expression::Loop { condition: Box::new(condition), body: Box::new(body) },
                    position,
                ))
            },
            Token::Keyword(Keyword::Function) => self.function(),
            Token::Keyword(Keyword::Return) => {
                self.advance();
                let value = match self.current().item {
                    Token::Sep | Token::CloseCurly | Token::End => None,
                    _ => Some(Box::new(self.expr(Prec::None)?)),
                };
                Ok(Spanned::new(Expression::Return(value), position))
            },
            Token::Keyword(Keyword::Export) => {
                self.advance();
                let variable = self.variable()?;
                let value = if self.current().item == Token::Assign {
                    self.advance();
                    Some(Box::new(self.expr(Prec::None)?))
                } else {
                    None
                };
                Ok(Spanned::new(
                    Expression::Export { variable: Box::new(variable), value },
                    position,
                ))
            },
            Token::Keyword(Keyword::Language) => {
                self.advance();
                let language = self.expr(Prec::None)?;
                Ok(Spanned::new(Expression::Language(Box::new(language)), position))
            },
            Token::Dialogue { speaker, content } => {
                self.advance();
                Ok(Spanned::new(Expression::Dialogue { speaker, content }, position))
            },
            _ => self.assignment(),
        }
    }

    /// `if c { } elseif c { } else { }`,
    /// `elseif` and `else` may start on a new line.
    fn condition(&mut self) -> Result<Spanned<Expression>, CompileError> {
        let position = self.advance().position;
        let condition = self.expr(Prec::None)?;
        let body = self.scope()?;
        let mut branches = vec![Branch { condition: Some(condition), body }];

        loop {
            match self.peek_past_seps() {
                Token::Keyword(Keyword::ElseIf) => {
                    self.skip_seps();
                    self.advance();
                    let condition = self.expr(Prec::None)?;
                    let body = self.scope()?;
                    branches.push(Branch { condition: Some(condition), body });
                },
                Token::Keyword(Keyword::Else) => {
                    self.skip_seps();
                    self.advance();
                    let body = self.scope()?;
                    branches.push(Branch { condition: None, body });
                    break;
                },
                _ => break,
            }
        }

        Ok(Spanned::new(Expression::Condition(branches), position))
    }

    /// `function name(a, b = default) { body }`
    fn function(&mut self) -> Result<Spanned<Expression>, CompileError> {
        let position = self.advance().position;
        let name = self.name("a function name")?.item;

        self.expect(Token::OpenParen, "an opening paren before the parameters")?;
        let mut parameters: Vec<Parameter> = vec![];
        while self.current().item != Token::CloseParen {
            let parameter = self.name("a parameter name")?;
            if parameters.iter().any(|p| p.name == parameter.item) {
                return Err(self.error(
                    &format!("Parameter `{}` is declared twice", parameter.item),
                    parameter.position,
                ));
            }

            let default = if self.current().item == Token::Assign {
                self.advance();
                Some(self.expr(Prec::None)?)
            } else {
                None
            };
            parameters.push(Parameter { name: parameter.item, default });

            match self.current().item {
                Token::Comma => { self.advance(); },
                Token::CloseParen => (),
                _ => return Err(self.unexpected("a comma or a closing paren")),
            }
        }
        self.advance();

        let (body, _) = self.block()?;
        Ok(Spanned::new(Expression::FunctionDecl { name, parameters, body }, position))
    }

    /// An expression statement, optionally assigned to a variable.
    fn assignment(&mut self) -> Result<Spanned<Expression>, CompileError> {
        let left = self.expr(Prec::None)?;

        let operator = match self.current().item {
            Token::Assign => BinaryOperator::Assign,
            Token::AddAssign => BinaryOperator::AddAssign,
            Token::SubAssign => BinaryOperator::SubtractAssign,
            Token::MulAssign => BinaryOperator::MultiplyAssign,
            Token::DivAssign => BinaryOperator::DivideAssign,
            _ => return Ok(left),
        };

        let position = self.position();
        if !matches!(left.item, Expression::Variable { .. }) {
            return Err(CompileError::error_with_note(
                "Can only assign to a variable or a constant",
                self.source,
                Note::new_with_hint("variables are written `@name`", left.position),
            ));
        }
        self.advance();
        let right = self.expr(Prec::None)?;

        Ok(Spanned::new(
            Expression::Binary { operator, left: Box::new(left), right: Box::new(right) },
            position,
        ))
    }

    // Expressions

    /// Parses an expression whose operators all bind at least as tight as `prec`.
    fn expr(&mut self, prec: Prec) -> Result<Spanned<Expression>, CompileError> {
        self.nested(|parser| parser.operators(prec))
    }

    fn operators(&mut self, prec: Prec) -> Result<Spanned<Expression>, CompileError> {
        let mut left = self.prefix()?;

        loop {
            let infix = Parser::infix_prec(&self.current().item);
            if infix == Prec::None || infix < prec {
                break;
            }
            left = self.infix(left, infix)?;
        }

        Ok(left)
    }

    fn infix_prec(token: &Token) -> Prec {
        match token {
            Token::Or => Prec::Or,
            Token::And => Prec::And,
            Token::Equal | Token::NotEqual => Prec::Equality,
            Token::Greater | Token::Lesser | Token::GreaterEqual | Token::LesserEqual => {
                Prec::Compare
            },
            Token::Add | Token::Sub => Prec::AddSub,
            Token::Mul | Token::Div => Prec::MulDiv,
            Token::Arrow => Prec::PickChild,
            Token::OpenParen => Prec::Call,
            _ => Prec::None,
        }
    }

    fn infix(
        &mut self,
        left: Spanned<Expression>,
        prec: Prec,
    ) -> Result<Spanned<Expression>, CompileError> {
        let position = self.position();

        let operator = match self.current().item {
            Token::OpenParen => {
                let arguments = self.arguments()?;
                return Ok(Spanned::new(
                    Expression::FunctionCall { target: Box::new(left), arguments },
                    position,
                ));
            },
            Token::Or => BinaryOperator::Or,
            Token::And => BinaryOperator::And,
            Token::Equal => BinaryOperator::Equal,
            Token::NotEqual => BinaryOperator::NotEqual,
            Token::Greater => BinaryOperator::Greater,
            Token::Lesser => BinaryOperator::Lesser,
            Token::GreaterEqual => BinaryOperator::NotLesser,
            Token::LesserEqual => BinaryOperator::NotGreater,
            Token::Add => BinaryOperator::Add,
            Token::Sub => BinaryOperator::Subtract,
            Token::Mul => BinaryOperator::Multiply,
            Token::Div => BinaryOperator::Divide,
            Token::Arrow => BinaryOperator::PickChild,
            _ => return Err(self.unexpected("an operator")),
        };
        self.advance();

        let right = self.expr(prec.left())?;
        Ok(Spanned::new(
            Expression::Binary { operator, left: Box::new(left), right: Box::new(right) },
            position,
        ))
    }

    fn prefix(&mut self) -> Result<Spanned<Expression>, CompileError> {
        let position = self.position();

        let expression = match self.current().item.clone() {
            Token::Integer(n) => { self.advance(); Expression::Integer(n) },
            Token::Float(f) => { self.advance(); Expression::Float(f) },
            Token::String(s) => { self.advance(); Expression::String(s) },
            Token::Translatable(s) => { self.advance(); Expression::Translatable(s) },
            Token::Boolean(b) => { self.advance(); Expression::Boolean(b) },
            Token::Null => { self.advance(); Expression::Null },

            Token::Variable | Token::Constant => return self.variable(),
            Token::OpenBracket => return self.bracket(),

            Token::OpenParen => {
                self.advance();
                let inner = self.expr(Prec::None)?;
                self.expect(Token::CloseParen, "a closing paren")?;
                return Ok(inner);
            },

            Token::Sub | Token::Not => {
                let operator = if self.advance().item == Token::Sub {
                    UnaryOperator::Negate
                } else {
                    UnaryOperator::Not
                };
                let operand = self.expr(Prec::Unary)?;
                match (operator, operand.item) {
                    (UnaryOperator::Negate, Expression::Integer(n)) => {
                        Expression::Integer(n.wrapping_neg())
                    },
                    (UnaryOperator::Negate, Expression::Float(f)) => Expression::Float(-f),
                    (operator, item) => Expression::Unary {
                        operator,
                        operand: Box::new(Spanned::new(item, operand.position)),
                    },
                }
            },

            Token::Keyword(Keyword::Import) => {
                self.advance();
                let script = self.expr(Prec::Call)?;
                Expression::Import(Box::new(script))
            },

            Token::Iden(name) => {
                self.advance();
                if self.current().item != Token::OpenParen {
                    return Err(CompileError::error_with_note(
                        &format!("Unexpected name `{}`", name),
                        self.source,
                        Note::new_with_hint(
                            "variables are written `@name`, functions are called `name(...)`",
                            position,
                        ),
                    ));
                }
                let arguments = self.arguments()?;
                let target = Spanned::new(Expression::String(name), position);
                Expression::FunctionCall { target: Box::new(target), arguments }
            },

            Token::Keyword(keyword) => {
                return Err(self.error(
                    &format!("`{:?}` can only start a statement", keyword).to_lowercase(),
                    position,
                ))
            },

            _ => return Err(self.unexpected("an expression")),
        };

        Ok(Spanned::new(expression, position))
    }

    /// `@name`, `@#name`, `@'name'`, `@"name"`, `@(expression)`.
    fn variable(&mut self) -> Result<Spanned<Expression>, CompileError> {
        let sigil = self.advance();
        let constant = match sigil.item {
            Token::Variable => false,
            Token::Constant => true,
            _ => return Err(self.error("Expected a variable, like `@name`", sigil.position)),
        };

        let name_position = self.position();
        let name = match self.current().item.clone() {
            Token::Iden(name) => { self.advance(); Expression::String(name) },
            Token::String(name) => { self.advance(); Expression::String(name) },
            Token::Translatable(name) => { self.advance(); Expression::Translatable(name) },
            Token::OpenParen => {
                self.advance();
                let inner = self.expr(Prec::None)?;
                self.expect(Token::CloseParen, "a closing paren")?;
                inner.item
            },
            _ => return Err(self.unexpected("a variable name")),
        };

        Ok(Spanned::new(
            Expression::Variable {
                name: Box::new(Spanned::new(name, name_position)),
                constant,
            },
            sigil.position,
        ))
    }

    /// `(a = 1, b = 2)`
    fn arguments(&mut self) -> Result<Vec<Argument>, CompileError> {
        self.expect(Token::OpenParen, "an opening paren")?;
        let mut arguments = vec![];

        while self.current().item != Token::CloseParen {
            let name = self.name("an argument name")?.item;
            self.expect(Token::Assign, "`=` after the argument name")?;
            let value = self.expr(Prec::None)?;
            arguments.push(Argument { name, value });

            match self.current().item {
                Token::Comma => { self.advance(); },
                Token::CloseParen => (),
                _ => return Err(self.unexpected("a comma or a closing paren")),
            }
        }
        self.advance();

        Ok(arguments)
    }

    /// `[Plugin key=value flag]` or `[@function key=value]`.
    /// A key without a value passes `true`.
    fn bracket(&mut self) -> Result<Spanned<Expression>, CompileError> {
        let position = self.advance().position;

        enum Target {
            Plugin(String),
            Function(Spanned<Expression>),
        }

        let target = match self.current().item.clone() {
            Token::Iden(name) => { self.advance(); Target::Plugin(name) },
            Token::Variable | Token::Constant => Target::Function(self.variable()?),
            _ => return Err(self.unexpected("a plugin name or a function variable")),
        };

        let mut arguments = vec![];
        loop {
            match self.current().item.clone() {
                Token::CloseBracket => { self.advance(); break; },
                Token::Comma => { self.advance(); },
                Token::Iden(name) => {
                    let key = self.advance().position;
                    let value = if self.current().item == Token::Assign {
                        self.advance();
                        self.expr(Prec::None)?
                    } else {
                        Spanned::new(Expression::Boolean(true), key)
                    };
                    arguments.push(Argument { name, value });
                },
                _ => return Err(self.unexpected("an argument name or a closing bracket")),
            }
        }

        let expression = match target {
            Target::Plugin(plugin) => Expression::Call { plugin, arguments },
            Target::Function(function) => {
                Expression::FunctionCall { target: Box::new(function), arguments }
            },
        };
        Ok(Spanned::new(expression, position))
    }
}
