use crate::common::span::Spanned;

/// Binary operators, including the statement-level assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Greater,
    Lesser,
    /// `>=`
    NotLesser,
    /// `<=`
    NotGreater,
    And,
    Or,
    PickChild,
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
}

impl BinaryOperator {
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinaryOperator::Assign
                | BinaryOperator::AddAssign
                | BinaryOperator::SubtractAssign
                | BinaryOperator::MultiplyAssign
                | BinaryOperator::DivideAssign
        )
    }

    /// The arithmetic operator a compound assignment applies.
    pub fn compound(self) -> Option<BinaryOperator> {
        match self {
            BinaryOperator::AddAssign => Some(BinaryOperator::Add),
            BinaryOperator::SubtractAssign => Some(BinaryOperator::Subtract),
            BinaryOperator::MultiplyAssign => Some(BinaryOperator::Multiply),
            BinaryOperator::DivideAssign => Some(BinaryOperator::Divide),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// `-x`
    Negate,
    /// `!x`
    Not,
}

/// A named argument at a call site, `key = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: Spanned<Expression>,
}

/// A function parameter, the default is evaluated
/// at call time only when the caller omits the argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Spanned<Expression>>,
}

/// One arm of a condition chain.
/// The trailing `else` arm has no condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Option<Spanned<Expression>>,
    pub body: Spanned<Expression>,
}

/// The expression tree the parser produces and the generator consumes.
/// Every node is wrapped in a `Spanned` carrying its source position.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A block of statements, with its own lexical scope.
    Scope(Vec<Spanned<Expression>>),
    Condition(Vec<Branch>),
    Loop {
        condition: Box<Spanned<Expression>>,
        body: Box<Spanned<Expression>>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Spanned<Expression>>,
        right: Box<Spanned<Expression>>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Spanned<Expression>>,
    },
    /// A native plugin call, `[Plugin key=value]`.
    Call {
        plugin: String,
        arguments: Vec<Argument>,
    },
    /// A call of a script function.
    /// The target is a name (a `String` node) or any expression
    /// evaluating to a function value.
    FunctionCall {
        target: Box<Spanned<Expression>>,
        arguments: Vec<Argument>,
    },
    FunctionDecl {
        name: String,
        parameters: Vec<Parameter>,
        body: Vec<Spanned<Expression>>,
    },
    /// A variable or constant reference.
    /// The name is itself an expression, resolved at run time.
    Variable {
        name: Box<Spanned<Expression>>,
        constant: bool,
    },
    Dialogue {
        speaker: Option<String>,
        content: String,
    },
    Import(Box<Spanned<Expression>>),
    /// Exports a variable, optionally assigning it first.
    Export {
        variable: Box<Spanned<Expression>>,
        value: Option<Box<Spanned<Expression>>>,
    },
    Language(Box<Spanned<Expression>>),
    Return(Option<Box<Spanned<Expression>>>),

    Integer(i64),
    Float(f64),
    String(String),
    Translatable(String),
    Boolean(bool),
    Null,
}

impl Expression {
    /// Whether evaluating this node leaves a value on the operand stack.
    /// Statements (assignments, control flow, declarations) do not.
    pub fn produces_value(&self) -> bool {
        match self {
            Expression::Binary { operator, .. } => !operator.is_assignment(),
            Expression::Scope(_)
            | Expression::Condition(_)
            | Expression::Loop { .. }
            | Expression::FunctionDecl { .. }
            | Expression::Dialogue { .. }
            | Expression::Export { .. }
            | Expression::Language(_)
            | Expression::Return(_) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::span::Position;

    fn leaf(expression: Expression) -> Box<Spanned<Expression>> {
        Box::new(Spanned::new(expression, Position::default()))
    }

    #[test]
    fn statements_do_not_produce_values() {
        let assign = Expression::Binary {
            operator: BinaryOperator::AddAssign,
            left: leaf(Expression::Null),
            right: leaf(Expression::Integer(1)),
        };
        let add = Expression::Binary {
            operator: BinaryOperator::Add,
            left: leaf(Expression::Integer(1)),
            right: leaf(Expression::Integer(1)),
        };
        assert!(!assign.produces_value());
        assert!(add.produces_value());
        assert!(Expression::Import(leaf(Expression::String("a".into()))).produces_value());
        assert!(!Expression::Return(None).produces_value());
    }

    #[test]
    fn compound_operators() {
        assert_eq!(BinaryOperator::DivideAssign.compound(), Some(BinaryOperator::Divide));
        assert_eq!(BinaryOperator::Assign.compound(), None);
        assert!(BinaryOperator::Assign.is_assignment());
        assert!(!BinaryOperator::PickChild.is_assignment());
    }
}
