use indexmap::IndexSet;
use tracing::debug;

use crate::{
    common::{
        container::{Container, DebugPosition},
        number::split_number,
        opcode::Opcode,
        source::Source,
        span::{Position, Spanned},
        translation::TranslationTable,
    },
    compiler::{
        syntax::CompileError,
        tree::{BinaryOperator, Expression, UnaryOperator},
    },
};

/// One unit of pending work.
/// The generator walks the tree with an explicit stack of these,
/// so deeply nested expressions never grow the host call stack.
enum Task<'a> {
    /// Generate code for a node, leaving its value (if any) on the stack.
    Visit(&'a Spanned<Expression>),
    /// Generate code for a node, discarding its value.
    Statement(&'a Spanned<Expression>),
    /// Emit an opcode that may fault, recording its source position.
    Op(Opcode, Position),
    /// Emit a branch-like opcode with a label operand.
    Jump(Opcode, usize),
    /// Bind a label to the current code offset.
    Mark(usize),
    String(&'a str),
    Integer(i64),
}

/// A bytecode generator that walks a tree and produces a `Container`.
pub struct Generator<'a> {
    source: &'a Source,
    code: Vec<u8>,
    strings: IndexSet<String>,
    /// Translatable texts, numbered by insertion order.
    translations: IndexSet<String>,
    /// Label id to offset, `None` until marked.
    labels: Vec<Option<usize>>,
    positions: Vec<DebugPosition>,
    work: Vec<Task<'a>>,
}

impl<'a> Generator<'a> {
    /// Generates a container from a parsed script.
    /// The last top-level statement, if it's an expression,
    /// becomes the value the script returns.
    pub fn generate(
        tree: &'a Spanned<Expression>,
        source: &'a Source,
    ) -> Result<Container, CompileError> {
        let mut generator = Generator {
            source,
            code: vec![],
            strings: IndexSet::new(),
            translations: IndexSet::new(),
            labels: vec![],
            positions: vec![],
            work: vec![],
        };

        let statements = match &tree.item {
            Expression::Scope(statements) => statements.iter().collect::<Vec<_>>(),
            _ => vec![tree],
        };

        let mut tasks = vec![];
        match statements.split_last() {
            Some((last, rest)) => {
                tasks.extend(rest.iter().map(|s| Task::Statement(*s)));
                if last.item.produces_value() {
                    tasks.push(Task::Visit(*last));
                } else {
                    tasks.push(Task::Statement(*last));
                    tasks.push(Task::Op(Opcode::LoadNull, last.position));
                }
                tasks.push(Task::Op(Opcode::Return, last.position));
            },
            None => {
                tasks.push(Task::Op(Opcode::LoadNull, tree.position));
                tasks.push(Task::Op(Opcode::Return, tree.position));
            },
        }
        generator.schedule(tasks);
        generator.run()?;

        generator.finish()
    }

    /// Pushes tasks so that they're executed in order.
    fn schedule(&mut self, tasks: Vec<Task<'a>>) {
        self.work.extend(tasks.into_iter().rev());
    }

    fn label(&mut self) -> usize {
        self.labels.push(None);
        self.labels.len() - 1
    }

    fn run(&mut self) -> Result<(), CompileError> {
        while let Some(task) = self.work.pop() {
            match task {
                Task::Visit(node) => self.visit(node)?,
                Task::Statement(node) => {
                    let mut tasks = vec![Task::Visit(node)];
                    if node.item.produces_value() {
                        tasks.push(Task::Op(Opcode::Pop, node.position));
                    }
                    self.schedule(tasks);
                },
                Task::Op(opcode, position) => self.emit_at(opcode, position),
                Task::Jump(opcode, label) => {
                    self.emit(opcode);
                    self.code.append(&mut split_number(label));
                },
                Task::Mark(label) => self.labels[label] = Some(self.code.len()),
                Task::String(string) => self.string(string),
                Task::Integer(integer) => self.integer(integer),
            }
        }
        Ok(())
    }

    fn emit(&mut self, opcode: Opcode) {
        self.code.push(opcode as u8);
    }

    /// Emits an opcode, noting where it came from.
    /// Runs of opcodes from the same position share one entry.
    fn emit_at(&mut self, opcode: Opcode, position: Position) {
        if self.positions.last().map(|p| p.position) != Some(position) {
            self.positions.push(DebugPosition { offset: self.code.len(), position });
        }
        self.emit(opcode);
    }

    fn string(&mut self, string: &str) {
        let (index, _) = self.strings.insert_full(string.to_string());
        self.emit(Opcode::LoadString);
        self.code.append(&mut split_number(index));
    }

    fn translatable(&mut self, text: &str, position: Position) {
        let (id, _) = self.translations.insert_full(text.to_string());
        self.emit_at(Opcode::LoadTranslatable, position);
        self.code.append(&mut split_number(id));
    }

    fn integer(&mut self, integer: i64) {
        match Opcode::small_integer(integer) {
            Some(opcode) => self.emit(opcode),
            None => {
                self.emit(Opcode::LoadInteger);
                self.code.extend_from_slice(&integer.to_le_bytes());
            },
        }
    }

    fn float(&mut self, float: f64) {
        match Opcode::small_float(float) {
            Some(opcode) => self.emit(opcode),
            None => {
                self.emit(Opcode::LoadFloat);
                self.code.extend_from_slice(&float.to_le_bytes());
            },
        }
    }

    /// The tasks that evaluate a variable's name, and whether it's a constant.
    fn variable(
        &self,
        node: &'a Spanned<Expression>,
    ) -> Result<(&'a Spanned<Expression>, bool), CompileError> {
        match &node.item {
            Expression::Variable { name, constant } => Ok((name.as_ref(), *constant)),
            _ => Err(CompileError::error(
                "Expected a variable, like `@name`",
                self.source,
                node.position,
            )),
        }
    }

    fn visit(&mut self, node: &'a Spanned<Expression>) -> Result<(), CompileError> {
        let p = node.position;

        let tasks = match &node.item {
            Expression::Integer(n) => { self.integer(*n); vec![] },
            Expression::Float(f) => { self.float(*f); vec![] },
            Expression::String(s) => { self.string(s); vec![] },
            Expression::Translatable(s) => { self.translatable(s, p); vec![] },
            Expression::Boolean(true) => { self.emit(Opcode::LoadTrue); vec![] },
            Expression::Boolean(false) => { self.emit(Opcode::LoadFalse); vec![] },
            Expression::Null => { self.emit(Opcode::LoadNull); vec![] },

            Expression::Scope(statements) => {
                let mut tasks = vec![Task::Op(Opcode::Scope, p)];
                tasks.extend(statements.iter().map(Task::Statement));
                tasks.push(Task::Op(Opcode::Leave, p));
                tasks
            },

            Expression::Condition(branches) => {
                let end = self.label();
                let mut tasks = vec![];
                for branch in branches {
                    match &branch.condition {
                        Some(condition) => {
                            let next = self.label();
                            tasks.push(Task::Visit(condition));
                            tasks.push(Task::Jump(Opcode::BranchIfFalse, next));
                            tasks.push(Task::Visit(&branch.body));
                            tasks.push(Task::Jump(Opcode::Branch, end));
                            tasks.push(Task::Mark(next));
                        },
                        None => tasks.push(Task::Visit(&branch.body)),
                    }
                }
                tasks.push(Task::Mark(end));
                tasks
            },

            Expression::Loop { condition, body } => {
                let start = self.label();
                let end = self.label();
                vec![
                    Task::Mark(start),
                    Task::Visit(condition),
                    Task::Jump(Opcode::BranchIfFalse, end),
                    Task::Visit(body),
                    Task::Jump(Opcode::Branch, start),
                    Task::Mark(end),
                ]
            },

            Expression::Binary { operator, left, right } => self.binary(*operator, left, right, p)?,

            Expression::Unary { operator: UnaryOperator::Negate, operand } => {
                vec![Task::Visit(operand), Task::Op(Opcode::Negate, p)]
            },
            Expression::Unary { operator: UnaryOperator::Not, operand } => vec![
                Task::Visit(operand),
                Task::Op(Opcode::ToBoolean, p),
                Task::Op(Opcode::Negate, p),
            ],

            Expression::Call { plugin, arguments } => {
                let mut tasks = vec![];
                for argument in arguments {
                    tasks.push(Task::Visit(&argument.value));
                    tasks.push(Task::String(&argument.name));
                }
                tasks.push(Task::Integer(arguments.len() as i64));
                tasks.push(Task::String(plugin));
                tasks.push(Task::Op(Opcode::Plugin, p));
                tasks
            },

            Expression::FunctionCall { target, arguments } => {
                let mut tasks = vec![];
                for argument in arguments {
                    tasks.push(Task::Visit(&argument.value));
                    tasks.push(Task::String(&argument.name));
                }
                tasks.push(Task::Integer(arguments.len() as i64));
                tasks.push(Task::Visit(target));
                tasks.push(Task::Op(Opcode::Call, p));
                tasks
            },

            // The body is inlined behind a branch,
            // and the entrance is bound to the name as a scope value.
            Expression::FunctionDecl { name, parameters, body } => {
                let after = self.label();
                let entry = self.label();
                let mut tasks = vec![Task::Jump(Opcode::Branch, after), Task::Mark(entry)];

                for parameter in parameters {
                    if let Some(default) = &parameter.default {
                        let skip = self.label();
                        tasks.push(Task::String(&parameter.name));
                        tasks.push(Task::Op(Opcode::HasArgument, default.position));
                        tasks.push(Task::Op(Opcode::Negate, default.position));
                        tasks.push(Task::Jump(Opcode::BranchIfFalse, skip));
                        tasks.push(Task::Visit(default));
                        tasks.push(Task::String(&parameter.name));
                        tasks.push(Task::Op(Opcode::BindArgument, default.position));
                        tasks.push(Task::Mark(skip));
                    }
                }

                tasks.extend(body.iter().map(Task::Statement));
                tasks.push(Task::Op(Opcode::LoadNull, p));
                tasks.push(Task::Op(Opcode::Return, p));
                tasks.push(Task::Mark(after));
                tasks.push(Task::Jump(Opcode::Closure, entry));
                tasks.push(Task::String(name));
                tasks.push(Task::Op(Opcode::StoreVariable, p));
                tasks
            },

            Expression::Variable { name, constant } => {
                let load = if *constant { Opcode::LoadConstant } else { Opcode::LoadVariable };
                vec![Task::Visit(name), Task::Op(load, p)]
            },

            Expression::Dialogue { speaker, content } => {
                match speaker {
                    Some(speaker) => self.translatable(speaker, p),
                    None => self.emit(Opcode::LoadNull),
                }
                self.translatable(content, p);
                vec![Task::Op(Opcode::Dialogue, p)]
            },

            Expression::Import(script) => vec![Task::Visit(script), Task::Op(Opcode::Load, p)],

            Expression::Export { variable, value } => {
                let (name, constant) = self.variable(variable)?;
                let mut tasks = vec![];
                if let Some(value) = value {
                    let store = if constant { Opcode::StoreConstant } else { Opcode::StoreVariable };
                    tasks.push(Task::Visit(value));
                    tasks.push(Task::Visit(name));
                    tasks.push(Task::Op(store, p));
                }
                tasks.push(Task::Visit(variable));
                tasks.push(Task::Visit(name));
                tasks.push(Task::Op(Opcode::Export, p));
                tasks
            },

            Expression::Language(language) => {
                vec![Task::Visit(language), Task::Op(Opcode::Language, p)]
            },

            Expression::Return(value) => match value {
                Some(value) => vec![Task::Visit(value), Task::Op(Opcode::Return, p)],
                None => vec![Task::Op(Opcode::LoadNull, p), Task::Op(Opcode::Return, p)],
            },
        };

        self.schedule(tasks);
        Ok(())
    }

    fn binary(
        &mut self,
        operator: BinaryOperator,
        left: &'a Spanned<Expression>,
        right: &'a Spanned<Expression>,
        p: Position,
    ) -> Result<Vec<Task<'a>>, CompileError> {
        let simple = |opcode| vec![Task::Visit(left), Task::Visit(right), Task::Op(opcode, p)];

        let tasks = match operator {
            BinaryOperator::Add => simple(Opcode::Add),
            BinaryOperator::Subtract => simple(Opcode::Subtract),
            BinaryOperator::Multiply => simple(Opcode::Multiply),
            BinaryOperator::Divide => simple(Opcode::Divide),
            BinaryOperator::Equal => simple(Opcode::Equal),
            BinaryOperator::Greater => simple(Opcode::Greater),
            BinaryOperator::Lesser => simple(Opcode::Lesser),
            BinaryOperator::NotLesser => simple(Opcode::NotLesser),
            BinaryOperator::NotGreater => simple(Opcode::NotGreater),
            BinaryOperator::PickChild => simple(Opcode::PickChild),
            BinaryOperator::NotEqual => {
                let mut tasks = simple(Opcode::Equal);
                tasks.push(Task::Op(Opcode::Negate, p));
                tasks
            },

            // short-circuiting, both leave a boolean
            BinaryOperator::And => {
                let falsy = self.label();
                let end = self.label();
                vec![
                    Task::Visit(left),
                    Task::Jump(Opcode::BranchIfFalse, falsy),
                    Task::Visit(right),
                    Task::Op(Opcode::ToBoolean, p),
                    Task::Jump(Opcode::Branch, end),
                    Task::Mark(falsy),
                    Task::Op(Opcode::LoadFalse, p),
                    Task::Mark(end),
                ]
            },
            BinaryOperator::Or => {
                let rest = self.label();
                let end = self.label();
                vec![
                    Task::Visit(left),
                    Task::Jump(Opcode::BranchIfFalse, rest),
                    Task::Op(Opcode::LoadTrue, p),
                    Task::Jump(Opcode::Branch, end),
                    Task::Mark(rest),
                    Task::Visit(right),
                    Task::Op(Opcode::ToBoolean, p),
                    Task::Mark(end),
                ]
            },

            BinaryOperator::Assign => {
                let (name, constant) = self.variable(left)?;
                let store = if constant { Opcode::StoreConstant } else { Opcode::StoreVariable };
                vec![Task::Visit(right), Task::Visit(name), Task::Op(store, p)]
            },

            // The target is generated twice, once to read and once to write.
            // A name with side effects has them twice.
            BinaryOperator::AddAssign
            | BinaryOperator::SubtractAssign
            | BinaryOperator::MultiplyAssign
            | BinaryOperator::DivideAssign => {
                let (name, constant) = self.variable(left)?;
                let (load, store) = if constant {
                    (Opcode::LoadConstant, Opcode::StoreConstant)
                } else {
                    (Opcode::LoadVariable, Opcode::StoreVariable)
                };
                let arithmetic = match operator.compound() {
                    Some(BinaryOperator::Add) => Opcode::Add,
                    Some(BinaryOperator::Subtract) => Opcode::Subtract,
                    Some(BinaryOperator::Multiply) => Opcode::Multiply,
                    _ => Opcode::Divide,
                };
                vec![
                    Task::Visit(name),
                    Task::Op(load, p),
                    Task::Visit(right),
                    Task::Op(arithmetic, p),
                    Task::Visit(name),
                    Task::Op(store, p),
                ]
            },
        };

        Ok(tasks)
    }

    /// Resolves every label and assembles the container.
    fn finish(self) -> Result<Container, CompileError> {
        let mut labels = std::collections::BTreeMap::new();
        for (id, offset) in self.labels.iter().enumerate() {
            match offset {
                Some(offset) => { labels.insert(id, *offset); },
                None => {
                    return Err(CompileError::error(
                        &format!("Internal error: label {} was never bound to an offset", id),
                        self.source,
                        Position::default(),
                    ))
                },
            }
        }

        let translations: TranslationTable = self
            .translations
            .into_iter()
            .enumerate()
            .map(|(id, text)| (id as u32, text))
            .collect();

        debug!(
            script = %self.source.identifier,
            code = self.code.len(),
            labels = labels.len(),
            strings = self.strings.len(),
            translations = translations.len(),
            "generated",
        );

        Ok(Container {
            hash: self.source.hash(),
            translations,
            strings: self.strings.into_iter().collect(),
            labels,
            positions: self.positions,
            code: self.code,
        })
    }
}
