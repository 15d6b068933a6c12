use std::{
    cmp::Ordering,
    collections::HashMap,
    iter, mem,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering as Atomic},
        Arc,
    },
    task::Poll,
};

use indexmap::IndexMap;
use tracing::{debug, info, trace};

use crate::{
    common::{
        container::{Container, FormatError},
        number::build_number,
        opcode::Opcode,
        source::Source,
    },
    compiler::CompileError,
    value::{
        operator::{self, Operation},
        ScopeId, ScopeValue, Translatable, Value,
    },
    vm::{
        cache::{Resource, ScriptCache, ScriptProvider},
        environment::Environment,
        plugin::{Native, Pending, PluginContext, PluginRegistry},
        scope::{Scopes, Store},
        trace::{Fault, RuntimeError, TraceFrame},
        translation::Localizer,
    },
};

/// Live scopes at which the first collection runs.
const COLLECT_THRESHOLD: usize = 64;

/// Where a runtime is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotStarted,
    Running,
    /// Waiting on a plugin, see `Runtime::resume`.
    Suspended,
    Returned,
    Faulted,
    Stopped,
}

/// The result of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct Finished {
    /// What the script returned, or its last expression.
    pub value: Value,
    /// Everything the script exported, in export order.
    pub exports: IndexMap<String, Value>,
}

/// Why `run` handed control back to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Finished(Finished),
    Suspended,
    Stopped,
}

/// Requests a runtime stop between two instructions.
/// Can be sent to other threads.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Atomic::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Atomic::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Call,
    Load,
}

/// Enough of the caller to continue it after a return.
#[derive(Debug)]
struct History {
    activation: Activation,
    /// The offset of the calling instruction, for tracebacks.
    site: usize,
    ip: usize,
    script: Arc<str>,
    container: Arc<Container>,
    scope: ScopeId,
    /// Operand stack height when the call was made.
    base: usize,
    /// The scope the callee runs in.
    entered: ScopeId,
}

struct Suspension {
    plugin: String,
    pending: Box<dyn Pending>,
    /// Dialogue results are not pushed.
    discard: bool,
}

enum Flow {
    Continue,
    Suspend,
    Finish(Value),
}

/// A `Runtime` executes one script, and everything it calls or imports.
/// Calls and imports are kept on an explicit history stack,
/// so a runtime waiting on a plugin is just data, and can be resumed later.
/// Each runtime's state is self-contained,
/// so more than one can be spawned if needed.
pub struct Runtime {
    script: Arc<str>,
    container: Arc<Container>,
    ip: usize,
    /// Offset of the instruction being executed.
    site: usize,
    stack: Vec<Value>,
    scopes: Scopes,
    scope: ScopeId,
    /// Live scope count that triggers the next collection.
    collect_at: usize,
    history: Vec<History>,
    /// One table per script being run, the root's at the bottom.
    exports: Vec<IndexMap<String, Value>>,
    /// Scripts that have not returned yet, used to catch circular imports.
    loading: Vec<Arc<str>>,
    /// Containers this runtime has entered, by script id.
    scripts: HashMap<Arc<str>, Arc<Container>>,
    state: State,
    suspension: Option<Suspension>,
    cache: ScriptCache,
    plugins: PluginRegistry,
    provider: Option<Box<dyn ScriptProvider>>,
    localizer: Localizer,
    stop: StopHandle,
}

// this impl contains initialization, helper functions, and the core interpreter loop
// the next impl contains opcode implementations
impl Runtime {
    /// Prepares a container to be run under the given script id.
    /// Nothing executes until `run` is called.
    pub fn new(identifier: &str, container: Arc<Container>, environment: Environment) -> Runtime {
        let script: Arc<str> = Arc::from(identifier);
        let mut scopes = Scopes::new();
        let root = scopes.create(None);

        let mut scripts = HashMap::new();
        scripts.insert(script.clone(), container.clone());

        Runtime {
            script: script.clone(),
            container,
            ip: 0,
            site: 0,
            stack: vec![],
            scopes,
            scope: root,
            collect_at: COLLECT_THRESHOLD,
            history: vec![],
            exports: vec![IndexMap::new()],
            loading: vec![script],
            scripts,
            state: State::NotStarted,
            suspension: None,
            cache: environment.cache,
            plugins: environment.plugins,
            provider: environment.provider,
            localizer: Localizer::new(environment.translator, environment.language),
            stop: StopHandle::default(),
        }
    }

    /// Compiles a source through the environment's cache,
    /// reusing the cached container if the source is unchanged.
    pub fn compile(source: &Source, environment: Environment) -> Result<Runtime, CompileError> {
        let container = environment.cache.compile_if_changed(source)?;
        Ok(Runtime::new(&source.identifier, container, environment))
    }

    /// Decodes an encoded container and prepares it.
    pub fn decode(identifier: &str, bytes: &[u8], environment: Environment) -> Result<Runtime, FormatError> {
        let container = Container::decode(bytes)?;
        Ok(Runtime::new(identifier, Arc::new(container), environment))
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn language(&self) -> Option<&str> {
        self.localizer.language()
    }

    /// A handle other threads can use to stop this runtime.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs until the script returns, suspends, faults, or is stopped.
    /// When suspended, running again polls the pending plugin call,
    /// continuing once it is ready.
    pub fn run(&mut self) -> Result<Status, RuntimeError> {
        match self.state {
            State::NotStarted => {
                debug!(script = %self.script, "starting");
                self.state = State::Running;
            },
            State::Running => (),
            State::Suspended => {
                if !self.poll()? {
                    return Ok(Status::Suspended);
                }
            },
            State::Returned | State::Faulted | State::Stopped => {
                return Err(RuntimeError::bare(Fault::NotRunnable));
            },
        }
        self.drive()
    }

    /// Supplies the result of the pending plugin call and continues running.
    pub fn resume(&mut self, value: Value) -> Result<Status, RuntimeError> {
        if self.state != State::Suspended {
            return Err(RuntimeError::bare(Fault::ResumeWithoutPending));
        }
        let suspension = self
            .suspension
            .take()
            .ok_or_else(|| RuntimeError::bare(Fault::ResumeWithoutPending))?;

        debug!(plugin = %suspension.plugin, "resumed by the host");
        if !suspension.discard {
            self.stack.push(value);
        }
        self.state = State::Running;
        self.drive()
    }

    /// Polls the pending plugin call.
    /// Returns whether execution can continue.
    fn poll(&mut self) -> Result<bool, RuntimeError> {
        let suspension = match self.suspension.as_mut() {
            Some(suspension) => suspension,
            None => return Ok(true),
        };

        match suspension.pending.poll() {
            Poll::Pending => Ok(false),
            Poll::Ready(Ok(value)) => {
                debug!(plugin = %suspension.plugin, "plugin ready");
                if !suspension.discard {
                    self.stack.push(value);
                }
                self.suspension = None;
                self.state = State::Running;
                Ok(true)
            },
            Poll::Ready(Err(message)) => {
                let name = suspension.plugin.clone();
                self.suspension = None;
                self.state = State::Faulted;
                Err(self.error(Fault::Plugin { name, message }))
            },
        }
    }

    /// The core interpreter loop.
    fn drive(&mut self) -> Result<Status, RuntimeError> {
        loop {
            if self.stop.is_stopped() {
                info!(script = %self.script, offset = self.ip, "stopped");
                self.state = State::Stopped;
                return Ok(Status::Stopped);
            }

            match self.step() {
                Ok(Flow::Continue) => (),
                Ok(Flow::Suspend) => {
                    self.state = State::Suspended;
                    return Ok(Status::Suspended);
                },
                Ok(Flow::Finish(value)) => {
                    self.state = State::Returned;
                    let exports = self.exports.pop().unwrap_or_default();
                    debug!(script = %self.script, "finished");
                    return Ok(Status::Finished(Finished { value, exports }));
                },
                Err(fault) => {
                    self.state = State::Faulted;
                    return Err(self.error(fault));
                },
            }
        }
    }

    /// Builds a traceback from the active instruction,
    /// adding each caller in turn so the oldest activation ends up first.
    fn error(&self, fault: Fault) -> RuntimeError {
        let current = TraceFrame {
            script: self.script.clone(),
            offset: self.site,
            position: self.container.position_at(self.site),
        };
        let mut error = RuntimeError::new(fault, vec![current]);

        for frame in self.history.iter().rev() {
            error.add_context(TraceFrame {
                script: frame.script.clone(),
                offset: frame.site,
                position: frame.container.position_at(frame.site),
            });
        }
        error
    }

    fn pop(&mut self) -> Result<Value, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    /// Pops a value naming a variable, plugin or script.
    fn pop_name(&mut self) -> Result<String, Fault> {
        let value = self.pop()?.resolved();
        value
            .text()
            .map(str::to_string)
            .ok_or_else(|| Fault::InvalidName { kind: value.kind().to_string() })
    }

    /// Pops a parameter count, then that many `(value, name)` pairs.
    fn pop_parameters(&mut self) -> Result<Vec<(String, Value)>, Fault> {
        let count = self.pop()?.to_integer()?;
        let count = usize::try_from(count).map_err(|_| Fault::StackUnderflow)?;

        let mut parameters = Vec::with_capacity(count);
        for _ in 0..count {
            let name = self.pop_name()?;
            let value = self.pop()?;
            parameters.push((name, value));
        }
        parameters.reverse();
        Ok(parameters)
    }

    fn varint(&mut self, code: &[u8]) -> Result<usize, Fault> {
        let remaining = code.get(self.ip..).unwrap_or_default();
        let (number, eaten) = build_number(remaining).ok_or(Fault::TruncatedOperand)?;
        self.ip += eaten;
        Ok(number)
    }

    fn wide(&mut self, code: &[u8]) -> Result<[u8; 8], Fault> {
        let bytes = code.get(self.ip..self.ip + 8).ok_or(Fault::TruncatedOperand)?;
        let mut buffer = [0; 8];
        buffer.copy_from_slice(bytes);
        self.ip += 8;
        Ok(buffer)
    }

    fn label(&mut self, code: &[u8]) -> Result<usize, Fault> {
        let id = self.varint(code)?;
        self.container.label(id).ok_or(Fault::UnresolvedLabel { id })
    }

    /// Dissasembles and interprets a single (potentially fallible) instruction.
    fn step(&mut self) -> Result<Flow, Fault> {
        let container = self.container.clone();
        let code = &container.code;

        // running off the end returns null
        let byte = match code.get(self.ip) {
            Some(byte) => *byte,
            None => return self.ret(Value::Null),
        };

        self.site = self.ip;
        self.ip += 1;
        let opcode = Opcode::from_byte(byte).ok_or(Fault::UnknownOpcode { byte })?;
        trace!(script = %self.script, offset = self.site, ?opcode, depth = self.stack.len());

        match opcode {
            Opcode::LoadNull => self.stack.push(Value::Null),
            Opcode::LoadTrue => self.stack.push(Value::Boolean(true)),
            Opcode::LoadFalse => self.stack.push(Value::Boolean(false)),
            Opcode::LoadInteger => {
                let bytes = self.wide(code)?;
                self.stack.push(Value::Integer(i64::from_le_bytes(bytes)));
            },
            Opcode::LoadFloat => {
                let bytes = self.wide(code)?;
                self.stack.push(Value::Float(f64::from_le_bytes(bytes)));
            },
            Opcode::LoadString => {
                let index = self.varint(code)?;
                let text = container.strings.get(index).ok_or(Fault::MissingString { index })?;
                self.stack.push(Value::string(text));
            },
            Opcode::LoadTranslatable => self.load_translatable(code)?,

            Opcode::LoadVariable => self.load_variable(false)?,
            Opcode::LoadConstant => self.load_variable(true)?,
            Opcode::StoreVariable => self.store(false)?,
            Opcode::StoreConstant => self.store(true)?,
            Opcode::HasArgument => {
                let name = self.pop_name()?;
                let bound = self.scopes.binds(self.scope, &name);
                self.stack.push(Value::Boolean(bound));
            },
            Opcode::BindArgument => {
                let name = self.pop_name()?;
                let value = self.pop()?.resolved();
                self.scopes.bind(self.scope, &name, value, false);
            },

            Opcode::Add => self.binary(Operation::Add)?,
            Opcode::Subtract => self.binary(Operation::Subtract)?,
            Opcode::Multiply => self.binary(Operation::Multiply)?,
            Opcode::Divide => self.binary(Operation::Divide)?,
            Opcode::PickChild => self.binary(Operation::PickChild)?,
            Opcode::Negate => {
                let operand = self.pop()?;
                self.stack.push(operator::apply_unary(Operation::Negate, &operand)?);
            },
            Opcode::ToBoolean => {
                let operand = self.pop()?;
                self.stack.push(Value::Boolean(operand.to_boolean()));
            },
            Opcode::Equal => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.stack.push(Value::Boolean(operator::equal(&left, &right)));
            },
            Opcode::Greater => self.compare(|o| o == Ordering::Greater)?,
            Opcode::Lesser => self.compare(|o| o == Ordering::Less)?,
            Opcode::NotLesser => self.compare(|o| o != Ordering::Less)?,
            Opcode::NotGreater => self.compare(|o| o != Ordering::Greater)?,

            Opcode::Scope => self.scope = self.scopes.create(Some(self.scope)),
            Opcode::Leave => {
                let parent = self.scopes.parent(self.scope).ok_or(Fault::UnbalancedScope)?;
                self.scopes.release(self.scope);
                self.scope = parent;
                self.collect_scopes();
            },

            Opcode::Branch => self.ip = self.label(code)?,
            Opcode::BranchIfFalse => {
                let target = self.label(code)?;
                if !self.pop()?.to_boolean() {
                    self.ip = target;
                }
            },

            Opcode::Closure => {
                let entrance = self.label(code)?;
                self.scopes.pin(self.scope);
                self.stack.push(Value::Scope(ScopeValue {
                    entrance,
                    script: self.script.clone(),
                    parent: Some(self.scope),
                }));
            },
            Opcode::Call => {
                let target = self.pop()?;
                let arguments = self.pop_parameters()?;
                return self.call(target, arguments);
            },
            Opcode::Return => {
                let value = self.pop()?;
                return self.ret(value);
            },

            Opcode::Plugin => {
                let name = self.pop_name()?;
                let parameters = self.pop_parameters()?;
                return self.native(&name, parameters, false);
            },
            Opcode::Dialogue => {
                let content = self.pop()?;
                let speaker = self.pop()?;
                let parameters = vec![
                    ("Character".to_string(), speaker),
                    ("Content".to_string(), content),
                ];
                return self.native("Dialogue", parameters, true);
            },

            Opcode::Load => {
                let id = self.pop_name()?;
                return self.load(&id);
            },
            Opcode::Export => {
                let name = self.pop_name()?;
                let value = self.pop()?;
                if let Some(exports) = self.exports.last_mut() {
                    exports.insert(name, value);
                }
            },
            Opcode::Language => {
                let language = self.pop_name()?;
                debug!(%language, "switching language");
                self.localizer.set_language(&language);
            },
            Opcode::Pop => mem::drop(self.pop()?),

            small => {
                let value = match (small.integer_value(), small.float_value()) {
                    (Some(n), _) => Value::Integer(n),
                    (_, Some(f)) => Value::Float(f),
                    _ => return Err(Fault::UnknownOpcode { byte }),
                };
                self.stack.push(value);
            },
        }

        Ok(Flow::Continue)
    }
}

// opcode implementations
impl Runtime {
    /// Resolves a translation id against the active language when it is read.
    fn load_translatable(&mut self, code: &[u8]) -> Result<(), Fault> {
        let index = self.varint(code)?;
        let id = u32::try_from(index).map_err(|_| Fault::MissingTranslation { id: u32::MAX })?;
        let text = self
            .localizer
            .resolve(&self.script, id, &self.container.translations)
            .ok_or(Fault::MissingTranslation { id })?;

        self.stack.push(Value::Translatable(Translatable {
            script: self.script.clone(),
            id,
            text: Rc::from(text),
        }));
        Ok(())
    }

    /// Pushes the value bound to a name, or null.
    fn load_variable(&mut self, constant: bool) -> Result<(), Fault> {
        let name = self.pop_name()?;
        let value = self
            .scopes
            .lookup(self.scope, &name, constant)
            .map(|reference| reference.borrow().value.clone())
            .unwrap_or(Value::Null);
        self.stack.push(value);
        Ok(())
    }

    fn store(&mut self, constant: bool) -> Result<(), Fault> {
        let name = self.pop_name()?;
        let value = self.pop()?.resolved();

        let stored = if constant {
            self.scopes.store_constant(self.scope, &name, value)
        } else {
            self.scopes.store(self.scope, &name, value)
        };

        match stored {
            Store::Constant => Err(Fault::ConstantReassignment { name }),
            _ => Ok(()),
        }
    }

    fn binary(&mut self, operation: Operation) -> Result<(), Fault> {
        let right = self.pop()?;
        let left = self.pop()?;
        self.stack.push(operator::apply(operation, &left, &right)?);
        Ok(())
    }

    /// All four comparisons come from one three-way compare.
    fn compare(&mut self, test: fn(Ordering) -> bool) -> Result<(), Fault> {
        let right = self.pop()?;
        let left = self.pop()?;
        let ordering = operator::compare(&left, &right)?;
        self.stack.push(Value::Boolean(test(ordering)));
        Ok(())
    }

    /// The container holding a script's code.
    fn container_for(&self, script: &Arc<str>) -> Result<Arc<Container>, Fault> {
        if *script == self.script {
            return Ok(self.container.clone());
        }
        self.scripts
            .get(script)
            .cloned()
            .or_else(|| self.cache.get(script))
            .ok_or_else(|| Fault::ScriptNotFound { id: script.to_string() })
    }

    /// Enters a function.
    /// Arguments are bound in a fresh child of the scope the function was declared in,
    /// so lookups in the body are lexical.
    fn call(&mut self, target: Value, arguments: Vec<(String, Value)>) -> Result<Flow, Fault> {
        let callee = match target.resolved() {
            Value::Scope(callee) => callee,
            named @ (Value::String(_) | Value::Translatable(_)) => {
                let name = named.text().unwrap_or_default().to_string();
                let bound = self
                    .scopes
                    .lookup(self.scope, &name, false)
                    .map(|reference| reference.borrow().value.resolved());
                match bound {
                    Some(Value::Scope(callee)) => callee,
                    Some(other) => return Err(Fault::NotCallable { kind: other.kind().to_string() }),
                    None => return Err(Fault::UndefinedFunction { name }),
                }
            },
            other => return Err(Fault::NotCallable { kind: other.kind().to_string() }),
        };

        let container = self.container_for(&callee.script)?;
        let entered = self.scopes.create(callee.parent);
        for (name, value) in arguments {
            self.scopes.bind(entered, &name, value.resolved(), false);
        }

        self.history.push(History {
            activation: Activation::Call,
            site: self.site,
            ip: self.ip,
            script: mem::replace(&mut self.script, callee.script),
            container: mem::replace(&mut self.container, container),
            scope: mem::replace(&mut self.scope, entered),
            base: self.stack.len(),
            entered,
        });
        self.ip = callee.entrance;
        Ok(Flow::Continue)
    }

    /// Releases scopes from the active one up to and including `until`.
    fn unwind(&mut self, until: ScopeId) {
        let mut next = Some(self.scope);
        while let Some(id) = next {
            next = self.scopes.parent(id);
            self.scopes.release(id);
            if id == until {
                break;
            }
        }
    }

    /// Returns to the caller, or finishes the run when there is none.
    fn ret(&mut self, value: Value) -> Result<Flow, Fault> {
        let frame = match self.history.pop() {
            Some(frame) => frame,
            None => return Ok(Flow::Finish(value)),
        };

        self.unwind(frame.entered);
        self.stack.truncate(frame.base);

        let result = match frame.activation {
            Activation::Call => value,
            Activation::Load => {
                let exports = self.exports.pop().unwrap_or_default();
                self.loading.pop();
                info!(script = %self.script, exports = exports.len(), "script loaded");
                Value::object(exports)
            },
        };

        self.script = frame.script;
        self.container = frame.container;
        self.scope = frame.scope;
        self.ip = frame.ip;
        self.stack.push(result);
        self.collect_scopes();
        Ok(Flow::Continue)
    }

    /// Frees scopes that closures pinned but nothing can call any more.
    /// Runs once the arena has doubled since the last collection.
    fn collect_scopes(&mut self) {
        if self.scopes.len() < self.collect_at {
            return;
        }

        let roots = iter::once(self.scope)
            .chain(self.history.iter().flat_map(|frame| [frame.scope, frame.entered]));
        let values = self.stack.iter().chain(self.exports.iter().flat_map(IndexMap::values));
        let live = self.scopes.collect(roots, values);

        debug!(live, "collected scopes");
        self.collect_at = (live * 2).max(COLLECT_THRESHOLD);
    }

    /// Invokes a plugin.
    /// A pending result suspends the runtime.
    fn native(&mut self, name: &str, parameters: Vec<(String, Value)>, discard: bool) -> Result<Flow, Fault> {
        let plugin = self
            .plugins
            .get(name)
            .ok_or_else(|| Fault::PluginNotFound { name: name.to_string() })?;

        let context = PluginContext { parameters: &parameters, language: self.localizer.language() };
        let result = plugin
            .execute(&context)
            .map_err(|message| Fault::Plugin { name: name.to_string(), message })?;

        match result {
            Native::Ready(value) => {
                if !discard {
                    self.stack.push(value);
                }
                Ok(Flow::Continue)
            },
            Native::Pending(pending) => {
                debug!(plugin = name, offset = self.site, "suspending");
                self.suspension = Some(Suspension { plugin: name.to_string(), pending, discard });
                Ok(Flow::Suspend)
            },
        }
    }

    /// Finds a script by id, in the cache or through the provider.
    fn fetch(&self, id: &str) -> Result<Arc<Container>, Fault> {
        if let Some(container) = self.cache.get(id) {
            return Ok(container);
        }

        let resource = self
            .provider
            .as_ref()
            .and_then(|provider| provider.provide(id))
            .ok_or_else(|| Fault::ScriptNotFound { id: id.to_string() })?;

        match resource {
            Resource::Source(text) => self
                .cache
                .compile_if_changed(&Source::new(&text, id))
                .map_err(|error| Fault::Compile { id: id.to_string(), error: Box::new(error) }),
            Resource::Container(bytes) => {
                let container = Container::decode(&bytes)
                    .map(Arc::new)
                    .map_err(|source| Fault::Format { id: id.to_string(), source })?;
                self.cache.insert(id, container.clone());
                Ok(container)
            },
        }
    }

    /// Runs another script as a nested activation.
    /// Its exports are pushed as an object once it returns.
    fn load(&mut self, id: &str) -> Result<Flow, Fault> {
        if self.loading.iter().any(|script| &**script == id) {
            return Err(Fault::CircularLoad { id: id.to_string() });
        }

        let container = self.fetch(id)?;
        let script: Arc<str> = Arc::from(id);
        self.scripts.insert(script.clone(), container.clone());
        info!(script = id, "loading script");

        let entered = self.scopes.create(None);
        self.history.push(History {
            activation: Activation::Load,
            site: self.site,
            ip: self.ip,
            script: mem::replace(&mut self.script, script.clone()),
            container: mem::replace(&mut self.container, container),
            scope: mem::replace(&mut self.scope, entered),
            base: self.stack.len(),
            entered,
        });
        self.exports.push(IndexMap::new());
        self.loading.push(script);
        self.ip = 0;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use super::*;
    use crate::{
        common::{container::DebugPosition, span::Position, translation::TranslationTable},
        compiler,
        value::Kind,
    };

    fn container(source: &str, identifier: &str) -> Arc<Container> {
        Arc::new(compiler::compile(&Source::new(source, identifier)).unwrap())
    }

    fn runtime(source: &str, environment: Environment) -> Runtime {
        Runtime::new("test", container(source, "test"), environment)
    }

    fn finish(source: &str) -> Finished {
        match runtime(source, Environment::new()).run() {
            Ok(Status::Finished(finished)) => finished,
            other => panic!("expected the script to finish, got {:?}", other),
        }
    }

    fn value(source: &str) -> Value {
        finish(source).value
    }

    fn fault(source: &str) -> Fault {
        runtime(source, Environment::new()).run().unwrap_err().fault
    }

    #[test]
    fn arithmetic() {
        assert_eq!(value("1 + 2"), Value::Integer(3));
        assert_eq!(value("2 * 3 + 4"), Value::Integer(10));
        assert_eq!(value("10 - 4 - 3"), Value::Integer(3));
        assert_eq!(value("1 + 0.5"), Value::Float(1.5));
        assert_eq!(value("1000000 * 3"), Value::Integer(3_000_000));
        assert_eq!(value("'a' + 1"), Value::from("a1"));
        assert_eq!(value("1 + '2'"), Value::Integer(3));
        assert_eq!(value("-(2 + 3)"), Value::Integer(-5));
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(value("1 < 2"), Value::Boolean(true));
        assert_eq!(value("2 <= 1"), Value::Boolean(false));
        assert_eq!(value("3 >= 3"), Value::Boolean(true));
        assert_eq!(value("1 != 2"), Value::Boolean(true));
        assert_eq!(value("1 == 1.0"), Value::Boolean(true));
        assert_eq!(value("!null"), Value::Boolean(true));
        assert_eq!(value("false || 'yes'"), Value::Boolean(true));
        assert_eq!(value("0 && [Missing]"), Value::Boolean(false));
    }

    #[test]
    fn variables() {
        assert_eq!(value("@x = 4\n@x += 1\n@x * 2"), Value::Integer(10));
        assert_eq!(value("@unset"), Value::Null);
        assert_eq!(value("@('dyn' + 'amic') = 2; @dynamic"), Value::Integer(2));
        assert_eq!(value("@x = 1; @x = null; @x"), Value::Null);
    }

    #[test]
    fn blocks_scope_their_names() {
        let source = "@outer = 1\n{\n  @inner = 2\n  @outer = @outer + @inner\n}\n@inner";
        assert_eq!(value(source), Value::Null);
        assert_eq!(value("@outer = 1; { @outer = 5 }; @outer"), Value::Integer(5));
    }

    #[test]
    fn constants() {
        assert_eq!(value("@#X = 5; @#X + @X"), Value::Integer(10));
        assert_eq!(fault("@#X = 5\n@X = 6"), Fault::ConstantReassignment { name: "X".to_string() });
        assert_eq!(fault("@#X = 5\n@#X = 6"), Fault::ConstantReassignment { name: "X".to_string() });
        assert_eq!(fault("@#X = 5\n@#X += 1"), Fault::ConstantReassignment { name: "X".to_string() });
    }

    #[test]
    fn conditions_and_loops() {
        let source = "@n = 0; @sum = 0\nwhile @n < 5 { @n += 1; @sum += @n }\n@sum";
        assert_eq!(value(source), Value::Integer(15));

        let source = "@x = 7\nif @x < 5 { @r = 'small' }\nelseif @x < 10 { @r = 'medium' }\nelse { @r = 'large' }\n@r";
        assert_eq!(value(source), Value::from("medium"));
    }

    #[test]
    fn functions() {
        let source = "function add(a, b = 10) { return @a + @b }\nadd(a = 1) + add(a = 1, b = 2)";
        assert_eq!(value(source), Value::Integer(14));

        assert_eq!(value("function nothing() { 1 }\nnothing()"), Value::Null);
        assert_eq!(value("function f() { return 3 }\n@g = @f\n[@g]"), Value::Integer(3));
    }

    #[test]
    fn recursion() {
        let source = "function fact(n) {\n  if @n <= 1 { return 1 }\n  return @n * fact(n = @n - 1)\n}\nfact(n = 10)";
        assert_eq!(value(source), Value::Integer(3_628_800));
    }

    #[test]
    fn lexical_scoping() {
        // `who` is visible where `greet` was declared, not where it is called
        let source = "\
            @who = 'world'\n\
            function greet() { return 'hello ' + @who }\n\
            function caller(who) { return greet() }\n\
            caller(who = 'shadow')";
        assert_eq!(value(source), Value::from("hello world"));
    }

    #[test]
    fn closures_keep_their_scope() {
        let source = "\
            @counter = 0\n\
            {\n\
              @count = 40\n\
              function next() { @count += 1; return @count }\n\
              @counter = @next\n\
            }\n\
            [@counter]\n\
            [@counter]";
        assert_eq!(value(source), Value::Integer(42));
    }

    #[test]
    fn call_faults() {
        assert_eq!(fault("missing()"), Fault::UndefinedFunction { name: "missing".to_string() });
        assert_eq!(fault("@x = 1; x()"), Fault::NotCallable { kind: Kind::Integer.to_string() });
        assert_eq!(fault("[Missing]"), Fault::PluginNotFound { name: "Missing".to_string() });
    }

    #[test]
    fn exports() {
        let finished = finish("export @a = 1\n@b = 'two'\nexport @b\nexport @#C = 3");
        let names: Vec<&str> = finished.exports.keys().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "C"]);
        assert_eq!(finished.exports["b"], Value::from("two"));
    }

    #[test]
    fn faults_carry_a_trace() {
        let error = runtime("function f() {\n  return 1 / 0\n}\nf()", Environment::new())
            .run()
            .unwrap_err();
        assert_eq!(error.fault, Fault::Operator(crate::value::operator::OperatorError::DivisionByZero));
        assert_eq!(error.trace.len(), 2);
        assert_eq!(error.trace[0].position.map(|p| p.line), Some(3));
        assert_eq!(error.trace[1].position.map(|p| p.line), Some(1));
        assert!(error.to_string().starts_with("Traceback, most recent call last:"));
    }

    #[test]
    fn defaults_bind_in_the_callee() {
        let source = "@who = 'Bob'\nfunction greet(who = 'Ada') { return @who }\n@greeted = greet()\n@greeted + ' ' + @who";
        assert_eq!(value(source), Value::from("Ada Bob"));

        let source = "@#who = 'Bob'\nfunction greet(who = 'Ada') { return @who }\ngreet() + ' ' + @#who";
        assert_eq!(value(source), Value::from("Ada Bob"));

        // a supplied argument still wins over the default
        assert_eq!(value("@#who = 'Bob'\nfunction greet(who = 'Ada') { return @who }\ngreet(who = 'Cy')"), Value::from("Cy"));
    }

    #[test]
    fn unreachable_closures_are_collected() {
        let mut looping = runtime(
            "@i = 0\nwhile @i < 10000 {\n  function f() { 1 }\n  @i += 1\n}\n@i",
            Environment::new(),
        );
        assert_eq!(
            looping.run(),
            Ok(Status::Finished(Finished { value: Value::Integer(10000), exports: IndexMap::new() })),
        );
        assert!(looping.scopes.len() <= 2 * COLLECT_THRESHOLD, "{} live scopes", looping.scopes.len());

        let mut calling = runtime(
            "function outer() {\n  function inner() { 2 }\n  return inner()\n}\n@i = 0\nwhile @i < 10000 {\n  outer()\n  @i += 1\n}\n@i",
            Environment::new(),
        );
        assert!(calling.run().is_ok());
        assert!(calling.scopes.len() <= 2 * COLLECT_THRESHOLD, "{} live scopes", calling.scopes.len());
    }

    /// A container holding raw code, with every instruction on its own line.
    fn raw(code: Vec<u8>) -> Arc<Container> {
        let positions = (0..code.len())
            .map(|offset| DebugPosition { offset, position: Position { line: offset, column: 0 } })
            .collect();
        Arc::new(Container { code, positions, ..Container::default() })
    }

    #[test]
    fn unknown_opcodes_fault() {
        let code = vec![Opcode::LoadInteger1 as u8, 0xEE];
        let error = Runtime::new("raw", raw(code), Environment::new()).run().unwrap_err();

        assert_eq!(error.fault, Fault::UnknownOpcode { byte: 0xEE });
        assert_eq!(error.trace, vec![TraceFrame {
            script: Arc::from("raw"),
            offset: 1,
            position: Some(Position { line: 1, column: 0 }),
        }]);
    }

    #[test]
    fn stack_underflow_faults() {
        let error = Runtime::new("raw", raw(vec![Opcode::Pop as u8]), Environment::new())
            .run()
            .unwrap_err();
        assert_eq!(error.fault, Fault::StackUnderflow);
        assert_eq!(error.trace.len(), 1);
        assert_eq!(error.trace[0].offset, 0);

        // inside a call, the caller is listed first
        let mut patched = runtime("function f() { 1 }\n\nf()", Environment::new());
        let entry = patched.container.label(1).unwrap();
        let mut code = patched.container.code.clone();
        assert_eq!(code[entry], Opcode::LoadInteger1 as u8);
        code[entry] = Opcode::Pop as u8;
        patched.container = Arc::new(Container { code, ..(*patched.container).clone() });

        let error = patched.run().unwrap_err();
        assert_eq!(error.fault, Fault::StackUnderflow);
        assert_eq!(error.trace.len(), 2);
        assert_eq!(error.trace[0].position.map(|p| p.line), Some(2));
        assert_eq!(error.trace[1].offset, entry);
    }

    #[test]
    fn finished_runtimes_do_not_run() {
        let mut runtime = runtime("1", Environment::new());
        assert!(runtime.run().is_ok());
        assert_eq!(runtime.state(), State::Returned);
        assert_eq!(runtime.run().unwrap_err().fault, Fault::NotRunnable);
        assert_eq!(runtime.resume(Value::Null).unwrap_err().fault, Fault::ResumeWithoutPending);
    }

    #[test]
    fn stopping() {
        let mut runtime = runtime("while true { }", Environment::new());
        let handle = runtime.stop_handle();
        handle.stop();
        assert_eq!(runtime.run(), Ok(Status::Stopped));
        assert_eq!(runtime.state(), State::Stopped);
    }

    #[test]
    fn plugins() {
        let seen = Rc::new(RefCell::new(vec![]));
        let log = seen.clone();
        let environment = Environment::new()
            .with_language("en")
            .with_plugin("Shout", |context: &PluginContext| {
                let text = context.get("text").map(Value::to_text).unwrap_or_default();
                Ok(Native::Ready(Value::from(text.to_uppercase())))
            })
            .with_plugin("Dialogue", move |context: &PluginContext| {
                let speaker = context.get("Character").cloned().unwrap_or(Value::Null);
                let content = context.get("Content").cloned().unwrap_or(Value::Null);
                log.borrow_mut().push(format!("{}: {} ({:?})", speaker, content, context.language));
                Ok(Native::Ready(Value::Null))
            });

        let mut runtime = runtime("#Ada Hello there\n# Narration\n[Shout text='hey' loud]", environment);
        let status = runtime.run().unwrap();
        assert_eq!(
            status,
            Status::Finished(Finished { value: Value::from("HEY"), exports: IndexMap::new() }),
        );
        assert_eq!(
            *seen.borrow(),
            vec![
                "Ada: Hello there (Some(\"en\"))".to_string(),
                "null: Narration (Some(\"en\"))".to_string(),
            ],
        );
    }

    #[test]
    fn plugin_errors_fault() {
        let environment = Environment::new()
            .with_plugin("Fail", |_: &PluginContext| Err("no disk".to_string()));
        let error = runtime("[Fail]", environment).run().unwrap_err();
        assert_eq!(error.fault, Fault::Plugin { name: "Fail".to_string(), message: "no disk".to_string() });
    }

    struct Countdown(usize);

    impl Pending for Countdown {
        fn poll(&mut self) -> Poll<Result<Value, String>> {
            if self.0 == 0 {
                return Poll::Ready(Ok(Value::from("done")));
            }
            self.0 -= 1;
            Poll::Pending
        }
    }

    #[test]
    fn suspension_polls_until_ready() {
        let environment = Environment::new()
            .with_plugin("Wait", |_: &PluginContext| Ok(Native::Pending(Box::new(Countdown(2)))));
        let mut runtime = runtime("@before = 1\n@result = [Wait]\n@result + '!'", environment);

        assert_eq!(runtime.run(), Ok(Status::Suspended));
        assert_eq!(runtime.state(), State::Suspended);
        assert_eq!(runtime.run(), Ok(Status::Suspended));
        assert_eq!(runtime.run(), Ok(Status::Suspended));
        match runtime.run() {
            Ok(Status::Finished(finished)) => assert_eq!(finished.value, Value::from("done!")),
            other => panic!("expected the script to finish, got {:?}", other),
        }
    }

    #[test]
    fn resume_supplies_the_result() {
        let environment = Environment::new()
            .with_plugin("Ask", |_: &PluginContext| Ok(Native::Pending(Box::new(Countdown(usize::MAX)))));
        let mut runtime = runtime("[Ask] + 1", environment);

        assert_eq!(runtime.run(), Ok(Status::Suspended));
        match runtime.resume(Value::from(41)) {
            Ok(Status::Finished(finished)) => assert_eq!(finished.value, Value::Integer(42)),
            other => panic!("expected the script to finish, got {:?}", other),
        }
    }

    #[test]
    fn translations_resolve_when_read() {
        let translator = |_: &str, language: &str| match language {
            "fr" => Some(vec![(0, "Bonjour".to_string())].into_iter().collect::<TranslationTable>()),
            _ => None,
        };
        let environment = Environment::new().with_translator(translator);
        // `@a` keeps the text it was read with, only later reads switch language
        let source = "@a = \"Hello\"\nlanguage 'fr'\n@b = \"Hello\"\n@a + ' / ' + @b";
        match runtime(source, environment).run() {
            Ok(Status::Finished(finished)) => assert_eq!(finished.value, Value::from("Hello / Bonjour")),
            other => panic!("expected the script to finish, got {:?}", other),
        }
    }

    #[test]
    fn imports() {
        let cache = ScriptCache::new();
        cache.insert("lib", container("export @answer = 42\nfunction double(n) { return @n * 2 }\nexport @double", "lib"));

        let environment = Environment::new().with_cache(cache);
        let source = "@lib = import 'lib'\n@double = @lib -> 'double'\n[@double n = @lib -> 'answer']";
        match runtime(source, environment).run() {
            Ok(Status::Finished(finished)) => assert_eq!(finished.value, Value::Integer(84)),
            other => panic!("expected the script to finish, got {:?}", other),
        }
    }

    #[test]
    fn imports_through_the_provider() {
        let environment = Environment::new().with_provider(|id: &str| match id {
            "source" => Some(Resource::Source("export @kind = 'source'".to_string())),
            "binary" => Some(Resource::Container(container("export @kind = 'binary'", "binary").encode())),
            "broken" => Some(Resource::Container(vec![1, 2, 3])),
            _ => None,
        });
        let cache = environment.cache().clone();
        let source = "(import 'source') -> 'kind' + (import 'binary') -> 'kind'";

        assert_eq!(
            runtime(source, environment).run(),
            Ok(Status::Finished(Finished { value: Value::from("sourcebinary"), exports: IndexMap::new() })),
        );
        assert!(cache.contains("source") && cache.contains("binary"));

        let environment = Environment::new().with_provider(|id: &str| match id {
            "broken" => Some(Resource::Container(vec![1, 2, 3])),
            _ => None,
        });
        assert!(matches!(
            runtime("import 'broken'", environment).run().unwrap_err().fault,
            Fault::Format { .. },
        ));
        assert_eq!(
            fault("import 'nowhere'"),
            Fault::ScriptNotFound { id: "nowhere".to_string() },
        );
    }

    #[test]
    fn circular_imports_fault() {
        let cache = ScriptCache::new();
        cache.insert("a", container("import 'b'", "a"));
        cache.insert("b", container("import 'a'", "b"));

        let error = Runtime::new("a", cache.get("a").unwrap(), Environment::new().with_cache(cache))
            .run()
            .unwrap_err();
        assert_eq!(error.fault, Fault::CircularLoad { id: "a".to_string() });
        assert_eq!(error.trace.len(), 2);
        assert_eq!(&*error.trace[1].script, "b");
    }
}
