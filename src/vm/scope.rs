use std::{cell::RefCell, collections::HashSet, mem, rc::Rc};

use indexmap::IndexMap;

use crate::value::{Reference, ScopeId, Value};

/// The bindings of a single lexical scope.
#[derive(Debug, Default)]
pub struct Frame {
    pub parent: Option<ScopeId>,
    pub bindings: IndexMap<String, Rc<RefCell<Reference>>>,
    /// Set once a closure captures this scope,
    /// pinned scopes outlive the block or call that created them.
    pub pinned: bool,
}

/// Where a store lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Store {
    Assigned,
    Created,
    Removed,
    Ignored,
    /// The name is bound to a constant somewhere in the chain.
    Constant,
}

/// An arena of scopes addressed by index.
/// Scopes point at their parent by id, so chains never form ownership cycles.
/// Freed slots are reused.
#[derive(Debug, Default)]
pub struct Scopes {
    frames: Vec<Option<Frame>>,
    free: Vec<usize>,
}

impl Scopes {
    pub fn new() -> Scopes {
        Scopes::default()
    }

    /// Allocates an empty scope.
    pub fn create(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let frame = Frame { parent, ..Frame::default() };
        match self.free.pop() {
            Some(index) => {
                self.frames[index] = Some(frame);
                ScopeId(index)
            },
            None => {
                self.frames.push(Some(frame));
                ScopeId(self.frames.len() - 1)
            },
        }
    }

    pub fn get(&self, id: ScopeId) -> Option<&Frame> {
        self.frames.get(id.0).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: ScopeId) -> Option<&mut Frame> {
        self.frames.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.get(id).and_then(|frame| frame.parent)
    }

    /// Number of live scopes.
    pub fn len(&self) -> usize {
        self.frames.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears a scope's bindings and frees its slot,
    /// unless a closure has pinned it.
    pub fn release(&mut self, id: ScopeId) {
        let pinned = match self.get(id) {
            Some(frame) => frame.pinned,
            None => return,
        };
        if !pinned {
            self.frames[id.0] = None;
            self.free.push(id.0);
        }
    }

    /// Pins a scope and every ancestor.
    pub fn pin(&mut self, id: ScopeId) {
        let mut next = Some(id);
        while let Some(id) = next {
            match self.get_mut(id) {
                Some(frame) if !frame.pinned => {
                    frame.pinned = true;
                    next = frame.parent;
                },
                // an already pinned scope has pinned ancestors
                _ => break,
            }
        }
    }

    /// Frees every scope not reachable from the given roots.
    /// A scope is reachable through a parent link,
    /// or through a function value held in a binding or in `values`.
    /// Returns the number of live scopes left.
    pub fn collect<'a>(
        &mut self,
        roots: impl IntoIterator<Item = ScopeId>,
        values: impl IntoIterator<Item = &'a Value>,
    ) -> usize {
        let mut marked = vec![false; self.frames.len()];
        let mut seen = HashSet::new();
        let mut work = roots.into_iter().collect::<Vec<_>>();
        for value in values {
            reach(value, &mut work, &mut seen);
        }

        while let Some(id) = work.pop() {
            let frame = match self.frames.get(id.0).and_then(Option::as_ref) {
                Some(frame) => frame,
                None => continue,
            };
            if mem::replace(&mut marked[id.0], true) {
                continue;
            }
            work.extend(frame.parent);
            for reference in frame.bindings.values() {
                reach(&reference.borrow().value, &mut work, &mut seen);
            }
        }

        for (index, slot) in self.frames.iter_mut().enumerate() {
            if slot.is_some() && !marked[index] {
                *slot = None;
                self.free.push(index);
            }
        }
        self.len()
    }

    /// Walks the chain from a scope up to the root.
    pub fn chain(&self, id: ScopeId) -> impl Iterator<Item = (ScopeId, &Frame)> + '_ {
        let mut next = Some(id);
        std::iter::from_fn(move || {
            let id = next?;
            let frame = self.get(id)?;
            next = frame.parent;
            Some((id, frame))
        })
    }

    /// Finds the nearest binding for a name.
    /// When `constant` is set, only constant bindings are considered.
    pub fn lookup(&self, id: ScopeId, name: &str, constant: bool) -> Option<Rc<RefCell<Reference>>> {
        self.chain(id)
            .filter_map(|(_, frame)| frame.bindings.get(name))
            .find(|reference| !constant || reference.borrow().constant)
            .cloned()
    }

    /// Whether the scope itself, not its ancestors, binds a name.
    pub fn binds(&self, id: ScopeId, name: &str) -> bool {
        self.get(id).map_or(false, |frame| frame.bindings.contains_key(name))
    }

    /// Binds a name in a scope, shadowing any outer binding.
    pub fn bind(&mut self, id: ScopeId, name: &str, value: Value, constant: bool) {
        if let Some(frame) = self.get_mut(id) {
            frame.bindings.insert(name.to_string(), Reference::new(value, constant));
        }
    }

    /// Stores to a variable.
    /// An existing binding is overwritten, or removed when storing null.
    /// Otherwise a new binding is created in the given scope.
    pub fn store(&mut self, id: ScopeId, name: &str, value: Value) -> Store {
        let owner = self
            .chain(id)
            .find(|(_, frame)| frame.bindings.contains_key(name))
            .map(|(owner, _)| owner);

        let owner = match owner {
            Some(owner) => owner,
            None if value.is_null() => return Store::Ignored,
            None => {
                self.bind(id, name, value, false);
                return Store::Created;
            },
        };

        let frame = match self.get_mut(owner) {
            Some(frame) => frame,
            None => return Store::Ignored,
        };
        let reference = match frame.bindings.get(name) {
            Some(reference) => reference.clone(),
            None => return Store::Ignored,
        };

        if reference.borrow().constant {
            return Store::Constant;
        }
        if value.is_null() {
            frame.bindings.shift_remove(name);
            return Store::Removed;
        }
        reference.borrow_mut().assign(value);
        Store::Assigned
    }

    /// Binds a constant in the given scope.
    /// Fails if a constant of that name is already visible.
    pub fn store_constant(&mut self, id: ScopeId, name: &str, value: Value) -> Store {
        if self.lookup(id, name, true).is_some() {
            return Store::Constant;
        }
        self.bind(id, name, value, true);
        Store::Created
    }
}

/// Queues the scopes a value keeps alive.
/// Shared cells are visited once, so cyclic records terminate.
fn reach(value: &Value, work: &mut Vec<ScopeId>, seen: &mut HashSet<*const ()>) {
    match value {
        Value::Scope(scope) => work.extend(scope.parent),
        Value::Reference(reference) => {
            if seen.insert(Rc::as_ptr(reference) as *const ()) {
                reach(&reference.borrow().value, work, seen);
            }
        },
        Value::Object(members) => {
            if seen.insert(Rc::as_ptr(members) as *const ()) {
                for member in members.values() {
                    reach(member, work, seen);
                }
            }
        },
        _ => (),
    }
}
