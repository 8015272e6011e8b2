//! Lexical scope chain for pack scripts.
//!
//! Frames live in an arena owned by [`ScopeTree`] and refer to their parent by
//! [`FrameId`]. A frame may carry a closure set: while a lookup walks outward
//! from such a frame, only names in the set resolve, and the set is handed on
//! unchanged through every frame above it until the root. The root resolves
//! anything it binds.

use std::collections::{BTreeSet, HashMap};

use crate::error::{ScopeError, ScopeResult};
use crate::value::{Function, Value};

/// Handle to a frame inside a [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

#[derive(Debug, Default)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<FrameId>,
    closure: Option<BTreeSet<String>>,
}

/// Arena of scope frames with a single root.
#[derive(Debug)]
pub struct ScopeTree {
    frames: Vec<Frame>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl ScopeTree {
    /// Creates a tree whose root holds `globals`.
    pub fn new(globals: HashMap<String, Value>) -> Self {
        Self {
            frames: vec![Frame {
                bindings: globals,
                parent: None,
                closure: None,
            }],
        }
    }

    pub fn root(&self) -> FrameId {
        FrameId(0)
    }

    /// Number of frames allocated so far, root included.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Opens a block frame under `parent`.
    pub fn push(
        &mut self,
        parent: FrameId,
        bindings: HashMap<String, Value>,
    ) -> ScopeResult<FrameId> {
        self.alloc(parent, bindings, None)
    }

    /// Opens a frame under `parent` that only exposes `captures` to lookups
    /// passing through it.
    pub fn push_closure<I, S>(
        &mut self,
        parent: FrameId,
        captures: I,
        bindings: HashMap<String, Value>,
    ) -> ScopeResult<FrameId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let captures = captures.into_iter().map(Into::into).collect();
        self.alloc(parent, bindings, Some(captures))
    }

    /// Opens the frame for a call of `function`.
    ///
    /// Parameters bind positionally: missing arguments become `nil` and extra
    /// ones are dropped. A function with a capture set also exposes its own
    /// parameters.
    pub fn call_frame(&mut self, function: &Function, args: Vec<Value>) -> ScopeResult<FrameId> {
        let mut args = args.into_iter();
        let bindings = function
            .params
            .iter()
            .map(|param| (param.clone(), args.next().unwrap_or_default()))
            .collect();
        let closure = function.captures.as_ref().map(|captures| {
            captures
                .iter()
                .chain(function.params.iter())
                .cloned()
                .collect()
        });
        self.alloc(function.env, bindings, closure)
    }

    fn alloc(
        &mut self,
        parent: FrameId,
        bindings: HashMap<String, Value>,
        closure: Option<BTreeSet<String>>,
    ) -> ScopeResult<FrameId> {
        self.frame(parent)?;
        let id = FrameId(self.frames.len());
        self.frames.push(Frame {
            bindings,
            parent: Some(parent),
            closure,
        });
        Ok(id)
    }

    fn frame(&self, id: FrameId) -> ScopeResult<&Frame> {
        self.frames.get(id.0).ok_or(ScopeError::UnknownFrame(id.0))
    }

    fn frame_mut(&mut self, id: FrameId) -> ScopeResult<&mut Frame> {
        self.frames.get_mut(id.0).ok_or(ScopeError::UnknownFrame(id.0))
    }

    pub fn is_root(&self, frame: FrameId) -> ScopeResult<bool> {
        Ok(self.frame(frame)?.parent.is_none())
    }

    /// Finds the frame that holds `name` as seen from `frame`.
    ///
    /// `inherited` is a closure set already in force from a nearer frame; it
    /// takes precedence over the closure recorded on each frame walked. The
    /// root is returned when no nearer frame qualifies, whether or not it
    /// binds `name`.
    pub fn resolve_scope<'a>(
        &'a self,
        frame: FrameId,
        name: &str,
        inherited: Option<&'a BTreeSet<String>>,
    ) -> ScopeResult<FrameId> {
        let mut current = frame;
        let mut restriction = inherited;
        loop {
            let scope = self.frame(current)?;
            let Some(parent) = scope.parent else {
                return Ok(current);
            };
            let effective = restriction.or(scope.closure.as_ref());
            if scope.bindings.contains_key(name) && effective.is_none_or(|set| set.contains(name)) {
                return Ok(current);
            }
            restriction = effective;
            current = parent;
        }
    }

    pub fn get(&self, frame: FrameId, name: &str) -> ScopeResult<&Value> {
        let holder = self.resolve_scope(frame, name, None)?;
        self.frame(holder)?
            .bindings
            .get(name)
            .ok_or_else(|| ScopeError::NameNotFound(name.to_string()))
    }

    /// Binds `name` in `frame` itself, shadowing any outer binding.
    pub fn define(
        &mut self,
        frame: FrameId,
        name: impl Into<String>,
        value: Value,
    ) -> ScopeResult<()> {
        self.frame_mut(frame)?.bindings.insert(name.into(), value);
        Ok(())
    }

    /// Overwrites the existing binding `name` wherever it lives.
    pub fn assign(&mut self, frame: FrameId, name: &str, value: Value) -> ScopeResult<()> {
        let holder = self.resolve_scope(frame, name, None)?;
        match self.frame_mut(holder)?.bindings.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ScopeError::NameNotFound(name.to_string())),
        }
    }
}
