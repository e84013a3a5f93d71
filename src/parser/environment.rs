//! Scoped symbol table for FormCalc evaluation
//!
//! A stack of frames, each carrying a case-sensitive variable map, a
//! function map keyed by lowercased name, a current-value slot, and a
//! context tag. Lookup is asymmetric: variables resolve innermost-first,
//! functions check the root frame before walking inward-out, which is what
//! lets host-registered natives win over same-named inner definitions.

use crate::parser::ast::{Separator, Statement, Value};
use crate::parser::error::{ErrorKind, FormCalcError};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Host callback backing a native function.
pub type NativeCallback = dyn Fn(&[Value]) -> anyhow::Result<Option<Value>>;

/// A callable registered in the environment.
#[derive(Clone)]
pub enum FunctionDef {
    User {
        params: Vec<String>,
        body: Vec<Statement>,
    },
    Native {
        callback: Rc<NativeCallback>,
    },
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionDef::User { params, .. } => {
                write!(f, "FunctionDef::User({} params)", params.len())
            }
            FunctionDef::Native { .. } => write!(f, "FunctionDef::Native"),
        }
    }
}

/// What kind of construct opened a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextTag {
    Root,
    Block,
    Function,
    While,
    For,
    Foreach,
}

/// Context queries answered by [`Environment::in_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Function,
    Loop,
}

/// One evaluated segment of an accessor; structural resolution is delegated
/// to the environment through [`Environment::get_path`]/[`set_path`].
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentKind {
    Name(String),
    /// `name[expr]` with the index evaluated, or `name[*]` (`None`).
    Index {
        name: String,
        index: Option<Value>,
    },
    /// `name(args)` with the arguments evaluated.
    Call {
        name: String,
        args: Vec<Value>,
    },
}

impl SegmentKind {
    pub fn name(&self) -> &str {
        match self {
            SegmentKind::Name(name) => name,
            SegmentKind::Index { name, .. } => name,
            SegmentKind::Call { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    /// `None` for the first segment of a chain.
    pub separator: Option<Separator>,
    pub kind: SegmentKind,
}

/// A fully evaluated addressing value, handed to the environment to resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessorPath {
    pub segments: Vec<PathSegment>,
    pub all_children: bool,
}

impl AccessorPath {
    /// The variable name when the path is a single bare name.
    pub fn plain_name(&self) -> Option<&str> {
        if self.all_children || self.segments.len() != 1 {
            return None;
        }
        match &self.segments[0].kind {
            SegmentKind::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for AccessorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            if let Some(separator) = segment.separator {
                write!(f, "{}", separator)?;
            }
            write!(f, "{}", segment.kind.name())?;
        }
        if self.all_children {
            write!(f, ".*")?;
        }
        Ok(())
    }
}

struct Frame {
    variables: HashMap<String, Option<Value>>,
    functions: HashMap<String, FunctionDef>,
    slot: Option<Value>,
    tag: ContextTag,
}

impl Frame {
    fn new(tag: ContextTag) -> Self {
        Frame {
            variables: HashMap::new(),
            functions: HashMap::new(),
            slot: None,
            tag,
        }
    }
}

/// Scope stack for variables, functions, and the current-value slots.
pub struct Environment {
    frames: Vec<Frame>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// A root frame only; `reset` establishes the top-level block scope.
    pub fn new() -> Self {
        Environment {
            frames: vec![Frame::new(ContextTag::Root)],
        }
    }

    /// Drop everything above the root, clear the root slot, and open a fresh
    /// top-level block scope. Root-registered functions survive.
    pub fn reset(&mut self) {
        self.frames.truncate(1);
        self.frames[0].slot = None;
        self.push(ContextTag::Block);
    }

    /// Open a new frame; returns its depth.
    pub fn push(&mut self, tag: ContextTag) -> usize {
        self.frames.push(Frame::new(tag));
        self.frames.len() - 1
    }

    /// Depth of the current frame (root is 0).
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Close the current frame, returning the topmost slot value.
    pub fn pop(&mut self) -> Result<Option<Value>, FormCalcError> {
        self.pop_to(self.depth())
    }

    /// Close every frame at `to` and above, returning the topmost slot
    /// value first. Scope boundaries forward that value to the enclosing
    /// frame with [`Environment::poke`], so an absent slot leaves the outer
    /// value untouched.
    pub fn pop_to(&mut self, to: usize) -> Result<Option<Value>, FormCalcError> {
        if to == 0 || self.frames.len() == 1 {
            return Err(FormCalcError::new(
                ErrorKind::StructuralContext,
                "never pop the root scope".to_string(),
            ));
        }
        let result = self.frames.last().and_then(|frame| frame.slot.clone());
        self.frames.truncate(to);
        Ok(result)
    }

    /// Write the current frame's slot; an absent value is ignored.
    pub fn poke(&mut self, value: Option<Value>) {
        if value.is_some() {
            if let Some(frame) = self.frames.last_mut() {
                frame.slot = value;
            }
        }
    }

    /// Read the current frame's slot.
    pub fn peek(&self) -> Option<Value> {
        self.frames.last().and_then(|frame| frame.slot.clone())
    }

    /// Bind a variable. A forced depth writes there; otherwise the nearest
    /// enclosing binding is overwritten in place, else a new binding is
    /// created in the current frame.
    pub fn set_variable(&mut self, name: &str, value: Option<Value>, depth: Option<usize>) {
        if let Some(depth) = depth {
            if let Some(frame) = self.frames.get_mut(depth) {
                frame.variables.insert(name.to_string(), value);
            }
            return;
        }
        for frame in self.frames.iter_mut().rev() {
            if frame.variables.contains_key(name) {
                frame.variables.insert(name.to_string(), value);
                return;
            }
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.variables.insert(name.to_string(), value);
        }
    }

    /// Innermost-first, case-sensitive variable lookup.
    pub fn get_variable(&self, name: &str) -> Result<Option<Value>, FormCalcError> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.variables.get(name) {
                return Ok(value.clone());
            }
        }
        Err(FormCalcError::variable_not_found(name))
    }

    /// Register a function under its lowercased name, at a forced depth or
    /// the current frame.
    pub fn register_function(&mut self, name: &str, def: FunctionDef, depth: Option<usize>) {
        let name = name.to_lowercase();
        let index = depth.unwrap_or_else(|| self.depth());
        if let Some(frame) = self.frames.get_mut(index) {
            frame.functions.insert(name, def);
        }
    }

    /// Case-insensitive function lookup: the root frame first, then from the
    /// current frame inward-out down to (but excluding) the root.
    pub fn find_function(&self, name: &str) -> Result<FunctionDef, FormCalcError> {
        let key = name.to_lowercase();
        if let Some(def) = self.frames[0].functions.get(&key) {
            return Ok(def.clone());
        }
        for frame in self.frames.iter().skip(1).rev() {
            if let Some(def) = frame.functions.get(&key) {
                return Ok(def.clone());
            }
        }
        Err(FormCalcError::function_not_found(name))
    }

    /// Scan context tags from the current frame down to (excluding) the
    /// root. A loop query is blocked by an intervening function frame.
    pub fn in_context(&self, kind: ContextKind) -> bool {
        for frame in self.frames.iter().skip(1).rev() {
            match (kind, frame.tag) {
                (ContextKind::Function, ContextTag::Function) => return true,
                (ContextKind::Loop, ContextTag::Function) => return false,
                (
                    ContextKind::Loop,
                    ContextTag::While | ContextTag::For | ContextTag::Foreach,
                ) => return true,
                _ => {}
            }
        }
        false
    }

    /// Resolve an addressing path for reading. The base environment resolves
    /// a plain name as a variable; structural paths belong to host object
    /// models layered on top.
    pub fn get_path(&self, path: &AccessorPath) -> Result<Option<Value>, FormCalcError> {
        match path.plain_name() {
            Some(name) => self.get_variable(name),
            None => Err(FormCalcError::new(
                ErrorKind::NameNotFound,
                format!("accessor \"{}\" not found", path),
            )),
        }
    }

    /// Resolve an addressing path for writing. Assignment to a plain name
    /// probes the binding first, so storing to an undeclared name fails.
    pub fn set_path(
        &mut self,
        path: &AccessorPath,
        value: Option<Value>,
    ) -> Result<(), FormCalcError> {
        match path.plain_name() {
            Some(name) => {
                self.get_variable(name)?;
                self.set_variable(name, value, None);
                Ok(())
            }
            None => Err(FormCalcError::new(
                ErrorKind::NameNotFound,
                format!("accessor \"{}\" not found", path),
            )),
        }
    }

    pub fn is_collection(&self, value: &Value) -> bool {
        matches!(value, Value::Collection(_))
    }

    /// Nth item of a collection, for hosts walking multi-valued results.
    pub fn nth(&self, value: &Value, n: usize) -> Result<Value, FormCalcError> {
        if let Value::Collection(items) = value {
            if let Some(item) = items.get(n) {
                return Ok(item.clone());
            }
        }
        Err(FormCalcError::new(
            ErrorKind::NameNotFound,
            format!("nth({}) item not found", n),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(name: &str) -> AccessorPath {
        AccessorPath {
            segments: vec![PathSegment {
                separator: None,
                kind: SegmentKind::Name(name.to_string()),
            }],
            all_children: false,
        }
    }

    #[test]
    fn test_variable_shadowing() {
        let mut env = Environment::new();
        env.reset();
        let outer = env.depth();
        env.set_variable("a", Some(Value::Number(1.0)), Some(outer));

        let inner = env.push(ContextTag::Block);
        env.set_variable("a", Some(Value::Number(2.0)), Some(inner));
        assert_eq!(env.get_variable("a").unwrap(), Some(Value::Number(2.0)));

        env.pop().unwrap();
        assert_eq!(env.get_variable("a").unwrap(), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_set_without_depth_writes_through() {
        let mut env = Environment::new();
        env.reset();
        let outer = env.depth();
        env.set_variable("a", Some(Value::Number(1.0)), Some(outer));

        env.push(ContextTag::Block);
        env.set_variable("a", Some(Value::Number(5.0)), None);
        env.pop().unwrap();

        assert_eq!(env.get_variable("a").unwrap(), Some(Value::Number(5.0)));
    }

    #[test]
    fn test_variables_are_case_sensitive() {
        let mut env = Environment::new();
        env.reset();
        env.set_variable("Total", Some(Value::Number(1.0)), None);
        assert!(env.get_variable("total").is_err());
    }

    #[test]
    fn test_functions_are_case_insensitive() {
        let mut env = Environment::new();
        env.reset();
        env.register_function(
            "Sum",
            FunctionDef::User {
                params: vec![],
                body: vec![],
            },
            None,
        );
        assert!(env.find_function("sum").is_ok());
        assert!(env.find_function("SUM").is_ok());
    }

    #[test]
    fn test_root_function_wins() {
        let mut env = Environment::new();
        env.register_function(
            "f",
            FunctionDef::User {
                params: vec!["root".to_string()],
                body: vec![],
            },
            Some(0),
        );
        env.reset();
        env.register_function(
            "f",
            FunctionDef::User {
                params: vec![],
                body: vec![],
            },
            None,
        );

        match env.find_function("f").unwrap() {
            FunctionDef::User { params, .. } => assert_eq!(params, vec!["root".to_string()]),
            other => panic!("unexpected def: {:?}", other),
        }
    }

    #[test]
    fn test_root_functions_survive_reset() {
        let mut env = Environment::new();
        env.register_function(
            "native",
            FunctionDef::Native {
                callback: Rc::new(|_| Ok(None)),
            },
            Some(0),
        );
        env.reset();
        env.reset();
        assert!(env.find_function("native").is_ok());
    }

    #[test]
    fn test_never_pop_root() {
        let mut env = Environment::new();
        assert!(env.pop().is_err());
        env.reset();
        assert!(env.pop_to(0).is_err());
    }

    #[test]
    fn test_pop_to_reads_topmost_slot() {
        let mut env = Environment::new();
        env.reset();
        let s = env.push(ContextTag::While);
        env.push(ContextTag::Block);
        env.poke(Some(Value::Number(7.0)));

        // Both frames go; the topmost slot is the result.
        assert_eq!(env.pop_to(s).unwrap(), Some(Value::Number(7.0)));
        assert_eq!(env.depth(), 1);
    }

    #[test]
    fn test_poke_ignores_absent() {
        let mut env = Environment::new();
        env.reset();
        env.poke(Some(Value::Number(3.0)));
        env.poke(None);
        assert_eq!(env.peek(), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_in_context() {
        let mut env = Environment::new();
        env.reset();
        assert!(!env.in_context(ContextKind::Loop));
        assert!(!env.in_context(ContextKind::Function));

        env.push(ContextTag::While);
        assert!(env.in_context(ContextKind::Loop));

        // A function frame blocks the loop query but answers the function one.
        env.push(ContextTag::Function);
        assert!(!env.in_context(ContextKind::Loop));
        assert!(env.in_context(ContextKind::Function));

        env.push(ContextTag::For);
        assert!(env.in_context(ContextKind::Loop));
    }

    #[test]
    fn test_path_protocol() {
        let mut env = Environment::new();
        env.reset();

        // Assignment to an undeclared name is a miss.
        assert!(env.set_path(&plain("a"), Some(Value::Number(1.0))).is_err());

        env.set_variable("a", Some(Value::Number(1.0)), None);
        env.set_path(&plain("a"), Some(Value::Number(2.0))).unwrap();
        assert_eq!(env.get_path(&plain("a")).unwrap(), Some(Value::Number(2.0)));

        // Structured paths are host territory.
        let structured = AccessorPath {
            segments: vec![
                PathSegment {
                    separator: None,
                    kind: SegmentKind::Name("a".to_string()),
                },
                PathSegment {
                    separator: Some(Separator::Child),
                    kind: SegmentKind::Name("b".to_string()),
                },
            ],
            all_children: false,
        };
        assert!(env.get_path(&structured).is_err());
    }

    #[test]
    fn test_nth() {
        let env = Environment::new();
        let coll = Value::Collection(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert!(env.is_collection(&coll));
        assert_eq!(env.nth(&coll, 1).unwrap(), Value::Number(2.0));
        assert!(env.nth(&coll, 2).is_err());
        assert!(!env.is_collection(&Value::Number(1.0)));
    }
}
