//! Operation registry
//!
//! Every management/action block family declares an operation enum
//! implementing [`Operation`]. At runtime start all families are folded into
//! one [`OperationRegistry`] keyed by `(BlockKind, OperationId)`, so blocks
//! resolve and dispatch the same way whatever their family.

use crate::block::{params, BlockKind};
use crate::context::ExecutionContext;
use crate::error::{Result, ScriptError};
use crate::result::ExecutionResult;
use crate::value::{Parameters, Value};
use std::collections::HashMap;
use std::fmt;

/// Canonical operation name (upper snake case)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(&'static str);

impl OperationId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Everything a handler gets to see about the block it runs for
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub kind: BlockKind,
    pub operation: OperationId,
    /// Primary target identifier (variable, player, world, template…)
    pub target: &'a str,
    pub params: &'a Parameters,
}

impl<'a> Invocation<'a> {
    pub fn param(&self, key: &str) -> Option<&'a Value> {
        self.params.get(key)
    }

    pub fn value(&self) -> Option<&'a Value> {
        self.params.get(params::VALUE)
    }

    pub fn require_value(&self) -> Result<&'a Value> {
        self.value().ok_or_else(|| self.missing(params::VALUE))
    }

    pub fn require_param(&self, key: &str) -> Result<&'a Value> {
        self.param(key).ok_or_else(|| self.missing(key))
    }

    /// Non-empty target
    pub fn require_target(&self) -> Result<&'a str> {
        let target = self.target.trim();
        if target.is_empty() {
            return Err(self.missing(params::TARGET));
        }
        Ok(target)
    }

    /// Numeric `value` parameter
    pub fn number(&self) -> Result<f64> {
        let value = self.require_value()?;
        value.as_number().ok_or_else(|| {
            ScriptError::Operation(format!(
                "{} {} expects a number, got {} '{}'",
                self.kind, self.operation, value.type_name(), value
            ))
        })
    }

    fn missing(&self, key: &str) -> ScriptError {
        ScriptError::Operation(format!(
            "{} {} requires parameter '{}'",
            self.kind, self.operation, key
        ))
    }
}

/// Operation handler: `(target, args, context) -> result`
pub type Handler = fn(&Invocation<'_>, &mut ExecutionContext) -> ExecutionResult;

/// An operation enum of one block family
pub trait Operation: Copy + 'static {
    /// Family this enum belongs to
    const BLOCK: BlockKind;

    /// Every value of the enum
    const ALL: &'static [Self];

    /// Canonical upper snake case name
    fn name(self) -> &'static str;

    /// Run the operation; the message of `Ok` ends up in the success result
    fn apply(self, call: &Invocation<'_>, ctx: &mut ExecutionContext) -> Result<String>;

    fn id(self) -> OperationId {
        OperationId::new(self.name())
    }

    fn parse(raw: &str) -> Option<Self> {
        let wanted = normalize(raw);
        Self::ALL.iter().copied().find(|op| op.name() == wanted)
    }
}

/// Handler shared by every operation of a family
fn dispatch<O: Operation>(call: &Invocation<'_>, ctx: &mut ExecutionContext) -> ExecutionResult {
    match O::ALL.iter().copied().find(|op| op.id() == call.operation) {
        Some(op) => op.apply(call, ctx).into(),
        None => ExecutionResult::error(ScriptError::Operation(format!(
            "{} has no handler for {}",
            call.kind, call.operation
        ))),
    }
}

/// `give-template`, `Give Template` and `GIVE_TEMPLATE` all name the same operation
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Dispatch table for every block family
#[derive(Default)]
pub struct OperationRegistry {
    tables: HashMap<BlockKind, HashMap<&'static str, Handler>>,
}

impl OperationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in block family
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::blocks::register_all(&mut registry);
        tracing::debug!("Operation registry built with {} operations", registry.len());
        registry
    }

    /// Register every operation of a family
    pub fn register_family<O: Operation>(&mut self) {
        for op in O::ALL {
            self.register(O::BLOCK, op.id(), dispatch::<O>);
        }
    }

    /// Register one handler, returning the one it replaced
    pub fn register(&mut self, kind: BlockKind, id: OperationId, handler: Handler) -> Option<Handler> {
        self.tables.entry(kind).or_default().insert(id.as_str(), handler)
    }

    /// Resolve a raw operation name for a block kind
    pub fn resolve(&self, kind: BlockKind, raw: &str) -> Result<(OperationId, Handler)> {
        let wanted = normalize(raw);
        if wanted.is_empty() {
            return Err(ScriptError::Operation(format!("{} block has no operation", kind)));
        }

        self.tables
            .get(&kind)
            .and_then(|table| table.get_key_value(wanted.as_str()))
            .map(|(name, handler)| (OperationId::new(*name), *handler))
            .ok_or_else(|| ScriptError::Operation(format!("unknown {} operation '{}'", kind, raw.trim())))
    }

    pub fn contains(&self, kind: BlockKind, raw: &str) -> bool {
        self.resolve(kind, raw).is_ok()
    }

    /// Registered operations of a kind, sorted by name
    pub fn operations(&self, kind: BlockKind) -> Vec<OperationId> {
        let mut ops: Vec<_> = self
            .tables
            .get(&kind)
            .map(|table| table.keys().map(|name| OperationId::new(*name)).collect())
            .unwrap_or_default();
        ops.sort();
        ops
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
