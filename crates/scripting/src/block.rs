//! Code blocks
//!
//! A [`CodeBlock`] is one executable unit: a kind, a parameter map and, for
//! control blocks, a nested body. Action blocks resolve their operation
//! through the runtime's registry; control blocks are realized by the engine.

use crate::condition::Condition;
use crate::context::ExecutionContext;
use crate::engine;
use crate::error::{Result, ScriptError};
use crate::log::LogLevel;
use crate::registry::{Invocation, OperationId};
use crate::result::ExecutionResult;
use crate::runtime::Runtime;
use crate::value::{Parameters, Scope, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Well-known parameter keys
pub mod params {
    pub const OPERATION: &str = "operation";
    pub const TARGET: &str = "target";
    pub const VALUE: &str = "value";
    pub const SOURCE: &str = "source";
    pub const CONDITION: &str = "condition";
    pub const ERROR_HANDLING: &str = "errorHandling";
    pub const NOTIFY: &str = "notify";
    pub const SUCCESS_MESSAGE: &str = "successMessage";
    pub const FAILURE_MESSAGE: &str = "failureMessage";
    pub const BACKUP: &str = "backup";
    pub const LOG: &str = "log";
    pub const ASYNC_EXECUTION: &str = "asyncExecution";
    pub const MAX_ITERATIONS: &str = "maxIterations";
    pub const INDEX_VARIABLE: &str = "indexVariable";
    pub const NAME: &str = "name";
    pub const FUNCTION: &str = "function";
    /// Prefix of CALL_FUNCTION arguments (`arg.count` binds local `count`)
    pub const ARG_PREFIX: &str = "arg.";
}

/// Block kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockKind {
    // Management/action families
    Variable,
    Command,
    Item,
    World,
    Message,

    // Control flow
    If,
    Else,
    Repeat,
    Function,
    CallFunction,
}

impl BlockKind {
    pub const ALL: &'static [BlockKind] = &[
        BlockKind::Variable,
        BlockKind::Command,
        BlockKind::Item,
        BlockKind::World,
        BlockKind::Message,
        BlockKind::If,
        BlockKind::Else,
        BlockKind::Repeat,
        BlockKind::Function,
        BlockKind::CallFunction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Variable => "VARIABLE",
            BlockKind::Command => "COMMAND",
            BlockKind::Item => "ITEM",
            BlockKind::World => "WORLD",
            BlockKind::Message => "MESSAGE",
            BlockKind::If => "IF",
            BlockKind::Else => "ELSE",
            BlockKind::Repeat => "REPEAT",
            BlockKind::Function => "FUNCTION",
            BlockKind::CallFunction => "CALL_FUNCTION",
        }
    }

    /// Realized by the engine rather than the operation registry
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            BlockKind::If | BlockKind::Else | BlockKind::Repeat | BlockKind::Function | BlockKind::CallFunction
        )
    }

    /// May carry a nested body
    pub fn has_body(&self) -> bool {
        matches!(
            self,
            BlockKind::If | BlockKind::Else | BlockKind::Repeat | BlockKind::Function
        )
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockKind {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = crate::registry::normalize(s);
        BlockKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ScriptError::Validation(format!("Unknown block kind: {}", s)))
    }
}

/// What a failing block does to the rest of its line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandling {
    /// Log the error and go on with the next block
    #[default]
    Continue,
    /// Abort the remaining blocks of the line
    Stop,
}

impl ErrorHandling {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "CONTINUE" => Some(ErrorHandling::Continue),
            "STOP" => Some(ErrorHandling::Stop),
            _ => None,
        }
    }
}

/// One executable block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    kind: BlockKind,
    #[serde(default)]
    parameters: Parameters,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    body: Vec<CodeBlock>,
}

impl CodeBlock {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            parameters: Parameters::new(),
            body: Vec::new(),
        }
    }

    /// Action block with its operation and target set
    pub fn action(kind: BlockKind, operation: &str, target: &str) -> Self {
        Self::new(kind)
            .with_param(params::OPERATION, operation)
            .with_param(params::TARGET, target)
    }

    /// Builder form of [`CodeBlock::set_parameter`]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.set(key, value);
        self
    }

    /// Builder form of [`CodeBlock::set_body`]
    pub fn with_body(mut self, body: Vec<CodeBlock>) -> Self {
        self.body = body;
        self
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.parameters.set(key, value)
    }

    pub fn remove_parameter(&mut self, key: &str) -> Option<Value> {
        self.parameters.remove(key)
    }

    pub fn body(&self) -> &[CodeBlock] {
        &self.body
    }

    pub fn set_body(&mut self, body: Vec<CodeBlock>) {
        self.body = body;
    }

    pub fn push_child(&mut self, block: CodeBlock) {
        self.body.push(block);
    }

    pub fn remove_child(&mut self, index: usize) -> Option<CodeBlock> {
        (index < self.body.len()).then(|| self.body.remove(index))
    }

    pub fn target(&self) -> String {
        self.parameters.text(params::TARGET).unwrap_or_default()
    }

    pub fn condition(&self) -> Option<String> {
        self.parameters.text(params::CONDITION)
    }

    pub fn error_handling(&self) -> ErrorHandling {
        self.parameters
            .text(params::ERROR_HANDLING)
            .and_then(|raw| ErrorHandling::parse(&raw))
            .unwrap_or_default()
    }

    /// Hook for offloading pure computation; effects still go through the main thread
    pub fn async_execution(&self) -> bool {
        self.parameters.flag(params::ASYNC_EXECUTION)
    }

    /// Check this block and its body; must pass before the block runs
    pub fn validate(&self) -> Result<()> {
        if let Some(raw) = self.parameters.text(params::ERROR_HANDLING) {
            if ErrorHandling::parse(&raw).is_none() {
                return Err(self.invalid(format!("errorHandling must be STOP or CONTINUE, got '{}'", raw)));
            }
        }

        if !self.kind.has_body() && !self.body.is_empty() {
            return Err(self.invalid("only IF, ELSE, REPEAT and FUNCTION blocks may have a body"));
        }

        match self.kind {
            BlockKind::Variable
            | BlockKind::Command
            | BlockKind::Item
            | BlockKind::World
            | BlockKind::Message => {
                let operation = self.parameters.text(params::OPERATION).unwrap_or_default();
                if operation.trim().is_empty() {
                    return Err(self.invalid("missing operation"));
                }
            }
            BlockKind::Repeat => {
                if self.parameters.contains(params::MAX_ITERATIONS) {
                    match self.parameters.integer(params::MAX_ITERATIONS) {
                        Some(n) if n >= 0 => {}
                        _ => return Err(self.invalid("maxIterations must be a non-negative integer")),
                    }
                }
            }
            BlockKind::Function => {
                if self.function_name().is_none() {
                    return Err(self.invalid("function needs a name"));
                }
            }
            BlockKind::CallFunction => {
                let name = self.parameters.text(params::FUNCTION).unwrap_or_default();
                if name.trim().is_empty() {
                    return Err(self.invalid("no function to call"));
                }
                // Arguments become plain LOCAL names in the function's frame
                for (arg, _) in self.parameters.with_prefix(params::ARG_PREFIX) {
                    if arg.trim().is_empty() || Scope::split(arg).0.is_some() {
                        return Err(self.invalid(format!(
                            "argument '{}{}' must be a plain variable name",
                            params::ARG_PREFIX,
                            arg
                        )));
                    }
                }
            }
            BlockKind::If | BlockKind::Else => {}
        }

        validate_sequence(&self.body)
    }

    /// Declared name of a FUNCTION block
    pub fn function_name(&self) -> Option<String> {
        if self.kind != BlockKind::Function {
            return None;
        }
        self.parameters
            .text(params::NAME)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }

    fn invalid(&self, message: impl fmt::Display) -> ScriptError {
        ScriptError::Validation(format!("{} block: {}", self.kind, message))
    }

    /// Execute this block
    ///
    /// Control blocks run their body through the engine's work stack.
    pub fn execute(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        if self.kind.is_control() {
            return engine::execute_control(self, ctx);
        }
        self.execute_action(ctx)
    }

    /// Resolve, gate, dispatch, log, notify and back up an action block
    pub(crate) fn execute_action(&self, ctx: &mut ExecutionContext) -> ExecutionResult {
        let runtime = ctx.runtime().clone();

        let raw = self.parameters.text(params::OPERATION).unwrap_or_default();
        let (operation, handler) = match runtime.registry().resolve(self.kind, &raw) {
            Ok(resolved) => resolved,
            Err(err) => {
                let result = ExecutionResult::error(err);
                self.notify(ctx, &runtime, &result);
                return result;
            }
        };

        if !self.condition_passes(ctx) {
            return ExecutionResult::skipped();
        }

        let target = self.target();
        let backup = self.backup_candidate(ctx, &target);

        let call = Invocation {
            kind: self.kind,
            operation,
            target: &target,
            params: &self.parameters,
        };
        let result = handler(&call, ctx);
        runtime.statistics().record(self.kind, operation);

        let level = if result.is_success() { LogLevel::Info } else { LogLevel::Error };
        let line = || format!("{} {} '{}': {}", self.kind, operation, target, result);
        if self.parameters.flag(params::LOG) {
            ctx.publish(level, line());
        } else if ctx.is_debug() {
            ctx.log(level, line());
        }

        self.notify(ctx, &runtime, &result);

        if let Some(previous) = backup {
            if result.is_success() {
                runtime.backups().save(self.kind, &target, previous);
            }
        }

        result
    }

    /// Previous state of the target when `backup` is requested
    ///
    /// Only VARIABLE blocks have state the engine can read back.
    fn backup_candidate(&self, ctx: &ExecutionContext, target: &str) -> Option<Option<Value>> {
        if !self.parameters.flag(params::BACKUP) || self.kind != BlockKind::Variable || target.is_empty() {
            return None;
        }
        Some(ctx.get_variable(target))
    }

    /// Tell the triggering player how it went, when the block asks for it
    fn notify(&self, ctx: &ExecutionContext, runtime: &Runtime, result: &ExecutionResult) {
        let config = runtime.config();
        if !config.notify_players || !self.parameters.flag(params::NOTIFY) {
            return;
        }
        let Some(player) = ctx.player() else {
            return;
        };

        let (key, fallback) = if result.is_success() {
            (params::SUCCESS_MESSAGE, &config.success_message)
        } else {
            (params::FAILURE_MESSAGE, &config.failure_message)
        };
        let message = self.parameters.text(key).unwrap_or_else(|| fallback.clone());
        let text = config.colorize(result.is_success(), &ctx.interpolate(&message));
        runtime.messages().notify(player, &text);
    }

    /// Operation this block would dispatch to, if it resolves
    pub fn resolve_operation(&self, runtime: &Runtime) -> Result<OperationId> {
        let raw = self.parameters.text(params::OPERATION).unwrap_or_default();
        runtime.registry().resolve(self.kind, &raw).map(|(id, _)| id)
    }

    /// Evaluate the `condition` parameter (absent means true)
    ///
    /// Malformed conditions are logged; a false one is logged as a skip.
    pub fn condition_passes(&self, ctx: &mut ExecutionContext) -> bool {
        let Some(raw) = self.condition() else {
            return true;
        };

        let parsed = Condition::parse(&raw);
        if let Some(problem) = parsed.diagnose() {
            ctx.log(LogLevel::Warn, problem.to_string());
        }
        let passed = parsed.evaluate(ctx);
        if !passed {
            ctx.log(LogLevel::Info, format!("{} skipped: condition '{}' is false", self.kind, raw));
        }
        passed
    }
}

/// Validate blocks that execute in order, including ELSE placement
pub fn validate_sequence(blocks: &[CodeBlock]) -> Result<()> {
    for (index, block) in blocks.iter().enumerate() {
        if block.kind == BlockKind::Else {
            let after_if = index
                .checked_sub(1)
                .map(|prev| blocks[prev].kind == BlockKind::If)
                .unwrap_or(false);
            if !after_if {
                return Err(ScriptError::Validation(format!(
                    "ELSE block at position {} does not follow an IF block",
                    index + 1
                )));
            }
        }
        block.validate()?;
    }
    Ok(())
}
