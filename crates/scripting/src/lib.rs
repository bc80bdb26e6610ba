//! # Housing Scripting Engine
//!
//! Runs the code-block scripts players build inside their houses.
//!
//! ## Features
//! - Block/line/script data model, editable and serializable
//! - LOCAL/GLOBAL/SYSTEM variable scoping
//! - IF/ELSE, REPEAT and functions on an explicit work stack
//! - One operation registry for every action block family
//! - Depth guard, bounded execution log and run statistics
//!
//! ## Running a script
//!
//! A [`Runtime`] is started once with the host's collaborators. Scripts are
//! loaded (validated) once and then run by a [`ScriptEngine`] for every
//! triggering event; each run gets its own [`ExecutionContext`].
//!
//! Effects reach the world only through an [`EffectHandler`]. Hosts whose
//! world may only be touched from one thread wrap their handler in
//! [`MainThreadEffects`] and drive the returned [`EffectPump`].

pub mod block;
pub mod blocks;
pub mod condition;
pub mod context;
pub mod effects;
pub mod engine;
pub mod error;
pub mod event;
pub mod line;
pub mod log;
pub mod registry;
pub mod result;
pub mod runtime;
pub mod script;
pub mod system;
pub mod value;

#[cfg(test)]
mod testing;

pub use block::{params, BlockKind, CodeBlock, ErrorHandling};
pub use context::{ExecutionContext, ExecutionStats, GlobalVariables};
pub use effects::{
    BufferedSink, Collaborators, EffectHandler, EffectPump, EffectRequest, MainThreadEffects,
    MessageSink, NullEffects, RecordingEffects, TracingSink,
};
pub use engine::{BlockOutcome, LineReport, RunReport, ScriptEngine};
pub use error::{Result, ScriptError};
pub use event::{EventType, Trigger};
pub use line::CodeLine;
pub use log::{ExecutionLog, LogEntry, LogLevel};
pub use registry::{Invocation, Operation, OperationId, OperationRegistry};
pub use result::ExecutionResult;
pub use runtime::{BackupStore, ItemTemplate, Runtime, TemplateRegistry, UsageStatistics};
pub use script::{CodeScript, FunctionDef, FunctionTable, ScriptStats};
pub use system::{HostSystemVariables, SystemVariables};
pub use value::{Parameters, Scope, Value, Variable};
