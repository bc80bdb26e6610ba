//! Script execution context
//!
//! One [`ExecutionContext`] exists per triggering event. It owns the LOCAL
//! variables of the run and references the script's GLOBAL store and the
//! runtime's SYSTEM provider.

use crate::error::{Result, ScriptError};
use crate::event::EventType;
use crate::log::{ExecutionLog, LogEntry, LogLevel};
use crate::runtime::Runtime;
use crate::script::FunctionTable;
use crate::system::SystemVariables;
use crate::value::{Scope, Value, Variable};
use dashmap::DashMap;
use housing_core::PlayerId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One GLOBAL cell; `None` once the variable is removed
type Slot = Arc<Mutex<Option<Value>>>;

/// GLOBAL variable store shared by every run of one script
///
/// Cloning is cheap and yields a handle to the same store. Every name maps
/// to its own locked slot, so read-modify-write updates of one name and
/// swaps of two names are atomic across concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct GlobalVariables {
    values: Arc<DashMap<String, Slot>>,
}

impl GlobalVariables {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Slot {
        self.values.entry(name.to_string()).or_default().value().clone()
    }

    fn existing(&self, name: &str) -> Option<Slot> {
        self.values.get(name).map(|entry| entry.value().clone())
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.existing(name).and_then(|slot| slot.lock().clone())
    }

    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.replace(&name.into(), Some(value))
    }

    /// Store `value` (or clear the variable for `None`), returning what was there
    pub fn replace(&self, name: &str, value: Option<Value>) -> Option<Value> {
        let slot = self.slot(name);
        let mut current = slot.lock();
        std::mem::replace(&mut *current, value)
    }

    /// Read-modify-write one variable under its lock
    ///
    /// `update` sees the current value (`None` if unset). On error the
    /// variable is left as it was. `update` must not touch this store.
    pub fn update<F>(&self, name: &str, update: F) -> Result<Value>
    where
        F: FnOnce(Option<&Value>) -> Result<Value>,
    {
        let slot = self.slot(name);
        let mut current = slot.lock();
        let next = update(current.as_ref())?;
        *current = Some(next.clone());
        Ok(next)
    }

    /// Exchange two variables atomically; an unset side stays unset on the other
    pub fn swap(&self, a: &str, b: &str) {
        if a == b {
            return;
        }
        // Lock in name order so opposing swaps cannot deadlock
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.slot(first);
        let second = self.slot(second);
        let mut first = first.lock();
        let mut second = second.lock();
        std::mem::swap(&mut *first, &mut *second);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.existing(name).and_then(|slot| slot.lock().take())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.iter().filter(|entry| entry.value().lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.values.clear();
    }

    /// Sorted copy of every global
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .filter_map(|entry| {
                let value = entry.value().lock().clone()?;
                Some((entry.key().clone(), value))
            })
            .collect()
    }
}

/// Per-run statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStats {
    pub elapsed: Duration,
    pub max_depth_reached: usize,
    /// Log entries written, including evicted ones
    pub log_entries: u64,
    pub blocks_executed: u64,
    pub blocks_failed: u64,
}

/// Per-run state threaded through every block
pub struct ExecutionContext {
    runtime: Arc<Runtime>,
    player: Option<PlayerId>,
    event: Option<EventType>,

    /// LOCAL frames; the last one is current. Function calls push a frame.
    frames: Vec<HashMap<String, Value>>,
    globals: GlobalVariables,
    system: Arc<dyn SystemVariables>,
    functions: Arc<FunctionTable>,

    depth: usize,
    max_depth: usize,
    max_depth_reached: usize,

    log: ExecutionLog,
    debug: bool,
    started: Instant,
    blocks_executed: u64,
    blocks_failed: u64,
}

impl ExecutionContext {
    /// Create a context bound to a GLOBAL store, limits taken from the runtime config
    pub fn new(runtime: Arc<Runtime>, globals: GlobalVariables) -> Self {
        let config = runtime.config();
        let max_depth = config.max_depth;
        let log = ExecutionLog::new(config.log_capacity);
        let debug = config.debug;
        let system = runtime.system().clone();

        Self {
            runtime,
            player: None,
            event: None,
            frames: vec![HashMap::new()],
            globals,
            system,
            functions: Arc::new(FunctionTable::default()),
            depth: 0,
            max_depth,
            max_depth_reached: 0,
            log,
            debug,
            started: Instant::now(),
            blocks_executed: 0,
            blocks_failed: 0,
        }
    }

    pub fn with_player(mut self, player: Option<PlayerId>) -> Self {
        self.player = player;
        self
    }

    pub fn with_event(mut self, event: Option<EventType>) -> Self {
        self.event = event;
        self
    }

    pub fn with_functions(mut self, functions: Arc<FunctionTable>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn player(&self) -> Option<&PlayerId> {
        self.player.as_ref()
    }

    pub fn event(&self) -> Option<&EventType> {
        self.event.as_ref()
    }

    pub fn globals(&self) -> &GlobalVariables {
        &self.globals
    }

    pub fn functions(&self) -> &Arc<FunctionTable> {
        &self.functions
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    /// Look a variable up LOCAL → GLOBAL → SYSTEM
    ///
    /// An explicit `local:`/`global:`/`system:` prefix restricts the lookup to
    /// that scope.
    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.resolve(name).map(|variable| variable.value)
    }

    /// Like [`ExecutionContext::get_variable`], also reporting the scope hit
    pub fn resolve(&self, name: &str) -> Option<Variable> {
        let (scope, bare) = Scope::split(name);
        let found = |value: Value, scope: Scope| Variable {
            name: bare.to_string(),
            value,
            scope,
        };

        match scope {
            Some(Scope::Local) => self.local(bare).cloned().map(|v| found(v, Scope::Local)),
            Some(Scope::Global) => self.globals.get(bare).map(|v| found(v, Scope::Global)),
            Some(Scope::System) => self.system.get(bare).map(|v| found(v, Scope::System)),
            None => self
                .local(bare)
                .cloned()
                .map(|v| found(v, Scope::Local))
                .or_else(|| self.globals.get(bare).map(|v| found(v, Scope::Global)))
                .or_else(|| self.system.get(bare).map(|v| found(v, Scope::System))),
        }
    }

    /// Write a variable; LOCAL unless the name carries a `global:` prefix
    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let (scope, bare) = writable(name)?;
        match scope {
            Some(Scope::Global) => {
                self.globals.set(bare, value.into());
            }
            _ => {
                self.current_frame_mut().insert(bare.to_string(), value.into());
            }
        }
        Ok(())
    }

    /// Remove a LOCAL variable from the current frame
    ///
    /// Prefixed GLOBAL/SYSTEM names are never touched.
    pub fn remove_local_variable(&mut self, name: &str) -> Option<Value> {
        match Scope::split(name) {
            (Some(Scope::Local) | None, bare) => self.current_frame_mut().remove(bare),
            _ => None,
        }
    }

    /// Remove a variable honouring scope prefixes
    pub fn remove_variable(&mut self, name: &str) -> Result<Option<Value>> {
        match Scope::split(name) {
            (Some(Scope::System), bare) => Err(ScriptError::ScopeViolation(format!(
                "cannot remove read-only system variable '{}'",
                bare
            ))),
            (Some(Scope::Global), bare) => Ok(self.globals.remove(bare)),
            _ => Ok(self.remove_local_variable(name)),
        }
    }

    /// Read-modify-write a variable in place
    ///
    /// The current value is resolved like [`ExecutionContext::get_variable`]
    /// and the result is written like [`ExecutionContext::set_variable`].
    /// `global:` names are updated under the variable's lock, so concurrent
    /// runs never lose each other's updates.
    pub fn update_variable<F>(&mut self, name: &str, update: F) -> Result<Value>
    where
        F: FnOnce(Option<&Value>) -> Result<Value>,
    {
        let (scope, bare) = writable(name)?;
        match scope {
            Some(Scope::Global) => self.globals.update(bare, update),
            _ => {
                let current = self.get_variable(name);
                let next = update(current.as_ref())?;
                self.current_frame_mut().insert(bare.to_string(), next.clone());
                Ok(next)
            }
        }
    }

    /// Exchange two variables; an unset side leaves the other unset
    ///
    /// The GLOBAL side of a swap is exchanged atomically.
    pub fn swap_variables(&mut self, a: &str, b: &str) -> Result<()> {
        let (scope_a, bare_a) = writable(a)?;
        let (scope_b, bare_b) = writable(b)?;

        match (scope_a == Some(Scope::Global), scope_b == Some(Scope::Global)) {
            (true, true) => self.globals.swap(bare_a, bare_b),
            (true, false) => {
                let local = self.get_variable(b);
                let global = self.globals.replace(bare_a, local);
                self.write_local(bare_b, global);
            }
            (false, true) => {
                let local = self.get_variable(a);
                let global = self.globals.replace(bare_b, local);
                self.write_local(bare_a, global);
            }
            (false, false) => {
                let first = self.get_variable(a);
                let second = self.get_variable(b);
                self.write_local(bare_a, second);
                self.write_local(bare_b, first);
            }
        }
        Ok(())
    }

    /// Set a LOCAL in the current frame, or remove it for `None`
    fn write_local(&mut self, bare: &str, value: Option<Value>) {
        match value {
            Some(value) => {
                self.current_frame_mut().insert(bare.to_string(), value);
            }
            None => {
                self.current_frame_mut().remove(bare);
            }
        }
    }

    /// LOCAL lookup, walking frames from the innermost outwards
    pub fn local(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Sorted copy of the current LOCAL frame
    pub fn locals(&self) -> BTreeMap<String, Value> {
        self.frames
            .last()
            .map(|frame| frame.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn current_frame_mut(&mut self) -> &mut HashMap<String, Value> {
        if self.frames.is_empty() {
            self.frames.push(HashMap::new());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Start a function frame that shadows the caller's locals
    pub fn push_frame(&mut self, bindings: HashMap<String, Value>) {
        self.frames.push(bindings);
    }

    /// Drop the innermost function frame; the base frame is never dropped
    pub fn pop_frame(&mut self) -> Option<HashMap<String, Value>> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Replace `{name}` placeholders with the textual value of the variable
    ///
    /// Unknown names are left untouched.
    pub fn interpolate(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match self.get_variable(name.trim()) {
                        Some(value) if !name.trim().is_empty() => out.push_str(&value.to_string()),
                        _ => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    // ------------------------------------------------------------------
    // Depth guard
    // ------------------------------------------------------------------

    /// Enter a nested body
    pub fn enter_scope(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(ScriptError::DepthExceeded {
                depth: self.depth + 1,
                max: self.max_depth,
            });
        }
        self.depth += 1;
        self.max_depth_reached = self.max_depth_reached.max(self.depth);
        Ok(())
    }

    /// Leave a nested body
    pub fn exit_scope(&mut self) {
        debug_assert!(self.depth > 0, "exit_scope without matching enter_scope");
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    // ------------------------------------------------------------------
    // Log and stats
    // ------------------------------------------------------------------

    /// Append to the execution log
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.record(level, message.into(), level >= LogLevel::Warn);
    }

    /// Log an entry and hand it to the host's message sink whatever its level
    pub fn publish(&mut self, level: LogLevel, message: impl Into<String>) {
        self.record(level, message.into(), true);
    }

    fn record(&mut self, level: LogLevel, message: String, forward: bool) {
        if forward {
            let sink = self.runtime.messages().clone();
            let line = format!("[{:?}] {}", level, message);
            // A panicking sink is reported by `shielded` and otherwise ignored
            let _ = self.runtime.shielded("log line", || sink.log(&line));
        }
        self.log.push(self.depth, level, message);
    }

    /// Append a block transition; only recorded in debug mode
    pub fn trace(&mut self, message: impl FnOnce() -> String) {
        if self.debug {
            self.log.push(self.depth, LogLevel::Trace, message());
        }
    }

    pub fn execution_log(&self) -> &ExecutionLog {
        &self.log
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.log.to_vec()
    }

    pub(crate) fn record_block(&mut self, success: bool) {
        self.blocks_executed += 1;
        if !success {
            self.blocks_failed += 1;
        }
    }

    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats {
            elapsed: self.started.elapsed(),
            max_depth_reached: self.max_depth_reached,
            log_entries: self.log.recorded(),
            blocks_executed: self.blocks_executed,
            blocks_failed: self.blocks_failed,
        }
    }

    /// End the run; LOCAL variables are dropped here
    pub fn finish(self) -> (ExecutionStats, Vec<LogEntry>) {
        let stats = self.stats();
        (stats, self.log.to_vec())
    }
}

/// Split a name that is about to be written, rejecting SYSTEM and empty names
fn writable(name: &str) -> Result<(Option<Scope>, &str)> {
    let (scope, bare) = Scope::split(name);
    if bare.is_empty() {
        return Err(ScriptError::Operation("variable name is empty".into()));
    }
    if scope == Some(Scope::System) {
        return Err(ScriptError::ScopeViolation(format!(
            "cannot write read-only system variable '{}'",
            bare
        )));
    }
    Ok((scope, bare))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::system::HostSystemVariables;
    use crate::effects::{Collaborators, NullEffects, TracingSink};
    use housing_config::EngineConfig;

    fn context_with(config: EngineConfig) -> ExecutionContext {
        let system = Arc::new(HostSystemVariables::new());
        system.set_weather("rain");
        let collaborators = Collaborators::new(Arc::new(NullEffects), Arc::new(TracingSink), system);
        let runtime = Runtime::start(config, collaborators);
        ExecutionContext::new(runtime, GlobalVariables::new())
    }

    fn context() -> ExecutionContext {
        context_with(EngineConfig::default())
    }

    #[test]
    fn test_resolution_order() {
        let mut ctx = context();
        assert_eq!(ctx.get_variable("weather"), Some(Value::from("rain")));

        ctx.globals().set("weather", Value::from("sunny"));
        assert_eq!(ctx.resolve("weather").unwrap().scope, Scope::Global);

        ctx.set_variable("weather", "snow").unwrap();
        let local = ctx.resolve("weather").unwrap();
        assert_eq!(local.scope, Scope::Local);
        assert_eq!(local.value, Value::from("snow"));

        assert_eq!(ctx.get_variable("global:weather"), Some(Value::from("sunny")));
        assert_eq!(ctx.get_variable("system:weather"), Some(Value::from("rain")));
        assert!(ctx.get_variable("missing").is_none());
    }

    #[test]
    fn test_prefixed_writes() {
        let mut ctx = context();
        ctx.set_variable("global:coins", 10.0).unwrap();
        assert_eq!(ctx.globals().get("coins"), Some(Value::Number(10.0)));
        assert!(ctx.local("coins").is_none());

        let err = ctx.set_variable("system:time", 5.0).unwrap_err();
        assert!(matches!(err, ScriptError::ScopeViolation(_)));

        assert!(ctx.set_variable("", 1.0).is_err());
    }

    #[test]
    fn test_remove_local_only_touches_local() {
        let mut ctx = context();
        ctx.set_variable("global:x", 1.0).unwrap();
        ctx.set_variable("x", 2.0).unwrap();

        assert_eq!(ctx.remove_local_variable("x"), Some(Value::Number(2.0)));
        assert_eq!(ctx.remove_local_variable("x"), None);
        assert_eq!(ctx.remove_local_variable("global:x"), None);
        assert_eq!(ctx.get_variable("x"), Some(Value::Number(1.0)));

        assert!(ctx.remove_variable("system:time").is_err());
        assert_eq!(ctx.remove_variable("global:x").unwrap(), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_function_frames_shadow_caller() {
        let mut ctx = context();
        ctx.set_variable("x", 1.0).unwrap();
        ctx.set_variable("y", 2.0).unwrap();

        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), Value::Number(10.0));
        ctx.push_frame(bindings);

        assert_eq!(ctx.get_variable("x"), Some(Value::Number(10.0)));
        assert_eq!(ctx.get_variable("y"), Some(Value::Number(2.0)));
        ctx.set_variable("y", 20.0).unwrap();

        ctx.pop_frame();
        assert_eq!(ctx.get_variable("x"), Some(Value::Number(1.0)));
        assert_eq!(ctx.get_variable("y"), Some(Value::Number(2.0)));
        assert!(ctx.pop_frame().is_none());
        assert_eq!(ctx.frame_count(), 1);
    }

    #[test]
    fn test_depth_guard() {
        let mut ctx = context_with(EngineConfig {
            max_depth: 3,
            ..EngineConfig::default()
        });

        for _ in 0..3 {
            ctx.enter_scope().unwrap();
        }
        let err = ctx.enter_scope().unwrap_err();
        assert_eq!(err, ScriptError::DepthExceeded { depth: 4, max: 3 });
        assert_eq!(ctx.depth(), 3);

        ctx.exit_scope();
        ctx.exit_scope();
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.stats().max_depth_reached, 3);
    }

    #[test]
    fn test_trace_only_in_debug() {
        let mut ctx = context_with(EngineConfig {
            log_capacity: 2,
            ..EngineConfig::default()
        });
        ctx.trace(|| "hidden".into());
        assert!(ctx.execution_log().is_empty());

        ctx.set_debug(true);
        ctx.trace(|| "a".into());
        ctx.trace(|| "b".into());
        ctx.log(LogLevel::Warn, "c");

        let messages: Vec<_> = ctx.log_entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["b", "c"]);
        assert_eq!(ctx.stats().log_entries, 3);
    }

    #[test]
    fn test_interpolate() {
        let mut ctx = context();
        ctx.set_variable("name", "Alex").unwrap();
        ctx.set_variable("score", 3.0).unwrap();

        assert_eq!(ctx.interpolate("Hi {name}, score {score}!"), "Hi Alex, score 3!");
        assert_eq!(ctx.interpolate("{unknown} {} {name"), "{unknown} {} {name");
        assert_eq!(ctx.interpolate("weather: {system:weather}"), "weather: rain");
    }

    #[test]
    fn test_update_variable_scopes() {
        let mut ctx = context();
        ctx.globals().set("score", Value::Number(2.0));

        let double = |current: Option<&Value>| {
            Ok(Value::Number(current.and_then(Value::as_number).unwrap_or(0.0) * 2.0))
        };
        assert_eq!(ctx.update_variable("global:score", double).unwrap(), Value::Number(4.0));
        assert_eq!(ctx.globals().get("score"), Some(Value::Number(4.0)));

        // Unprefixed reads fall back to GLOBAL but write LOCAL
        assert_eq!(ctx.update_variable("score", double).unwrap(), Value::Number(8.0));
        assert_eq!(ctx.local("score"), Some(&Value::Number(8.0)));
        assert_eq!(ctx.globals().get("score"), Some(Value::Number(4.0)));

        let failed = ctx.update_variable("global:score", |_| Err(ScriptError::Operation("nope".into())));
        assert!(failed.is_err());
        assert_eq!(ctx.globals().get("score"), Some(Value::Number(4.0)));

        let err = ctx.update_variable("system:time", double).unwrap_err();
        assert!(matches!(err, ScriptError::ScopeViolation(_)));
    }

    #[test]
    fn test_swap_variables_across_scopes() {
        let mut ctx = context();
        ctx.set_variable("a", 1.0).unwrap();
        ctx.set_variable("global:b", 2.0).unwrap();

        ctx.swap_variables("a", "global:b").unwrap();
        assert_eq!(ctx.local("a"), Some(&Value::Number(2.0)));
        assert_eq!(ctx.globals().get("b"), Some(Value::Number(1.0)));

        ctx.swap_variables("global:b", "global:missing").unwrap();
        assert!(ctx.globals().get("b").is_none());
        assert_eq!(ctx.globals().get("missing"), Some(Value::Number(1.0)));
        assert_eq!(ctx.globals().len(), 1);

        assert!(ctx.swap_variables("a", "system:time").is_err());
        assert_eq!(ctx.local("a"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_global_updates_are_atomic_across_threads() {
        let globals = GlobalVariables::new();
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let globals = globals.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        globals
                            .update("n", |current| {
                                Ok(Value::Number(current.and_then(Value::as_number).unwrap_or(0.0) + 1.0))
                            })
                            .unwrap();
                        globals.swap("left", "right");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(globals.get("n"), Some(Value::Number(8000.0)));
        assert_eq!(globals.snapshot().len(), 1);
    }
}
