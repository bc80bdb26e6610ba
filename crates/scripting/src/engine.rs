//! Script execution engine
//!
//! Walks script → line → block and realizes the control blocks (IF, ELSE,
//! REPEAT, FUNCTION, CALL_FUNCTION). Nested bodies are pushed as frames onto
//! an explicit work stack, so script nesting never turns into host recursion;
//! the context's depth counter bounds how deep the stack may grow.

use crate::block::{params, BlockKind, CodeBlock, ErrorHandling};
use crate::condition::Condition;
use crate::context::{ExecutionContext, ExecutionStats};
use crate::error::{Result, ScriptError};
use crate::event::Trigger;
use crate::log::{LogEntry, LogLevel};
use crate::result::ExecutionResult;
use crate::runtime::Runtime;
use crate::script::{CodeScript, FunctionTable};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Result of one executed block
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutcome {
    pub kind: BlockKind,
    /// Scope depth the block ran at (0 for a line's own blocks)
    pub depth: usize,
    pub result: ExecutionResult,
}

/// What happened on one line
#[derive(Debug, Clone, PartialEq)]
pub struct LineReport {
    pub number: u32,
    pub name: String,
    pub outcomes: Vec<BlockOutcome>,
    /// A block with `errorHandling = STOP` failed and ended the line early
    pub stopped: bool,
}

/// Everything a finished run leaves behind
#[derive(Debug, Clone)]
pub struct RunReport {
    pub script: String,
    /// Lines that ran, in order; disabled and non-matching lines are absent
    pub lines: Vec<LineReport>,
    /// Fatal error that ended the run early
    pub aborted: Option<ScriptError>,
    pub stats: ExecutionStats,
    pub log: Vec<LogEntry>,
    /// LOCAL variables as the run left them
    pub locals: BTreeMap<String, Value>,
}

impl RunReport {
    /// Every block result, in execution order
    pub fn results(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.lines
            .iter()
            .flat_map(|line| line.outcomes.iter().map(|outcome| &outcome.result))
    }

    pub fn failures(&self) -> usize {
        self.results().filter(|result| result.is_error()).count()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn line(&self, number: u32) -> Option<&LineReport> {
        self.lines.iter().find(|line| line.number == number)
    }
}

/// Runs loaded scripts against a runtime
#[derive(Clone)]
pub struct ScriptEngine {
    runtime: Arc<Runtime>,
}

impl ScriptEngine {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Context for one run of `script`
    pub fn context(&self, script: &CodeScript, trigger: Trigger) -> ExecutionContext {
        script.context(self.runtime.clone(), trigger)
    }

    /// Run every line of `script` that reacts to the trigger
    pub fn run(&self, script: &CodeScript, trigger: Trigger) -> Result<RunReport> {
        self.run_in(script, self.context(script, trigger))
    }

    /// Run `script` in a prepared context (e.g. one with debug switched on)
    pub fn run_in(&self, script: &CodeScript, mut ctx: ExecutionContext) -> Result<RunReport> {
        if !script.is_loaded() {
            return Err(ScriptError::NotLoaded(script.name().to_string()));
        }

        let mut lines = Vec::new();
        let mut aborted = None;

        if script.is_enabled() {
            for line in script.lines() {
                if !line.is_enabled() || !line.runs_for(ctx.event()) {
                    ctx.trace(|| format!("line {} not run", line.number()));
                    continue;
                }

                ctx.trace(|| format!("line {} ({})", line.number(), line.name()));
                let run = run_blocks(line.blocks(), &mut ctx);
                lines.push(LineReport {
                    number: line.number(),
                    name: line.name().to_string(),
                    outcomes: run.outcomes,
                    stopped: run.stopped,
                });

                if let Some(err) = run.fatal {
                    tracing::warn!("Script {} aborted on line {}: {}", script.name(), line.number(), err);
                    ctx.log(LogLevel::Error, format!("run aborted: {}", err));
                    aborted = Some(err);
                    break;
                }
            }
        } else {
            ctx.trace(|| format!("script {} is disabled", script.name()));
        }

        let locals = ctx.locals();
        let (stats, log) = ctx.finish();
        let report = RunReport {
            script: script.name().to_string(),
            lines,
            aborted,
            stats,
            log,
            locals,
        };
        script.record_run(&report);
        Ok(report)
    }
}

/// Execute a control block on its own
///
/// An ELSE run this way has no IF to pair with and is skipped.
pub(crate) fn execute_control(block: &CodeBlock, ctx: &mut ExecutionContext) -> ExecutionResult {
    let start = ctx.depth();
    let run = run_blocks(std::slice::from_ref(block), ctx);
    if let Some(err) = run.fatal {
        return ExecutionResult::error(err);
    }
    run.outcomes
        .into_iter()
        .rev()
        .find(|outcome| outcome.depth == start)
        .map(|outcome| outcome.result)
        .unwrap_or_else(ExecutionResult::success)
}

/// Work-stack entry
enum Frame<'a> {
    /// Blocks of one body, run in order from `next`
    Body {
        blocks: &'a [CodeBlock],
        next: usize,
        /// Whether finishing the body leaves a depth scope
        scoped: bool,
    },
    /// A REPEAT between iterations
    Repeat {
        block: &'a CodeBlock,
        iteration: u64,
        max: u64,
    },
    /// A function body in progress; owns a LOCAL frame and a depth scope
    Call {
        block: &'a CodeBlock,
        last: Option<ExecutionResult>,
    },
}

impl Frame<'_> {
    /// Undo what entering this frame did to the context
    fn leave(&self, ctx: &mut ExecutionContext) {
        match self {
            Frame::Body { scoped: true, .. } => ctx.exit_scope(),
            Frame::Body { scoped: false, .. } | Frame::Repeat { .. } => {}
            Frame::Call { .. } => {
                ctx.pop_frame();
                ctx.exit_scope();
            }
        }
    }
}

/// What a sequence of blocks produced
struct BodyRun {
    outcomes: Vec<BlockOutcome>,
    stopped: bool,
    fatal: Option<ScriptError>,
}

/// Whether to keep going after a block
enum Flow {
    Continue,
    /// Abort the rest of the line, enclosing bodies included
    Stop,
    /// Abort the whole run
    Fatal(ScriptError),
}

struct Runner<'a> {
    stack: Vec<Frame<'a>>,
    functions: &'a FunctionTable,
    outcomes: Vec<BlockOutcome>,
}

fn run_blocks(blocks: &[CodeBlock], ctx: &mut ExecutionContext) -> BodyRun {
    // Function bodies are borrowed from this handle for the whole run
    let functions = ctx.functions().clone();
    let mut runner = Runner {
        stack: vec![Frame::Body {
            blocks,
            next: 0,
            scoped: false,
        }],
        functions: functions.as_ref(),
        outcomes: Vec::new(),
    };

    let mut stopped = false;
    let mut fatal = None;

    while let Some(flow) = runner.step(ctx) {
        match flow {
            Flow::Continue => {}
            Flow::Stop => {
                stopped = true;
                runner.unwind(ctx);
            }
            Flow::Fatal(err) => {
                fatal = Some(err);
                runner.unwind(ctx);
            }
        }
    }

    BodyRun {
        outcomes: runner.outcomes,
        stopped,
        fatal,
    }
}

impl<'a> Runner<'a> {
    /// Advance the innermost frame by one step; `None` once the stack is empty
    fn step(&mut self, ctx: &mut ExecutionContext) -> Option<Flow> {
        let frame = self.stack.last_mut()?;

        let flow = match frame {
            Frame::Body { blocks, next, .. } => {
                let blocks: &'a [CodeBlock] = *blocks;
                match blocks.get(*next) {
                    Some(block) => {
                        let index = *next;
                        *next += 1;
                        self.run_block(blocks, index, block, ctx)
                    }
                    None => {
                        self.pop(ctx);
                        Flow::Continue
                    }
                }
            }
            Frame::Repeat { block, iteration, max } => {
                let block: &'a CodeBlock = *block;
                if *iteration >= *max || !loop_condition(block, ctx) {
                    let done = *iteration;
                    self.pop(ctx);
                    self.finish(block, ExecutionResult::success_with(format!("{} iterations", done)), ctx)
                } else {
                    let index = *iteration;
                    *iteration += 1;
                    self.enter_iteration(block, index, ctx)
                }
            }
            Frame::Call { block, last } => {
                let block: &'a CodeBlock = *block;
                let result = last.take().unwrap_or_else(ExecutionResult::success);
                self.pop(ctx);
                self.finish(block, result, ctx)
            }
        };
        Some(flow)
    }

    fn run_block(
        &mut self,
        siblings: &'a [CodeBlock],
        index: usize,
        block: &'a CodeBlock,
        ctx: &mut ExecutionContext,
    ) -> Flow {
        ctx.trace(|| format!("{} block {}", block.kind(), index + 1));

        match block.kind() {
            BlockKind::If => {
                let paired_else = siblings.get(index + 1).filter(|next| next.kind() == BlockKind::Else);
                if paired_else.is_some() {
                    // The ELSE is consumed together with its IF
                    self.skip_next();
                }

                if block.condition_passes(ctx) {
                    self.branch(block, "then", block.body(), ctx)
                } else if let Some(else_block) = paired_else {
                    self.branch(block, "else", else_block.body(), ctx)
                } else {
                    self.finish(block, ExecutionResult::skipped(), ctx)
                }
            }
            BlockKind::Else => {
                ctx.log(LogLevel::Warn, "ELSE without a preceding IF skipped");
                self.finish(block, ExecutionResult::skipped(), ctx)
            }
            BlockKind::Repeat => {
                let config = ctx.runtime().config();
                let max = match block.parameters().integer(params::MAX_ITERATIONS) {
                    Some(n) => (n.max(0) as u64).min(config.max_iterations_cap),
                    None => config.default_max_iterations,
                };
                self.stack.push(Frame::Repeat {
                    block,
                    iteration: 0,
                    max,
                });
                Flow::Continue
            }
            BlockKind::Function => {
                let name = block.function_name().unwrap_or_default();
                self.finish(block, ExecutionResult::success_with(format!("declared {}", name)), ctx)
            }
            BlockKind::CallFunction => self.call_function(block, ctx),
            _ => {
                let result = block.execute_action(ctx);
                self.finish(block, result, ctx)
            }
        }
    }

    fn call_function(&mut self, block: &'a CodeBlock, ctx: &mut ExecutionContext) -> Flow {
        if !block.condition_passes(ctx) {
            return self.finish(block, ExecutionResult::skipped(), ctx);
        }

        let name = block.parameters().text(params::FUNCTION).unwrap_or_default();
        let functions: &'a FunctionTable = self.functions;
        let Some(def) = functions.get(&name) else {
            let err = ScriptError::Operation(format!("unknown function '{}'", name.trim()));
            return self.finish(block, ExecutionResult::error(err), ctx);
        };

        if let Err(err) = ctx.enter_scope() {
            return Flow::Fatal(err);
        }

        let bindings: HashMap<String, Value> = block
            .parameters()
            .with_prefix(params::ARG_PREFIX)
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, value)| {
                let value = match value {
                    Value::Text(text) => Value::Text(ctx.interpolate(text)),
                    other => other.clone(),
                };
                (name.to_string(), value)
            })
            .collect();
        ctx.push_frame(bindings);
        ctx.trace(|| format!("call {}", def.name));

        self.stack.push(Frame::Call { block, last: None });
        self.stack.push(Frame::Body {
            blocks: &def.body,
            next: 0,
            scoped: false,
        });
        Flow::Continue
    }

    fn enter_iteration(&mut self, block: &'a CodeBlock, index: u64, ctx: &mut ExecutionContext) -> Flow {
        if let Err(err) = ctx.enter_scope() {
            return Flow::Fatal(err);
        }
        if let Some(var) = block.parameters().text(params::INDEX_VARIABLE) {
            if let Err(err) = ctx.set_variable(var.trim(), index as f64) {
                ctx.log(LogLevel::Error, format!("REPEAT index: {}", err));
            }
        }
        self.stack.push(Frame::Body {
            blocks: block.body(),
            next: 0,
            scoped: true,
        });
        Flow::Continue
    }

    /// Enter the chosen body of an IF; the IF itself is recorded at its own depth
    fn branch(
        &mut self,
        block: &CodeBlock,
        label: &str,
        body: &'a [CodeBlock],
        ctx: &mut ExecutionContext,
    ) -> Flow {
        let depth = ctx.depth();
        if let Err(err) = ctx.enter_scope() {
            return Flow::Fatal(err);
        }
        self.record(block, ExecutionResult::success_with(label), depth, ctx);
        self.stack.push(Frame::Body {
            blocks: body,
            next: 0,
            scoped: true,
        });
        Flow::Continue
    }

    /// Record a block's result and decide how the line goes on
    fn finish(&mut self, block: &CodeBlock, result: ExecutionResult, ctx: &mut ExecutionContext) -> Flow {
        let flow = match &result {
            ExecutionResult::Error(err) if err.is_fatal() => Flow::Fatal(err.clone()),
            ExecutionResult::Error(err) => {
                ctx.log(LogLevel::Error, format!("{}: {}", block.kind(), err));
                match block.error_handling() {
                    ErrorHandling::Stop => Flow::Stop,
                    ErrorHandling::Continue => Flow::Continue,
                }
            }
            ExecutionResult::Success(_) => Flow::Continue,
        };
        let depth = ctx.depth();
        self.record(block, result, depth, ctx);
        flow
    }

    fn record(&mut self, block: &CodeBlock, result: ExecutionResult, depth: usize, ctx: &mut ExecutionContext) {
        ctx.record_block(result.is_success());

        // The innermost function call reports the last result of its body
        if let Some(last) = self.stack.iter_mut().rev().find_map(|frame| match frame {
            Frame::Call { last, .. } => Some(last),
            _ => None,
        }) {
            *last = Some(result.clone());
        }

        self.outcomes.push(BlockOutcome {
            kind: block.kind(),
            depth,
            result,
        });
    }

    fn skip_next(&mut self) {
        if let Some(Frame::Body { next, .. }) = self.stack.last_mut() {
            *next += 1;
        }
    }

    fn pop(&mut self, ctx: &mut ExecutionContext) {
        if let Some(frame) = self.stack.pop() {
            frame.leave(ctx);
        }
    }

    /// Drop every pending frame, leaving scopes and LOCAL frames balanced
    fn unwind(&mut self, ctx: &mut ExecutionContext) {
        while let Some(frame) = self.stack.pop() {
            frame.leave(ctx);
        }
    }
}

/// REPEAT keeps going while its `condition` holds (absent means always)
fn loop_condition(block: &CodeBlock, ctx: &ExecutionContext) -> bool {
    block
        .condition()
        .map(|raw| Condition::parse(&raw).evaluate(ctx))
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{BufferedSink, Collaborators, RecordingEffects};
    use crate::event::EventType;
    use crate::line::CodeLine;
    use crate::system::HostSystemVariables;
    use crate::testing::Harness;
    use housing_config::EngineConfig;

    fn set(target: &str, value: impl Into<Value>) -> CodeBlock {
        CodeBlock::action(BlockKind::Variable, "SET", target).with_param(params::VALUE, value)
    }

    fn increment(target: &str) -> CodeBlock {
        CodeBlock::action(BlockKind::Variable, "INCREMENT", target)
    }

    fn failing() -> CodeBlock {
        CodeBlock::action(BlockKind::Variable, "DIVIDE", "x").with_param(params::VALUE, 0.0)
    }

    fn repeat(max: f64, body: Vec<CodeBlock>) -> CodeBlock {
        CodeBlock::new(BlockKind::Repeat)
            .with_param(params::MAX_ITERATIONS, max)
            .with_body(body)
    }

    fn call(name: &str) -> CodeBlock {
        CodeBlock::new(BlockKind::CallFunction).with_param(params::FUNCTION, name)
    }

    fn function(name: &str, body: Vec<CodeBlock>) -> CodeBlock {
        CodeBlock::new(BlockKind::Function)
            .with_param(params::NAME, name)
            .with_body(body)
    }

    fn script_of(lines: Vec<Vec<CodeBlock>>) -> CodeScript {
        let mut script = CodeScript::new("test");
        for (i, blocks) in lines.into_iter().enumerate() {
            let line = script.add_line(format!("line {}", i + 1));
            for block in blocks {
                line.push_block(block);
            }
        }
        script.load().unwrap();
        script
    }

    fn run(harness: &Harness, script: &CodeScript) -> RunReport {
        ScriptEngine::new(harness.runtime.clone())
            .run(script, Trigger::manual().by("alex"))
            .unwrap()
    }

    #[test]
    fn test_set_then_add_in_local_scope() {
        let harness = Harness::new();
        let script = script_of(vec![vec![
            set("x", 5.0),
            CodeBlock::action(BlockKind::Variable, "ADD", "x").with_param(params::VALUE, 3.0),
        ]]);

        let report = run(&harness, &script);
        assert_eq!(report.locals.get("x"), Some(&Value::Number(8.0)));
        assert!(script.globals().is_empty());
        assert_eq!(report.failures(), 0);
    }

    #[test]
    fn test_unloaded_script_is_rejected() {
        let harness = Harness::new();
        let mut script = CodeScript::new("draft");
        script.add_line("main").push_block(set("x", 1.0));

        let engine = ScriptEngine::new(harness.runtime.clone());
        let err = engine.run(&script, Trigger::manual()).unwrap_err();
        assert_eq!(err, ScriptError::NotLoaded("draft".into()));
    }

    #[test]
    fn test_continue_and_stop() {
        let harness = Harness::new();
        let script = script_of(vec![
            vec![failing(), set("after_continue", true)],
            vec![
                failing().with_param(params::ERROR_HANDLING, "STOP"),
                set("after_stop", true),
            ],
            vec![set("sibling", true)],
        ]);

        let report = run(&harness, &script);
        assert!(report.locals.contains_key("after_continue"));
        assert!(!report.locals.contains_key("after_stop"));
        assert!(report.locals.contains_key("sibling"));
        assert!(report.line(2).unwrap().stopped);
        assert!(!report.line(1).unwrap().stopped);
        assert_eq!(report.failures(), 2);
        assert!(!report.is_aborted());
    }

    #[test]
    fn test_stop_aborts_enclosing_bodies() {
        let harness = Harness::new();
        let script = script_of(vec![vec![
            repeat(
                5.0,
                vec![
                    increment("n"),
                    CodeBlock::new(BlockKind::If).with_body(vec![
                        failing().with_param(params::ERROR_HANDLING, "STOP"),
                    ]),
                ],
            ),
            set("after", true),
        ]]);

        let report = run(&harness, &script);
        assert_eq!(report.locals.get("n"), Some(&Value::Number(1.0)));
        assert!(!report.locals.contains_key("after"));
        assert_eq!(report.stats.max_depth_reached, 2);
    }

    #[test]
    fn test_if_else_pairing() {
        let harness = Harness::new();
        let branch = |condition: &str| {
            vec![
                CodeBlock::new(BlockKind::If)
                    .with_param(params::CONDITION, condition)
                    .with_body(vec![set("branch", "then")]),
                CodeBlock::new(BlockKind::Else).with_body(vec![set("branch", "else")]),
                increment("after"),
            ]
        };

        let report = run(&harness, &script_of(vec![branch("true")]));
        assert_eq!(report.locals.get("branch"), Some(&Value::from("then")));
        assert_eq!(report.locals.get("after"), Some(&Value::Number(1.0)));

        let report = run(&harness, &script_of(vec![branch("false")]));
        assert_eq!(report.locals.get("branch"), Some(&Value::from("else")));
        assert_eq!(report.locals.get("after"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_if_without_else() {
        let harness = Harness::new();
        let script = script_of(vec![vec![
            set("door", "open"),
            CodeBlock::new(BlockKind::If)
                .with_param(params::CONDITION, "door==closed")
                .with_body(vec![set("knocked", true)]),
            CodeBlock::new(BlockKind::If)
                .with_param(params::CONDITION, "exists:door")
                .with_body(vec![set("entered", true)]),
        ]]);

        let report = run(&harness, &script);
        assert!(!report.locals.contains_key("knocked"));
        assert!(report.locals.contains_key("entered"));
    }

    #[test]
    fn test_repeat_runs_exactly_max_iterations() {
        let harness = Harness::new();
        let script = script_of(vec![vec![repeat(7.0, vec![increment("n")])
            .with_param(params::CONDITION, "true")
            .with_param(params::INDEX_VARIABLE, "i")]]);

        let report = run(&harness, &script);
        assert_eq!(report.locals.get("n"), Some(&Value::Number(7.0)));
        assert_eq!(report.locals.get("i"), Some(&Value::Number(6.0)));
    }

    #[test]
    fn test_repeat_stops_when_condition_fails() {
        let harness = Harness::new();
        let body = vec![
            increment("n"),
            CodeBlock::new(BlockKind::If)
                .with_param(params::CONDITION, "n==3")
                .with_body(vec![set("done", "yes")]),
        ];
        let script = script_of(vec![vec![repeat(100.0, body).with_param(params::CONDITION, "done==no")]]);
        script.globals().set("done", Value::from("no"));

        let report = run(&harness, &script);
        assert_eq!(report.locals.get("n"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_repeat_bounds_come_from_config() {
        let harness = Harness::with_config(EngineConfig {
            default_max_iterations: 4,
            max_iterations_cap: 10,
            ..EngineConfig::default()
        });
        let unbounded = CodeBlock::new(BlockKind::Repeat).with_body(vec![increment("a")]);
        let huge = repeat(1_000_000.0, vec![increment("b")]);
        let zero = repeat(0.0, vec![increment("c")]);

        let report = run(&harness, &script_of(vec![vec![unbounded, huge, zero]]));
        assert_eq!(report.locals.get("a"), Some(&Value::Number(4.0)));
        assert_eq!(report.locals.get("b"), Some(&Value::Number(10.0)));
        assert!(report.locals.get("c").is_none());
    }

    #[test]
    fn test_call_function_with_arguments() {
        let harness = Harness::new();
        let script = script_of(vec![
            vec![function(
                "greet",
                vec![
                    CodeBlock::action(BlockKind::Variable, "APPEND", "global:log")
                        .with_param(params::VALUE, "{who};"),
                    set("x", "inside"),
                ],
            )],
            vec![
                set("x", "outside"),
                set("name", "sam"),
                call("greet").with_param("arg.who", "{name}"),
                call("greet").with_param("arg.who", "kim"),
            ],
        ]);

        let report = run(&harness, &script);
        assert_eq!(script.globals().get("log"), Some(Value::from("sam;kim;")));
        // The function wrote its own frame, not the caller's
        assert_eq!(report.locals.get("x"), Some(&Value::from("outside")));
        assert!(!report.locals.contains_key("who"));

        let line = report.line(2).unwrap();
        let call_result = &line.outcomes.iter().find(|o| o.kind == BlockKind::CallFunction).unwrap().result;
        assert_eq!(call_result.message().as_deref(), Some("x = inside"));
    }

    #[test]
    fn test_unknown_function_is_operation_error() {
        let harness = Harness::new();
        let script = script_of(vec![vec![set("x", 1.0), call("missing")]]);

        let report = run(&harness, &script);
        let result = report.results().last().unwrap();
        assert!(matches!(result.as_error(), Some(ScriptError::Operation(_))));
        assert!(script.globals().is_empty());
        assert_eq!(report.locals.len(), 1);
        assert_eq!(report.stats.max_depth_reached, 0);
    }

    #[test]
    fn test_depth_exceeded_at_max_plus_one() {
        let max = 4;
        let harness = Harness::with_config(EngineConfig {
            max_depth: max,
            ..EngineConfig::default()
        });

        // max + 1 nested IF bodies, innermost sets a flag
        let mut block = CodeBlock::new(BlockKind::If).with_body(vec![set("deepest", true)]);
        for _ in 0..max {
            block = CodeBlock::new(BlockKind::If).with_body(vec![increment("levels"), block]);
        }
        let script = script_of(vec![vec![block], vec![set("next_line", true)]]);

        let report = run(&harness, &script);
        assert_eq!(
            report.aborted,
            Some(ScriptError::DepthExceeded { depth: max + 1, max })
        );
        assert_eq!(report.locals.get("levels"), Some(&Value::Number(max as f64)));
        assert!(!report.locals.contains_key("deepest"));
        assert!(!report.locals.contains_key("next_line"));
        assert_eq!(report.stats.max_depth_reached, max);
    }

    #[test]
    fn test_depth_guard_bounds_recursion() {
        let harness = Harness::with_config(EngineConfig {
            max_depth: 16,
            ..EngineConfig::default()
        });
        let script = script_of(vec![vec![function(
            "forever",
            vec![increment("global:calls"), call("forever")],
        )], vec![call("forever")]]);

        let report = run(&harness, &script);
        assert!(matches!(report.aborted, Some(ScriptError::DepthExceeded { depth: 17, max: 16 })));
        assert_eq!(script.globals().get("calls"), Some(Value::Number(16.0)));
    }

    #[test]
    fn test_disabled_line_has_no_effect() {
        let harness = Harness::new();
        let mut script = script_of(vec![
            vec![set("global:a", 1.0)],
            vec![set("global:b", 2.0), increment("global:a")],
        ]);
        script.line_mut(2).unwrap().set_enabled(false);
        script.load().unwrap();

        let report = run(&harness, &script);
        assert!(report.line(2).is_none());
        assert_eq!(report.results().count(), 1);
        assert_eq!(script.globals().get("a"), Some(Value::Number(1.0)));
        assert!(script.globals().get("b").is_none());
    }

    #[test]
    fn test_lines_follow_trigger() {
        let harness = Harness::new();
        let mut script = CodeScript::new("events");
        let join = script.add_line("join");
        join.set_trigger(Some(EventType::PlayerJoin));
        join.push_block(increment("global:joins"));
        script.add_line("always").push_block(increment("global:events"));
        script.load().unwrap();

        let engine = ScriptEngine::new(harness.runtime.clone());
        engine.run(&script, Trigger::new(EventType::PlayerJoin).by("alex")).unwrap();
        engine.run(&script, Trigger::new(EventType::PlayerQuit).by("alex")).unwrap();

        assert_eq!(script.globals().get("joins"), Some(Value::Number(1.0)));
        assert_eq!(script.globals().get("events"), Some(Value::Number(2.0)));
        assert_eq!(script.stats().runs, 2);
    }

    #[test]
    fn test_globals_persist_and_locals_do_not() {
        let harness = Harness::new();
        let script = script_of(vec![vec![increment("global:visits"), increment("local_count")]]);

        run(&harness, &script);
        let report = run(&harness, &script);
        assert_eq!(script.globals().get("visits"), Some(Value::Number(2.0)));
        assert_eq!(report.locals.get("local_count"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_disabled_script_runs_nothing() {
        let harness = Harness::new();
        let mut script = script_of(vec![vec![increment("global:n")]]);
        script.set_enabled(false);

        let report = run(&harness, &script);
        assert!(report.lines.is_empty());
        assert!(script.globals().is_empty());
    }

    #[test]
    fn test_debug_log_records_transitions() {
        let harness = Harness::new();
        let script = script_of(vec![vec![repeat(2.0, vec![increment("n")])]]);
        let engine = ScriptEngine::new(harness.runtime.clone());

        let ctx = engine.context(&script, Trigger::manual()).with_debug(true);
        let report = engine.run_in(&script, ctx).unwrap();

        let traces = report.log.iter().filter(|e| e.level == LogLevel::Trace).count();
        assert!(traces >= 4, "expected transitions in the log, got {:?}", report.log);
        assert!(report.log.iter().any(|e| e.depth == 1));
    }

    #[test]
    fn test_effect_failure_stays_inside_block() {
        let effects = Arc::new(RecordingEffects::new());
        effects.fail_on("give_item");
        let collaborators = Collaborators::new(
            effects.clone(),
            Arc::new(BufferedSink::new()),
            Arc::new(HostSystemVariables::new()),
        );
        let runtime = Runtime::start(EngineConfig::default(), collaborators);
        let script = script_of(vec![vec![
            CodeBlock::action(BlockKind::Item, "GIVE", "").with_param(params::VALUE, "DIAMOND"),
            increment("after"),
        ]]);

        let report = ScriptEngine::new(runtime)
            .run(&script, Trigger::manual().by("alex"))
            .unwrap();
        let first = report.results().next().unwrap();
        assert!(matches!(first.as_error(), Some(ScriptError::Effect(_))));
        assert_eq!(report.locals.get("after"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_control_block_executes_standalone() {
        let harness = Harness::new();
        let mut ctx = harness.context();

        let result = repeat(3.0, vec![increment("n")]).execute(&mut ctx);
        assert_eq!(result.message().as_deref(), Some("3 iterations"));
        assert_eq!(ctx.get_variable("n"), Some(Value::Number(3.0)));
        assert_eq!(ctx.depth(), 0);

        assert!(call("nothing").execute(&mut ctx).is_error());
        assert!(CodeBlock::new(BlockKind::Else).execute(&mut ctx).is_skipped());
    }

    #[test]
    fn test_line_loading_is_all_or_nothing() {
        let mut script = CodeScript::new("bad");
        script.push_line(CodeLine::new(1, "ok").with_block(set("x", 1.0)));
        script.push_line(CodeLine::new(2, "orphan").with_block(CodeBlock::new(BlockKind::Else)));
        assert!(script.load().is_err());

        let harness = Harness::new();
        let engine = ScriptEngine::new(harness.runtime.clone());
        assert!(engine.run(&script, Trigger::manual()).is_err());
        assert_eq!(harness.runtime.statistics().total(), 0);
    }

    #[test]
    fn test_nested_repeat_depth_exceeded() {
        let max = 4;
        let harness = Harness::with_config(EngineConfig {
            max_depth: max,
            ..EngineConfig::default()
        });

        // max + 1 nested single-iteration REPEATs, innermost sets a flag
        let mut block = repeat(1.0, vec![set("deepest", true)]);
        for _ in 0..max {
            block = repeat(1.0, vec![increment("levels"), block]);
        }
        let script = script_of(vec![vec![block], vec![set("next_line", true)]]);

        let report = run(&harness, &script);
        assert_eq!(
            report.aborted,
            Some(ScriptError::DepthExceeded { depth: max + 1, max })
        );
        assert_eq!(report.locals.get("levels"), Some(&Value::Number(max as f64)));
        assert!(!report.locals.contains_key("deepest"));
        assert!(!report.locals.contains_key("next_line"));
        assert_eq!(report.stats.max_depth_reached, max);
    }

    #[test]
    fn test_concurrent_runs_share_globals_and_isolate_locals() {
        let harness = Harness::new();
        let script = script_of(vec![vec![
            repeat(500.0, vec![increment("global:n"), increment("mine")]),
            CodeBlock::action(BlockKind::Variable, "APPEND", "global:seen").with_param(params::VALUE, "x"),
            CodeBlock::action(BlockKind::Variable, "PUSH", "global:runs").with_param(params::VALUE, 1.0),
        ]]);
        let engine = ScriptEngine::new(harness.runtime.clone());

        let reports: Vec<RunReport> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let engine = engine.clone();
                    let script = &script;
                    scope.spawn(move || engine.run(script, Trigger::manual()).unwrap())
                })
                .collect();
            workers.into_iter().map(|worker| worker.join().unwrap()).collect()
        });

        assert_eq!(script.globals().get("n"), Some(Value::Number(4000.0)));
        assert_eq!(script.globals().get("seen"), Some(Value::from("xxxxxxxx")));
        match script.globals().get("runs") {
            Some(Value::List(items)) => assert_eq!(items.len(), 8),
            other => panic!("expected a list, got {:?}", other),
        }
        for report in &reports {
            assert_eq!(report.failures(), 0);
            assert_eq!(report.locals.get("mine"), Some(&Value::Number(500.0)));
        }
        assert_eq!(script.stats().runs, 8);
    }

    #[test]
    fn test_warnings_and_errors_reach_message_sink() {
        let harness = Harness::new();
        let script = script_of(vec![vec![
            failing(),
            set("x", 1.0).with_param(params::LOG, true),
            set("y", 2.0),
        ]]);

        run(&harness, &script);

        let lines = harness.sink.lines();
        assert!(lines
            .iter()
            .any(|line| line.starts_with("[Error]") && line.contains("DIVIDE by zero")));
        assert!(lines.iter().any(|line| line.starts_with("[Info]") && line.contains("'x'")));
        assert!(!lines.iter().any(|line| line.contains("'y'")));
    }
}
