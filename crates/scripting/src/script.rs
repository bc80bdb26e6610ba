//! Code scripts
//!
//! A [`CodeScript`] is what the editor builds and the engine runs: ordered
//! lines, the GLOBAL store shared by its runs and the function table built
//! when the script is loaded.

use crate::block::{BlockKind, CodeBlock};
use crate::context::{ExecutionContext, GlobalVariables};
use crate::engine::RunReport;
use crate::error::{Result, ScriptError};
use crate::event::Trigger;
use crate::line::CodeLine;
use crate::runtime::Runtime;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A FUNCTION block's body, collected at load
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    /// Line the declaration sits on
    pub line: u32,
    pub body: Vec<CodeBlock>,
}

/// Functions declared anywhere in a script, by name
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, FunctionDef>,
}

impl FunctionTable {
    /// Collect every FUNCTION block, nested ones included
    ///
    /// Declaring a name twice is a validation error.
    pub fn collect(lines: &[CodeLine]) -> Result<Self> {
        let mut table = Self::default();
        for line in lines {
            let mut pending: Vec<&CodeBlock> = line.blocks().iter().collect();
            while let Some(block) = pending.pop() {
                if let Some(name) = block.function_name() {
                    table.declare(FunctionDef {
                        name,
                        line: line.number(),
                        body: block.body().to_vec(),
                    })?;
                }
                pending.extend(block.body());
            }
        }
        Ok(table)
    }

    fn declare(&mut self, def: FunctionDef) -> Result<()> {
        if let Some(existing) = self.functions.get(&def.name) {
            return Err(ScriptError::Validation(format!(
                "function '{}' declared on line {} and line {}",
                def.name, existing.line, def.line
            )));
        }
        self.functions.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name.trim())
    }

    /// Declared names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Aggregate numbers over every run of a script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptStats {
    pub runs: u64,
    /// Runs ended early by a fatal error
    pub aborted_runs: u64,
    pub blocks_executed: u64,
    pub blocks_failed: u64,
    pub max_depth_reached: usize,
    pub total_elapsed: Duration,
    pub last_elapsed: Duration,
}

/// An editable, loadable script
#[derive(Debug, Serialize, Deserialize)]
pub struct CodeScript {
    name: String,
    enabled: bool,
    #[serde(default)]
    lines: Vec<CodeLine>,

    #[serde(skip)]
    loaded: bool,
    #[serde(skip)]
    globals: GlobalVariables,
    #[serde(skip)]
    functions: Arc<FunctionTable>,
    #[serde(skip)]
    stats: Mutex<ScriptStats>,
}

impl CodeScript {
    /// Create an empty, enabled script
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            lines: Vec::new(),
            loaded: false,
            globals: GlobalVariables::new(),
            functions: Arc::new(FunctionTable::default()),
            stats: Mutex::new(ScriptStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Append a new line and return it for editing
    pub fn add_line(&mut self, name: impl Into<String>) -> &mut CodeLine {
        self.loaded = false;
        let number = self.lines.len() as u32 + 1;
        self.lines.push(CodeLine::new(number, name));
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }

    /// Append a prepared line, renumbering it to the end of the script
    pub fn push_line(&mut self, mut line: CodeLine) -> u32 {
        self.loaded = false;
        let number = self.lines.len() as u32 + 1;
        line.set_number(number);
        self.lines.push(line);
        number
    }

    /// Remove a line; later lines move up so numbering stays contiguous
    pub fn remove_line(&mut self, number: u32) -> Option<CodeLine> {
        let index = self.index_of(number)?;
        self.loaded = false;
        let removed = self.lines.remove(index);
        self.renumber();
        Some(removed)
    }

    pub fn line(&self, number: u32) -> Option<&CodeLine> {
        self.index_of(number).map(|index| &self.lines[index])
    }

    /// Mutable access for the editor; the script must be loaded again afterwards
    pub fn line_mut(&mut self, number: u32) -> Option<&mut CodeLine> {
        let index = self.index_of(number)?;
        self.loaded = false;
        Some(&mut self.lines[index])
    }

    pub fn lines(&self) -> &[CodeLine] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn index_of(&self, number: u32) -> Option<usize> {
        let index = (number as usize).checked_sub(1)?;
        (index < self.lines.len()).then_some(index)
    }

    fn renumber(&mut self) {
        for (index, line) in self.lines.iter_mut().enumerate() {
            line.set_number(index as u32 + 1);
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Validate every block and build the function table
    ///
    /// Any failure rejects the whole load and leaves the script unloaded.
    pub fn load(&mut self) -> Result<()> {
        self.loaded = false;

        for line in &self.lines {
            line.validate()?;
        }
        let functions = FunctionTable::collect(&self.lines)?;

        tracing::debug!(
            "Loaded script {} ({} lines, {} functions)",
            self.name,
            self.lines.len(),
            functions.len()
        );
        self.functions = Arc::new(functions);
        self.loaded = true;
        Ok(())
    }

    /// Drop every line, global, function and statistic
    pub fn reset(&mut self) {
        self.lines.clear();
        self.globals.clear();
        self.functions = Arc::new(FunctionTable::default());
        *self.stats.lock() = ScriptStats::default();
        self.loaded = false;
    }

    pub fn globals(&self) -> &GlobalVariables {
        &self.globals
    }

    pub fn functions(&self) -> &Arc<FunctionTable> {
        &self.functions
    }

    /// Context for one run of this script
    pub fn context(&self, runtime: Arc<Runtime>, trigger: Trigger) -> ExecutionContext {
        ExecutionContext::new(runtime, self.globals.clone())
            .with_functions(self.functions.clone())
            .with_event(trigger.event)
            .with_player(trigger.player)
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn stats(&self) -> ScriptStats {
        self.stats.lock().clone()
    }

    pub(crate) fn record_run(&self, report: &RunReport) {
        let mut stats = self.stats.lock();
        stats.runs += 1;
        if report.aborted.is_some() {
            stats.aborted_runs += 1;
        }
        stats.blocks_executed += report.stats.blocks_executed;
        stats.blocks_failed += report.stats.blocks_failed;
        stats.max_depth_reached = stats.max_depth_reached.max(report.stats.max_depth_reached);
        stats.total_elapsed += report.stats.elapsed;
        stats.last_elapsed = report.stats.elapsed;
    }

    /// Number of blocks of a kind anywhere in the script
    pub fn count_blocks(&self, kind: BlockKind) -> usize {
        let mut count = 0;
        for line in &self.lines {
            let mut pending: Vec<&CodeBlock> = line.blocks().iter().collect();
            while let Some(block) = pending.pop() {
                if block.kind() == kind {
                    count += 1;
                }
                pending.extend(block.body());
            }
        }
        count
    }
}
