//! # Scripting Runtime
//!
//! Process-wide state of the engine. A [`Runtime`] is created when the plugin
//! starts and shut down when it stops; every execution context holds an
//! `Arc` to it.

use crate::block::BlockKind;
use crate::effects::{Collaborators, EffectHandler, EffectRequest, MessageSink};
use crate::error::{Result, ScriptError};
use crate::registry::{OperationId, OperationRegistry};
use crate::system::SystemVariables;
use crate::value::Value;
use dashmap::DashMap;
use housing_config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

/// Scripting runtime
///
/// # Purpose
/// Owns the operation registry, the usage counters, the backup store, the
/// item template registry and the host collaborators.
///
/// # Thread Safety
/// Shared across concurrent runs; every map is a `DashMap`.
pub struct Runtime {
    config: EngineConfig,
    registry: OperationRegistry,
    statistics: UsageStatistics,
    backups: BackupStore,
    templates: TemplateRegistry,

    effects: Arc<dyn EffectHandler>,
    messages: Arc<dyn MessageSink>,
    system: Arc<dyn SystemVariables>,

    running: AtomicBool,
    started: Instant,
}

impl Runtime {
    /// Start a runtime
    ///
    /// # Arguments
    /// * `config` - Engine configuration
    /// * `collaborators` - Host seams for effects, messages and system variables
    ///
    /// # Returns
    /// A shared handle, ready to execute scripts
    pub fn start(config: EngineConfig, collaborators: Collaborators) -> Arc<Self> {
        let registry = OperationRegistry::with_builtins();
        tracing::info!(
            "Scripting runtime started ({} operations, max depth {})",
            registry.len(),
            config.max_depth
        );

        Arc::new(Self {
            config,
            registry,
            statistics: UsageStatistics::new(),
            backups: BackupStore::new(),
            templates: TemplateRegistry::new(),
            effects: collaborators.effects,
            messages: collaborators.messages,
            system: collaborators.system,
            running: AtomicBool::new(true),
            started: Instant::now(),
        })
    }

    /// Stop accepting effects and drop the per-target stores
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(
            "Scripting runtime stopped after {:?}: {} operations dispatched, {} backups, {} templates",
            self.started.elapsed(),
            self.statistics.total(),
            self.backups.len(),
            self.templates.len()
        );
        self.backups.clear();
        self.templates.clear();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn statistics(&self) -> &UsageStatistics {
        &self.statistics
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn messages(&self) -> &Arc<dyn MessageSink> {
        &self.messages
    }

    pub fn system(&self) -> &Arc<dyn SystemVariables> {
        &self.system
    }

    /// Hand an effect to the host
    ///
    /// Refusals, errors and panics of the handler all come back as
    /// [`ScriptError::Effect`].
    pub fn invoke_effect(&self, request: &EffectRequest) -> Result<()> {
        if !self.is_running() {
            return Err(ScriptError::Effect(format!(
                "{} rejected: runtime is shut down",
                request.operation
            )));
        }

        tracing::debug!("Effect {} -> {}", request.operation, request.target);
        match self.shielded(&request.operation, || self.effects.invoke(request))? {
            Ok(true) => Ok(()),
            Ok(false) => Err(ScriptError::Effect(format!(
                "{} on '{}' was refused by the host",
                request.operation, request.target
            ))),
            Err(message) => Err(ScriptError::Effect(message)),
        }
    }

    /// Run a collaborator call, turning a panic into an effect error
    pub fn shielded<T>(&self, what: &str, call: impl FnOnce() -> T) -> Result<T> {
        panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::warn!("Collaborator panicked during {}: {}", what, reason);
            ScriptError::Effect(format!("{} panicked: {}", what, reason))
        })
    }
}

/// Per-operation dispatch counters
///
/// Observability only; nothing reads these to make decisions.
#[derive(Debug, Default)]
pub struct UsageStatistics {
    counts: DashMap<(BlockKind, OperationId), AtomicU64>,
}

impl UsageStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: BlockKind, operation: OperationId) {
        if let Some(counter) = self.counts.get(&(kind, operation)) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counts
            .entry((kind, operation))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, kind: BlockKind, operation: OperationId) -> u64 {
        self.counts
            .get(&(kind, operation))
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .map(|entry| entry.value().load(Ordering::Relaxed))
            .sum()
    }

    /// Sorted copy of every non-zero counter
    pub fn snapshot(&self) -> Vec<(BlockKind, OperationId, u64)> {
        let mut rows: Vec<_> = self
            .counts
            .iter()
            .map(|entry| {
                let (kind, op) = *entry.key();
                (kind, op, entry.value().load(Ordering::Relaxed))
            })
            .collect();
        rows.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        rows
    }
}

/// Previous state of a target, saved before a block changed it
#[derive(Debug, Clone, PartialEq)]
pub struct BackupEntry {
    /// `None` when the target did not exist
    pub value: Option<Value>,
    pub saved_at: SystemTime,
}

/// Backups keyed by block kind and target id
#[derive(Debug, Default)]
pub struct BackupStore {
    entries: DashMap<(BlockKind, String), BackupEntry>,
}

impl BackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a target's previous value, replacing any older backup
    pub fn save(&self, kind: BlockKind, target: &str, value: Option<Value>) {
        self.entries.insert(
            (kind, target.to_string()),
            BackupEntry {
                value,
                saved_at: SystemTime::now(),
            },
        );
    }

    pub fn get(&self, kind: BlockKind, target: &str) -> Option<BackupEntry> {
        self.entries
            .get(&(kind, target.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn remove(&self, kind: BlockKind, target: &str) -> Option<BackupEntry> {
        self.entries
            .remove(&(kind, target.to_string()))
            .map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// A saved item stack that ITEM blocks can hand out by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemTemplate {
    pub material: String,
    pub amount: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// In-memory item templates
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: DashMap<String, ItemTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, name: impl Into<String>, template: ItemTemplate) -> Option<ItemTemplate> {
        self.templates.insert(name.into(), template)
    }

    pub fn get(&self, name: &str) -> Option<ItemTemplate> {
        self.templates.get(name).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<ItemTemplate> {
        self.templates.remove(name).map(|(_, template)| template)
    }

    /// Template names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.templates.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn clear(&self) {
        self.templates.clear();
    }
}
