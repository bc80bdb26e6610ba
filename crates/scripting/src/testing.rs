//! Test fixtures

use crate::context::{ExecutionContext, GlobalVariables};
use crate::effects::{BufferedSink, Collaborators, RecordingEffects};
use crate::runtime::Runtime;
use crate::system::HostSystemVariables;
use housing_config::EngineConfig;
use housing_core::PlayerId;
use std::sync::Arc;

/// A runtime wired to in-memory collaborators
pub struct Harness {
    pub runtime: Arc<Runtime>,
    pub effects: Arc<RecordingEffects>,
    pub sink: Arc<BufferedSink>,
    pub system: Arc<HostSystemVariables>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let effects = Arc::new(RecordingEffects::new());
        let sink = Arc::new(BufferedSink::new());
        let system = Arc::new(HostSystemVariables::new());
        let collaborators = Collaborators::new(effects.clone(), sink.clone(), system.clone());

        Self {
            runtime: Runtime::start(config, collaborators),
            effects,
            sink,
            system,
        }
    }

    /// Fresh context triggered by player `alex`
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.runtime.clone(), GlobalVariables::new())
            .with_player(Some(PlayerId::from("alex")))
    }
}
