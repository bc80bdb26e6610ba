//! Collaborator seams towards the host server
//!
//! Blocks never touch the world directly. They describe an [`EffectRequest`]
//! and hand it to an [`EffectHandler`]; player-facing text goes to a
//! [`MessageSink`].

use crate::system::{HostSystemVariables, SystemVariables};
use crate::value::Value;
use housing_core::PlayerId;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A named world operation against a target
#[derive(Debug, Clone, PartialEq)]
pub struct EffectRequest {
    /// Operation name, e.g. `give_item` or `spawn_entity`
    pub operation: String,
    /// Player name, world name or location text, depending on the operation
    pub target: String,
    pub params: BTreeMap<String, Value>,
}

impl EffectRequest {
    pub fn new(operation: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            target: target.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// Applies effects to the game world
///
/// `Ok(false)` and `Err(_)` are both reported to the script as effect errors.
pub trait EffectHandler: Send + Sync {
    fn invoke(&self, request: &EffectRequest) -> std::result::Result<bool, String>;
}

/// Receives player notifications and log lines as plain text
pub trait MessageSink: Send + Sync {
    fn notify(&self, player: &PlayerId, message: &str);
    fn log(&self, line: &str);

    /// Big center-screen text; hosts without titles get a chat message
    fn title(&self, player: &PlayerId, title: &str, subtitle: Option<&str>) {
        match subtitle {
            Some(subtitle) => self.notify(player, &format!("{} - {}", title, subtitle)),
            None => self.notify(player, title),
        }
    }

    /// Text above the hotbar
    fn action_bar(&self, player: &PlayerId, message: &str) {
        self.notify(player, message);
    }
}

/// The set of host collaborators a runtime talks to
#[derive(Clone)]
pub struct Collaborators {
    pub effects: Arc<dyn EffectHandler>,
    pub messages: Arc<dyn MessageSink>,
    pub system: Arc<dyn SystemVariables>,
}

impl Collaborators {
    pub fn new(
        effects: Arc<dyn EffectHandler>,
        messages: Arc<dyn MessageSink>,
        system: Arc<dyn SystemVariables>,
    ) -> Self {
        Self {
            effects,
            messages,
            system,
        }
    }

    /// Collaborators that accept every effect and forward text to `tracing`
    pub fn detached() -> Self {
        Self {
            effects: Arc::new(NullEffects),
            messages: Arc::new(TracingSink),
            system: Arc::new(HostSystemVariables::new()),
        }
    }
}

/// Accepts every effect without doing anything
pub struct NullEffects;

impl EffectHandler for NullEffects {
    fn invoke(&self, _request: &EffectRequest) -> std::result::Result<bool, String> {
        Ok(true)
    }
}

/// Forwards notifications and log lines to `tracing`
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn notify(&self, player: &PlayerId, message: &str) {
        tracing::info!(player = %player, "{}", message);
    }

    fn log(&self, line: &str) {
        tracing::info!("{}", line);
    }
}

/// Dry-run effect handler that records every request
///
/// Operations registered through [`RecordingEffects::fail_on`] report failure.
#[derive(Default)]
pub struct RecordingEffects {
    requests: Mutex<Vec<EffectRequest>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, operation: impl Into<String>) {
        self.failing.lock().insert(operation.into());
    }

    pub fn requests(&self) -> Vec<EffectRequest> {
        self.requests.lock().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.operation.clone()).collect()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }
}

impl EffectHandler for RecordingEffects {
    fn invoke(&self, request: &EffectRequest) -> std::result::Result<bool, String> {
        self.requests.lock().push(request.clone());
        if self.failing.lock().contains(&request.operation) {
            return Err(format!("{} rejected by host", request.operation));
        }
        Ok(true)
    }
}

/// Message sink that keeps everything in memory
#[derive(Default)]
pub struct BufferedSink {
    notifications: Mutex<Vec<(PlayerId, String)>>,
    lines: Mutex<Vec<String>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<(PlayerId, String)> {
        self.notifications.lock().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl MessageSink for BufferedSink {
    fn notify(&self, player: &PlayerId, message: &str) {
        self.notifications.lock().push((player.clone(), message.to_string()));
    }

    fn log(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// An effect request waiting for the main thread
pub struct EffectJob {
    pub request: EffectRequest,
    reply: oneshot::Sender<std::result::Result<bool, String>>,
}

impl EffectJob {
    fn run(self, handler: &dyn EffectHandler) {
        let outcome = handler.invoke(&self.request);
        // The caller may have given up; nothing to do then
        let _ = self.reply.send(outcome);
    }
}

/// Effect handler that marshals every request onto the host's main thread
///
/// Script runs block on the reply, so they must not execute on an async
/// worker thread (use `spawn_blocking` or a plain thread).
#[derive(Clone)]
pub struct MainThreadEffects {
    sender: mpsc::Sender<EffectJob>,
}

impl MainThreadEffects {
    /// Create the handler and the pump the main thread drives
    pub fn channel(handler: Arc<dyn EffectHandler>, capacity: usize) -> (Self, EffectPump) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, EffectPump { receiver, handler })
    }
}

impl EffectHandler for MainThreadEffects {
    fn invoke(&self, request: &EffectRequest) -> std::result::Result<bool, String> {
        let (reply, response) = oneshot::channel();
        let job = EffectJob {
            request: request.clone(),
            reply,
        };
        self.sender
            .blocking_send(job)
            .map_err(|_| "main thread effect pump is closed".to_string())?;
        response
            .blocking_recv()
            .map_err(|_| "main thread dropped the effect request".to_string())?
    }
}

/// Main-thread side of [`MainThreadEffects`]
pub struct EffectPump {
    receiver: mpsc::Receiver<EffectJob>,
    handler: Arc<dyn EffectHandler>,
}

impl EffectPump {
    /// Apply every queued request without waiting; call once per server tick
    pub fn pump_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job.run(self.handler.as_ref());
            applied += 1;
        }
        applied
    }

    /// Wait for one request and apply it; `false` once every sender is gone
    pub fn pump_blocking(&mut self) -> bool {
        match self.receiver.blocking_recv() {
            Some(job) => {
                job.run(self.handler.as_ref());
                true
            }
            None => false,
        }
    }

    /// Apply requests until every sender is gone
    pub async fn run(&mut self) {
        while let Some(job) = self.receiver.recv().await {
            job.run(self.handler.as_ref());
        }
        tracing::debug!("Effect pump closed");
    }
}
