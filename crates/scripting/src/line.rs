//! Code lines

use crate::block::{validate_sequence, CodeBlock};
use crate::error::{Result, ScriptError};
use crate::event::EventType;
use serde::{Deserialize, Serialize};

/// An ordered, toggleable sequence of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeLine {
    /// Position in the script, starting at 1
    number: u32,
    name: String,
    enabled: bool,
    /// Only run for this event; `None` runs for every event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trigger: Option<EventType>,
    #[serde(default)]
    blocks: Vec<CodeBlock>,
}

impl CodeLine {
    pub fn new(number: u32, name: impl Into<String>) -> Self {
        Self {
            number,
            name: name.into(),
            enabled: true,
            trigger: None,
            blocks: Vec::new(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: u32) {
        self.number = number;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Flip the enabled flag, returning the new state
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    pub fn trigger(&self) -> Option<&EventType> {
        self.trigger.as_ref()
    }

    pub fn set_trigger(&mut self, trigger: Option<EventType>) {
        self.trigger = trigger;
    }

    /// Whether this line reacts to `event`; a run without an event runs every line
    pub fn runs_for(&self, event: Option<&EventType>) -> bool {
        match (&self.trigger, event) {
            (None, _) | (_, None) => true,
            (Some(wanted), Some(event)) => wanted == event,
        }
    }

    pub fn blocks(&self) -> &[CodeBlock] {
        &self.blocks
    }

    pub fn block_mut(&mut self, index: usize) -> Option<&mut CodeBlock> {
        self.blocks.get_mut(index)
    }

    pub fn push_block(&mut self, block: CodeBlock) {
        self.blocks.push(block);
    }

    /// Builder form of [`CodeLine::push_block`]
    pub fn with_block(mut self, block: CodeBlock) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn insert_block(&mut self, index: usize, block: CodeBlock) -> Result<()> {
        if index > self.blocks.len() {
            return Err(ScriptError::Validation(format!(
                "line {}: cannot insert at {} ({} blocks)",
                self.number,
                index,
                self.blocks.len()
            )));
        }
        self.blocks.insert(index, block);
        Ok(())
    }

    pub fn remove_block(&mut self, index: usize) -> Option<CodeBlock> {
        (index < self.blocks.len()).then(|| self.blocks.remove(index))
    }

    /// Move a block to a new position, shifting the ones in between
    pub fn move_block(&mut self, from: usize, to: usize) -> bool {
        if from >= self.blocks.len() || to >= self.blocks.len() {
            return false;
        }
        let block = self.blocks.remove(from);
        self.blocks.insert(to, block);
        true
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Validate every block, naming the line in the error
    pub fn validate(&self) -> Result<()> {
        validate_sequence(&self.blocks).map_err(|err| match err {
            ScriptError::Validation(message) => {
                ScriptError::Validation(format!("line {} ({}): {}", self.number, self.name, message))
            }
            other => other,
        })
    }
}
