//! Housing Scripting Configuration
//!
//! Loads engine settings from `engine.txt`, a plain `key = value` file.
//! Unknown keys are ignored and unparsable values fall back to the defaults.

use housing_core::Result;
use std::fs;
use std::path::Path;

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    // Execution limits
    /// Deepest nesting of IF/REPEAT/function bodies (from "maxdepth" option)
    pub max_depth: usize,
    /// Execution log ring buffer capacity (from "logcapacity" option)
    pub log_capacity: usize,
    /// REPEAT bound when the block sets none (from "defaultmaxiterations" option)
    pub default_max_iterations: u64,
    /// Hard ceiling applied to every REPEAT bound (from "maxiterationscap" option)
    pub max_iterations_cap: u64,

    // Diagnostics
    /// Record every block transition in the execution log (from "debug" option)
    pub debug: bool,
    /// Warn when a condition falls through to the permissive default (from "warnpermissive" option)
    pub warn_permissive_conditions: bool,

    // Player feedback
    /// Allow blocks to notify the triggering player (from "notifyplayers" option)
    pub notify_players: bool,
    /// Color code prefixed to success messages (from "successcolor" option)
    pub success_color: String,
    /// Color code prefixed to failure messages (from "failurecolor" option)
    pub failure_color: String,
    /// Default success message (from "successmessage" option)
    pub success_message: String,
    /// Default failure message (from "failuremessage" option)
    pub failure_message: String,

    // Host integration
    /// Pending effect requests queued for the main thread (from "effectqueue" option)
    pub effect_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            log_capacity: 128,
            default_max_iterations: 100,
            max_iterations_cap: 10_000,
            debug: false,
            warn_permissive_conditions: true,
            notify_players: true,
            success_color: "&a".into(),
            failure_color: "&c".into(),
            success_message: "Done!".into(),
            failure_message: "Something went wrong.".into(),
            effect_queue_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Load configuration, falling back to defaults if the file is missing or unreadable
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load {}: {}", path.display(), e);
                tracing::warn!("Using default engine configuration");
                Self::default()
            }
        }
    }

    /// Parse `engine.txt` content
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) => config.parse_option(&key.trim().to_lowercase(), value.trim()),
                None => tracing::warn!("Ignoring malformed config line: {}", line),
            }
        }

        config.sanitize();
        config
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        let defaults = Self::default();
        match key {
            "maxdepth" => self.max_depth = value.parse().unwrap_or(defaults.max_depth),
            "logcapacity" => self.log_capacity = value.parse().unwrap_or(defaults.log_capacity),
            "defaultmaxiterations" => {
                self.default_max_iterations = value.parse().unwrap_or(defaults.default_max_iterations);
            }
            "maxiterationscap" => {
                self.max_iterations_cap = value.parse().unwrap_or(defaults.max_iterations_cap);
            }
            "debug" => self.debug = parse_bool(value).unwrap_or(defaults.debug),
            "warnpermissive" => {
                self.warn_permissive_conditions =
                    parse_bool(value).unwrap_or(defaults.warn_permissive_conditions);
            }
            "notifyplayers" => self.notify_players = parse_bool(value).unwrap_or(defaults.notify_players),
            "successcolor" => self.success_color = value.into(),
            "failurecolor" => self.failure_color = value.into(),
            "successmessage" => self.success_message = value.into(),
            "failuremessage" => self.failure_message = value.into(),
            "effectqueue" => {
                self.effect_queue_capacity = value.parse().unwrap_or(defaults.effect_queue_capacity);
            }
            _ => tracing::debug!("Unknown config option: {}", key),
        }
    }

    /// Keep limits usable even when the file asks for nonsense
    fn sanitize(&mut self) {
        if self.max_depth == 0 {
            tracing::warn!("maxdepth must be at least 1, using 1");
            self.max_depth = 1;
        }
        if self.effect_queue_capacity == 0 {
            self.effect_queue_capacity = 1;
        }
        if self.default_max_iterations > self.max_iterations_cap {
            tracing::warn!(
                "defaultmaxiterations {} exceeds maxiterationscap {}, clamping",
                self.default_max_iterations,
                self.max_iterations_cap
            );
            self.default_max_iterations = self.max_iterations_cap;
        }
    }

    /// Colorize a player-facing message
    pub fn colorize(&self, success: bool, message: &str) -> String {
        let color = if success { &self.success_color } else { &self.failure_color };
        format!("{}{}", color, message)
    }

    /// Display the effective configuration
    pub fn display(&self) {
        tracing::info!("Engine configuration:");
        tracing::info!("  Max depth: {}", self.max_depth);
        tracing::info!("  Log capacity: {}", self.log_capacity);
        tracing::info!(
            "  REPEAT iterations: default {}, cap {}",
            self.default_max_iterations,
            self.max_iterations_cap
        );
        tracing::info!("  Debug: {}", self.debug);
        tracing::info!("  Warn on permissive conditions: {}", self.warn_permissive_conditions);
        tracing::info!("  Notify players: {}", self.notify_players);
        tracing::info!("  Effect queue: {}", self.effect_queue_capacity);
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
