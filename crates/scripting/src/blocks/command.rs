//! COMMAND blocks
//!
//! `value` holds the command line or broadcast text; `{var}` placeholders are
//! filled in before it reaches the host.

use super::{apply_effect, target_player, text_value};
use crate::block::BlockKind;
use crate::context::ExecutionContext;
use crate::effects::EffectRequest;
use crate::error::{Result, ScriptError};
use crate::registry::{Invocation, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOp {
    /// Dispatch as the server console
    Run,
    /// Dispatch as the target player (default: triggering player)
    RunAsPlayer,
    /// Message every online player
    Broadcast,
}

impl Operation for CommandOp {
    const BLOCK: BlockKind = BlockKind::Command;

    const ALL: &'static [Self] = &[CommandOp::Run, CommandOp::RunAsPlayer, CommandOp::Broadcast];

    fn name(self) -> &'static str {
        match self {
            CommandOp::Run => "RUN",
            CommandOp::RunAsPlayer => "RUN_AS_PLAYER",
            CommandOp::Broadcast => "BROADCAST",
        }
    }

    fn apply(self, call: &Invocation<'_>, ctx: &mut ExecutionContext) -> Result<String> {
        let text = text_value(call, ctx)?;

        match self {
            CommandOp::Run | CommandOp::RunAsPlayer => {
                let command = text.trim().trim_start_matches('/').to_string();
                if command.is_empty() {
                    return Err(ScriptError::Operation(format!("{} with an empty command", self.name())));
                }

                let sender = match self {
                    CommandOp::RunAsPlayer => target_player(call, ctx)?.to_string(),
                    _ => "console".to_string(),
                };
                apply_effect(ctx, EffectRequest::new("dispatch_command", sender).with("command", command))
            }
            CommandOp::Broadcast => apply_effect(ctx, EffectRequest::new("broadcast", "server").with("message", text)),
        }
    }
}
