//! MESSAGE blocks
//!
//! Player-facing text with `{var}` placeholders, delivered through the
//! runtime's message sink. `&` color codes pass through untouched.

use super::{target_player, text_value};
use crate::block::BlockKind;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::registry::{Invocation, Operation};

const SUBTITLE: &str = "subtitle";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOp {
    Send,
    Title,
    ActionBar,
}

impl Operation for MessageOp {
    const BLOCK: BlockKind = BlockKind::Message;

    const ALL: &'static [Self] = &[MessageOp::Send, MessageOp::Title, MessageOp::ActionBar];

    fn name(self) -> &'static str {
        match self {
            MessageOp::Send => "SEND",
            MessageOp::Title => "TITLE",
            MessageOp::ActionBar => "ACTION_BAR",
        }
    }

    fn apply(self, call: &Invocation<'_>, ctx: &mut ExecutionContext) -> Result<String> {
        let player = target_player(call, ctx)?;
        let text = text_value(call, ctx)?;
        let runtime = ctx.runtime();
        let sink = runtime.messages();

        match self {
            MessageOp::Send => runtime.shielded("send message", || sink.notify(&player, &text))?,
            MessageOp::Title => {
                let subtitle = call.params.text(SUBTITLE).map(|s| ctx.interpolate(&s));
                runtime.shielded("show title", || sink.title(&player, &text, subtitle.as_deref()))?
            }
            MessageOp::ActionBar => runtime.shielded("show action bar", || sink.action_bar(&player, &text))?,
        }
        Ok(format!("{} to {}", self.name().to_lowercase(), player))
    }
}
