//! ITEM blocks
//!
//! GIVE, TAKE and CLEAR target a player. The template operations target a
//! template name and hand items to the `player` parameter, or to whoever
//! triggered the run.

use super::{apply_effect, player_from, target_player};
use crate::block::BlockKind;
use crate::context::ExecutionContext;
use crate::effects::EffectRequest;
use crate::error::{Result, ScriptError};
use crate::registry::{Invocation, Operation};
use crate::runtime::ItemTemplate;

const MATERIAL: &str = "material";
const AMOUNT: &str = "amount";
const DISPLAY_NAME: &str = "displayName";
const PLAYER: &str = "player";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOp {
    Give,
    Take,
    Clear,
    SaveTemplate,
    GiveTemplate,
    DeleteTemplate,
}

impl Operation for ItemOp {
    const BLOCK: BlockKind = BlockKind::Item;

    const ALL: &'static [Self] = &[
        ItemOp::Give,
        ItemOp::Take,
        ItemOp::Clear,
        ItemOp::SaveTemplate,
        ItemOp::GiveTemplate,
        ItemOp::DeleteTemplate,
    ];

    fn name(self) -> &'static str {
        match self {
            ItemOp::Give => "GIVE",
            ItemOp::Take => "TAKE",
            ItemOp::Clear => "CLEAR",
            ItemOp::SaveTemplate => "SAVE_TEMPLATE",
            ItemOp::GiveTemplate => "GIVE_TEMPLATE",
            ItemOp::DeleteTemplate => "DELETE_TEMPLATE",
        }
    }

    fn apply(self, call: &Invocation<'_>, ctx: &mut ExecutionContext) -> Result<String> {
        match self {
            ItemOp::Give | ItemOp::Take => {
                let player = target_player(call, ctx)?;
                let stack = read_stack(call)?;
                let operation = if self == ItemOp::Give { "give_item" } else { "take_item" };
                apply_effect(ctx, stack_request(operation, &player.to_string(), &stack))
            }
            ItemOp::Clear => {
                let player = target_player(call, ctx)?;
                apply_effect(ctx, EffectRequest::new("clear_inventory", player.to_string()))
            }
            ItemOp::SaveTemplate => {
                let name = call.require_target()?;
                let template = read_stack(call)?;
                let replaced = ctx.runtime().templates().save(name, template).is_some();
                Ok(if replaced {
                    format!("template {} replaced", name)
                } else {
                    format!("template {} saved", name)
                })
            }
            ItemOp::GiveTemplate => {
                let name = call.require_target()?;
                let template = ctx
                    .runtime()
                    .templates()
                    .get(name)
                    .ok_or_else(|| ScriptError::Operation(format!("no item template named '{}'", name)))?;
                let raw_player = call.param(PLAYER).map(|v| v.to_string()).unwrap_or_default();
                let player = player_from(&raw_player, call, ctx)?;
                apply_effect(ctx, stack_request("give_item", &player.to_string(), &template))
            }
            ItemOp::DeleteTemplate => {
                let name = call.require_target()?;
                ctx.runtime()
                    .templates()
                    .remove(name)
                    .map(|_| format!("template {} deleted", name))
                    .ok_or_else(|| ScriptError::Operation(format!("no item template named '{}'", name)))
            }
        }
    }
}

/// Item stack described by the block: `material` (or `value`), `amount`, `displayName`
fn read_stack(call: &Invocation<'_>) -> Result<ItemTemplate> {
    let material = match call.param(MATERIAL) {
        Some(value) => value,
        None => call.require_value()?,
    };
    let material = material.to_string().trim().to_uppercase();
    if material.is_empty() {
        return Err(ScriptError::Operation(format!("{} needs a material", call.operation)));
    }

    let amount = match call.params.integer(AMOUNT) {
        Some(n) if (1..=i64::from(u32::MAX)).contains(&n) => n as u32,
        Some(n) => {
            return Err(ScriptError::Operation(format!("item amount must be positive, got {}", n)));
        }
        None if call.params.contains(AMOUNT) => {
            return Err(ScriptError::Operation("item amount must be a whole number".into()));
        }
        None => 1,
    };

    Ok(ItemTemplate {
        material,
        amount,
        display_name: call.params.text(DISPLAY_NAME),
    })
}

fn stack_request(operation: &str, player: &str, stack: &ItemTemplate) -> EffectRequest {
    let mut request = EffectRequest::new(operation, player)
        .with(MATERIAL, stack.material.as_str())
        .with(AMOUNT, i64::from(stack.amount));
    if let Some(name) = &stack.display_name {
        request = request.with(DISPLAY_NAME, name.as_str());
    }
    request
}
