//! Built-in block families
//!
//! Each family declares its operation enum and implements
//! [`Operation`](crate::registry::Operation) for it; [`register_all`] folds
//! them into the runtime's registry.

mod command;
mod item;
mod message;
mod variable;
mod world;

pub use command::CommandOp;
pub use item::ItemOp;
pub use message::MessageOp;
pub use variable::VariableOp;
pub use world::WorldOp;

use crate::context::ExecutionContext;
use crate::effects::EffectRequest;
use crate::error::{Result, ScriptError};
use crate::registry::{Invocation, OperationRegistry};
use housing_core::{Location, PlayerId};

/// Register every built-in family
pub fn register_all(registry: &mut OperationRegistry) {
    registry.register_family::<VariableOp>();
    registry.register_family::<CommandOp>();
    registry.register_family::<ItemOp>();
    registry.register_family::<WorldOp>();
    registry.register_family::<MessageOp>();
}

/// Player a block acts on: the explicit target, else whoever triggered the run
fn target_player(call: &Invocation<'_>, ctx: &ExecutionContext) -> Result<PlayerId> {
    player_from(call.target, call, ctx)
}

fn player_from(raw: &str, call: &Invocation<'_>, ctx: &ExecutionContext) -> Result<PlayerId> {
    let name = ctx.interpolate(raw.trim());
    if !name.is_empty() {
        return Ok(PlayerId::from(name));
    }
    ctx.player().cloned().ok_or_else(|| {
        ScriptError::Operation(format!(
            "{} {} has no target and no triggering player",
            call.kind, call.operation
        ))
    })
}

/// `value` as text with `{var}` placeholders filled in
fn text_value(call: &Invocation<'_>, ctx: &ExecutionContext) -> Result<String> {
    Ok(ctx.interpolate(&call.require_value()?.to_string()))
}

/// A location parameter, either a location value or `world:x,y,z` text
fn location_param(call: &Invocation<'_>, ctx: &ExecutionContext, key: &str) -> Result<Location> {
    let raw = call.require_param(key)?;
    if let Some(location) = raw.as_location() {
        return Ok(location);
    }
    Location::parse(&ctx.interpolate(&raw.to_string())).ok_or_else(|| {
        ScriptError::Operation(format!(
            "{} {}: '{}' is not a location (expected world:x,y,z)",
            call.kind, call.operation, raw
        ))
    })
}

/// Send an effect to the host and describe it on success
fn apply_effect(ctx: &ExecutionContext, request: EffectRequest) -> Result<String> {
    ctx.runtime().invoke_effect(&request)?;
    Ok(format!("{} {}", request.operation, request.target))
}
