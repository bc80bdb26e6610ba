//! WORLD blocks
//!
//! `target` names the world for SET_TIME and SET_WEATHER. The positional
//! operations take a `location` parameter in `world:x,y,z` form.

use super::{apply_effect, location_param, target_player};
use crate::block::BlockKind;
use crate::context::ExecutionContext;
use crate::effects::EffectRequest;
use crate::error::{Result, ScriptError};
use crate::registry::{Invocation, Operation};

const LOCATION: &str = "location";
const POWER: &str = "power";
const VOLUME: &str = "volume";
const PITCH: &str = "pitch";

/// Ticks in one in-game day
const DAY_TICKS: f64 = 24_000.0;
const DEFAULT_EXPLOSION_POWER: f64 = 4.0;
const MAX_EXPLOSION_POWER: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldOp {
    SetTime,
    SetWeather,
    SpawnEntity,
    PlaySound,
    SetBlock,
    Explode,
}

impl Operation for WorldOp {
    const BLOCK: BlockKind = BlockKind::World;

    const ALL: &'static [Self] = &[
        WorldOp::SetTime,
        WorldOp::SetWeather,
        WorldOp::SpawnEntity,
        WorldOp::PlaySound,
        WorldOp::SetBlock,
        WorldOp::Explode,
    ];

    fn name(self) -> &'static str {
        match self {
            WorldOp::SetTime => "SET_TIME",
            WorldOp::SetWeather => "SET_WEATHER",
            WorldOp::SpawnEntity => "SPAWN_ENTITY",
            WorldOp::PlaySound => "PLAY_SOUND",
            WorldOp::SetBlock => "SET_BLOCK",
            WorldOp::Explode => "EXPLODE",
        }
    }

    fn apply(self, call: &Invocation<'_>, ctx: &mut ExecutionContext) -> Result<String> {
        match self {
            WorldOp::SetTime => {
                let ticks = call.number()?;
                if !ticks.is_finite() || ticks < 0.0 {
                    return Err(ScriptError::Operation(format!("invalid world time {}", ticks)));
                }
                let ticks = (ticks % DAY_TICKS).floor();
                apply_effect(ctx, EffectRequest::new("set_time", world(call)).with("ticks", ticks))
            }
            WorldOp::SetWeather => {
                let weather = call.require_value()?.to_string().trim().to_lowercase();
                if !matches!(weather.as_str(), "clear" | "rain" | "thunder") {
                    return Err(ScriptError::Operation(format!(
                        "unknown weather '{}' (clear, rain or thunder)",
                        weather
                    )));
                }
                apply_effect(ctx, EffectRequest::new("set_weather", world(call)).with("weather", weather))
            }
            WorldOp::SpawnEntity => {
                let entity = call.require_value()?.to_string().trim().to_uppercase();
                let location = location_param(call, ctx, LOCATION)?;
                apply_effect(
                    ctx,
                    EffectRequest::new("spawn_entity", location.to_string()).with("entity", entity),
                )
            }
            WorldOp::PlaySound => {
                let sound = call.require_value()?.to_string();
                let volume = call.params.number(VOLUME).unwrap_or(1.0);
                let pitch = call.params.number(PITCH).unwrap_or(1.0);

                // At a location when one is given, else to the player
                let target = if call.params.contains(LOCATION) {
                    location_param(call, ctx, LOCATION)?.to_string()
                } else {
                    target_player(call, ctx)?.to_string()
                };
                apply_effect(
                    ctx,
                    EffectRequest::new("play_sound", target)
                        .with("sound", sound)
                        .with(VOLUME, volume)
                        .with(PITCH, pitch),
                )
            }
            WorldOp::SetBlock => {
                let material = call.require_value()?.to_string().trim().to_uppercase();
                let position = location_param(call, ctx, LOCATION)?;
                let block = position.to_block().to_location(position.world.as_str());
                apply_effect(
                    ctx,
                    EffectRequest::new("set_block", block.to_string()).with("material", material),
                )
            }
            WorldOp::Explode => {
                let location = location_param(call, ctx, LOCATION)?;
                let power = call
                    .params
                    .number(POWER)
                    .unwrap_or(DEFAULT_EXPLOSION_POWER)
                    .clamp(0.0, MAX_EXPLOSION_POWER);
                apply_effect(
                    ctx,
                    EffectRequest::new("explode", location.to_string()).with(POWER, power),
                )
            }
        }
    }
}

/// Target world, `world` when the block leaves it empty
fn world(call: &Invocation<'_>) -> String {
    match call.target.trim() {
        "" => "world".to_string(),
        name => name.to_string(),
    }
}
