//! Console host
//!
//! Stands in for the game server: effects are logged and the ones that
//! change world state are mirrored into the SYSTEM variables.

use housing_core::Location;
use housing_scripting::{EffectHandler, EffectRequest, HostSystemVariables};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ConsoleEffects {
    system: Arc<HostSystemVariables>,
}

impl ConsoleEffects {
    pub fn new(system: Arc<HostSystemVariables>) -> Self {
        Self { system }
    }
}

impl EffectHandler for ConsoleEffects {
    fn invoke(&self, request: &EffectRequest) -> Result<bool, String> {
        let params: Vec<String> = request
            .params
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        info!("[effect] {} -> {} {}", request.operation, request.target, params.join(" "));

        match request.operation.as_str() {
            "set_weather" => {
                if let Some(weather) = request.param("weather") {
                    self.system.set_weather(weather.to_string());
                }
            }
            "set_time" => {
                if let Some(ticks) = request.param("ticks").and_then(|v| v.as_number()) {
                    self.system.set_world_time(ticks as u64);
                }
            }
            "spawn_entity" | "set_block" | "explode" => {
                if Location::parse(&request.target).is_none() {
                    warn!("[effect] {} has no valid location: {}", request.operation, request.target);
                    return Ok(false);
                }
            }
            _ => {}
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use housing_scripting::{SystemVariables, Value};

    #[test]
    fn test_world_effects_update_system_scope() {
        let system = Arc::new(HostSystemVariables::new());
        let effects = ConsoleEffects::new(system.clone());

        let request = EffectRequest::new("set_weather", "world").with("weather", "thunder");
        assert_eq!(effects.invoke(&request), Ok(true));
        assert_eq!(system.get("weather"), Some(Value::from("thunder")));

        effects
            .invoke(&EffectRequest::new("set_time", "world").with("ticks", 6000.0))
            .unwrap();
        assert_eq!(system.get("time"), Some(Value::Number(6000.0)));
    }

    #[test]
    fn test_positional_effects_need_location() {
        let effects = ConsoleEffects::new(Arc::new(HostSystemVariables::new()));
        let good = EffectRequest::new("explode", "world:1,64,-3").with("power", 4.0);
        assert_eq!(effects.invoke(&good), Ok(true));
        assert_eq!(effects.invoke(&EffectRequest::new("explode", "nowhere")), Ok(false));
    }
}
