//! VARIABLE blocks
//!
//! `target` names the variable and may carry a `global:` prefix. Numeric
//! operations treat a missing variable as 0. SET is idempotent, the
//! arithmetic operations are not. SWAP is its own inverse.

use crate::block::{params, BlockKind};
use crate::context::ExecutionContext;
use crate::error::{Result, ScriptError};
use crate::registry::{Invocation, Operation};
use crate::value::Value;

/// Alternative key for the second variable of COPY and SWAP
const OTHER: &str = "other";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableOp {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Increment,
    Decrement,
    Append,
    Toggle,
    Push,
    CopyFrom,
    Swap,
    Remove,
    Restore,
}

impl Operation for VariableOp {
    const BLOCK: BlockKind = BlockKind::Variable;

    const ALL: &'static [Self] = &[
        VariableOp::Set,
        VariableOp::Add,
        VariableOp::Subtract,
        VariableOp::Multiply,
        VariableOp::Divide,
        VariableOp::Modulo,
        VariableOp::Increment,
        VariableOp::Decrement,
        VariableOp::Append,
        VariableOp::Toggle,
        VariableOp::Push,
        VariableOp::CopyFrom,
        VariableOp::Swap,
        VariableOp::Remove,
        VariableOp::Restore,
    ];

    fn name(self) -> &'static str {
        match self {
            VariableOp::Set => "SET",
            VariableOp::Add => "ADD",
            VariableOp::Subtract => "SUBTRACT",
            VariableOp::Multiply => "MULTIPLY",
            VariableOp::Divide => "DIVIDE",
            VariableOp::Modulo => "MODULO",
            VariableOp::Increment => "INCREMENT",
            VariableOp::Decrement => "DECREMENT",
            VariableOp::Append => "APPEND",
            VariableOp::Toggle => "TOGGLE",
            VariableOp::Push => "PUSH",
            VariableOp::CopyFrom => "COPY",
            VariableOp::Swap => "SWAP",
            VariableOp::Remove => "REMOVE",
            VariableOp::Restore => "RESTORE",
        }
    }

    fn apply(self, call: &Invocation<'_>, ctx: &mut ExecutionContext) -> Result<String> {
        let target = call.require_target()?;

        match self {
            VariableOp::Set => {
                let value = call.require_value()?.clone();
                let shown = value.to_string();
                ctx.set_variable(target, value)?;
                Ok(format!("{} = {}", target, shown))
            }
            VariableOp::Add
            | VariableOp::Subtract
            | VariableOp::Multiply
            | VariableOp::Divide
            | VariableOp::Modulo => {
                let operand = call.number()?;
                let result = ctx.update_variable(target, |current| {
                    let current = number_or_zero(target, current)?;
                    self.arithmetic(current, operand).map(Value::Number)
                })?;
                Ok(format!("{} = {}", target, result))
            }
            VariableOp::Increment | VariableOp::Decrement => {
                let step = match call.value() {
                    Some(_) => call.number()?,
                    None => 1.0,
                };
                let step = if self == VariableOp::Increment { step } else { -step };
                let result = ctx.update_variable(target, |current| {
                    Ok(Value::Number(number_or_zero(target, current)? + step))
                })?;
                Ok(format!("{} = {}", target, result))
            }
            VariableOp::Append => {
                let suffix = ctx.interpolate(&call.require_value()?.to_string());
                let result = ctx.update_variable(target, |current| {
                    let mut text = current.map(|v| v.to_string()).unwrap_or_default();
                    text.push_str(&suffix);
                    Ok(Value::Text(text))
                })?;
                Ok(format!("{} = {}", target, result))
            }
            VariableOp::Toggle => {
                let result = ctx.update_variable(target, |current| {
                    let current = match current {
                        Some(value) => value.as_bool().ok_or_else(|| type_mismatch(target, "bool", value))?,
                        None => false,
                    };
                    Ok(Value::Bool(!current))
                })?;
                Ok(format!("{} = {}", target, result))
            }
            VariableOp::Push => {
                let item = call.require_value()?.clone();
                let result = ctx.update_variable(target, |current| {
                    let mut items = match current {
                        Some(Value::List(items)) => items.clone(),
                        Some(other) => return Err(type_mismatch(target, "list", other)),
                        None => Vec::new(),
                    };
                    items.push(item);
                    Ok(Value::List(items))
                })?;
                let len = match &result {
                    Value::List(items) => items.len(),
                    _ => 0,
                };
                Ok(format!("{} has {} items", target, len))
            }
            VariableOp::CopyFrom => {
                let source = second_variable(call)?;
                let value = ctx
                    .get_variable(&source)
                    .ok_or_else(|| ScriptError::Operation(format!("COPY source '{}' is not set", source)))?;
                ctx.set_variable(target, value)?;
                Ok(format!("{} = {}", target, source))
            }
            VariableOp::Swap => {
                let other = second_variable(call)?;
                ctx.swap_variables(target, &other)?;
                Ok(format!("swapped {} and {}", target, other))
            }
            VariableOp::Remove => match ctx.remove_variable(target)? {
                Some(_) => Ok(format!("removed {}", target)),
                None => Ok(format!("{} was not set", target)),
            },
            VariableOp::Restore => {
                let entry = ctx
                    .runtime()
                    .backups()
                    .get(BlockKind::Variable, target)
                    .ok_or_else(|| ScriptError::Operation(format!("no backup of '{}'", target)))?;
                write(ctx, target, entry.value)?;
                Ok(format!("restored {}", target))
            }
        }
    }
}

impl VariableOp {
    fn arithmetic(self, current: f64, operand: f64) -> Result<f64> {
        match self {
            VariableOp::Add => Ok(current + operand),
            VariableOp::Subtract => Ok(current - operand),
            VariableOp::Multiply => Ok(current * operand),
            VariableOp::Divide | VariableOp::Modulo if operand == 0.0 => Err(ScriptError::Operation(
                format!("{} by zero", self.name()),
            )),
            VariableOp::Divide => Ok(current / operand),
            VariableOp::Modulo => Ok(current % operand),
            _ => Err(ScriptError::Operation(format!("{} is not arithmetic", self.name()))),
        }
    }
}

fn number_or_zero(name: &str, current: Option<&Value>) -> Result<f64> {
    match current {
        Some(value) => value.as_number().ok_or_else(|| type_mismatch(name, "number", value)),
        None => Ok(0.0),
    }
}

fn type_mismatch(name: &str, expected: &str, actual: &Value) -> ScriptError {
    ScriptError::Operation(format!(
        "'{}' holds {} '{}', expected a {}",
        name,
        actual.type_name(),
        actual,
        expected
    ))
}

fn second_variable(call: &Invocation<'_>) -> Result<String> {
    let raw = match call.param(params::SOURCE).or_else(|| call.param(OTHER)) {
        Some(value) => value,
        None => call.require_param(params::SOURCE)?,
    };
    let name = raw.to_string().trim().to_string();
    if name.is_empty() {
        return Err(ScriptError::Operation(format!("{} needs a second variable name", call.operation)));
    }
    Ok(name)
}

/// Set or, for `None`, remove
fn write(ctx: &mut ExecutionContext, name: &str, value: Option<Value>) -> Result<()> {
    match value {
        Some(value) => ctx.set_variable(name, value),
        None => ctx.remove_variable(name).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::CodeBlock;
    use crate::testing::Harness;

    fn var(op: &str, target: &str) -> CodeBlock {
        CodeBlock::action(BlockKind::Variable, op, target)
    }

    #[test]
    fn test_set_then_add() {
        let harness = Harness::new();
        let mut ctx = harness.context();

        assert!(var("SET", "x").with_param(params::VALUE, 5.0).execute(&mut ctx).is_success());
        assert!(var("ADD", "x").with_param(params::VALUE, 3.0).execute(&mut ctx).is_success());

        assert_eq!(ctx.local("x"), Some(&Value::Number(8.0)));
        assert!(ctx.globals().is_empty());
    }

    #[test]
    fn test_arithmetic() {
        let harness = Harness::new();
        let mut ctx = harness.context();

        var("SUBTRACT", "n").with_param(params::VALUE, 4.0).execute(&mut ctx);
        assert_eq!(ctx.get_variable("n"), Some(Value::Number(-4.0)));

        var("MULTIPLY", "n").with_param(params::VALUE, "2.5").execute(&mut ctx);
        var("MODULO", "n").with_param(params::VALUE, 3.0).execute(&mut ctx);
        assert_eq!(ctx.get_variable("n"), Some(Value::Number(-1.0)));

        var("INCREMENT", "n").execute(&mut ctx);
        var("DECREMENT", "n").with_param(params::VALUE, 10.0).execute(&mut ctx);
        assert_eq!(ctx.get_variable("n"), Some(Value::Number(-10.0)));
    }

    #[test]
    fn test_division_by_zero_leaves_value() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        ctx.set_variable("x", 6.0).unwrap();

        let result = var("DIVIDE", "x").with_param(params::VALUE, 0.0).execute(&mut ctx);
        assert!(matches!(result.as_error(), Some(ScriptError::Operation(_))));
        assert_eq!(ctx.get_variable("x"), Some(Value::Number(6.0)));

        let result = var("ADD", "x").with_param(params::VALUE, "lots").execute(&mut ctx);
        assert!(result.is_error());
    }

    #[test]
    fn test_swap_is_an_involution() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        ctx.set_variable("a", 1.0).unwrap();
        ctx.set_variable("b", 2.0).unwrap();

        let swap = var("swap", "a").with_param(params::SOURCE, "b");
        assert!(swap.execute(&mut ctx).is_success());
        assert_eq!(ctx.get_variable("a"), Some(Value::Number(2.0)));
        assert_eq!(ctx.get_variable("b"), Some(Value::Number(1.0)));

        assert!(swap.execute(&mut ctx).is_success());
        assert_eq!(ctx.get_variable("a"), Some(Value::Number(1.0)));
        assert_eq!(ctx.get_variable("b"), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_swap_with_system_variable_changes_nothing() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        ctx.set_variable("a", 1.0).unwrap();

        let result = var("SWAP", "a").with_param(OTHER, "system:weather").execute(&mut ctx);
        assert!(matches!(result.as_error(), Some(ScriptError::ScopeViolation(_))));
        assert_eq!(ctx.get_variable("a"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_text_list_and_bool_operations() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        ctx.set_variable("name", "Alex").unwrap();

        var("APPEND", "greeting").with_param(params::VALUE, "Hi {name}").execute(&mut ctx);
        assert_eq!(ctx.get_variable("greeting"), Some(Value::from("Hi Alex")));

        var("TOGGLE", "lights").execute(&mut ctx);
        assert_eq!(ctx.get_variable("lights"), Some(Value::Bool(true)));
        assert!(var("TOGGLE", "name").execute(&mut ctx).is_error());

        var("PUSH", "queue").with_param(params::VALUE, "a").execute(&mut ctx);
        var("PUSH", "queue").with_param(params::VALUE, 2.0).execute(&mut ctx);
        assert_eq!(
            ctx.get_variable("queue"),
            Some(Value::List(vec![Value::from("a"), Value::Number(2.0)]))
        );
        assert!(var("PUSH", "name").with_param(params::VALUE, 1.0).execute(&mut ctx).is_error());
    }

    #[test]
    fn test_copy_and_remove() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        ctx.set_variable("global:coins", 10.0).unwrap();

        assert!(var("COPY", "wallet").with_param(params::SOURCE, "coins").execute(&mut ctx).is_success());
        assert_eq!(ctx.local("wallet"), Some(&Value::Number(10.0)));
        assert!(var("COPY", "x").with_param(params::SOURCE, "nothing").execute(&mut ctx).is_error());
        assert!(var("COPY", "x").execute(&mut ctx).is_error());

        assert!(var("REMOVE", "global:coins").execute(&mut ctx).is_success());
        assert!(ctx.globals().get("coins").is_none());
        assert!(var("REMOVE", "system:time").execute(&mut ctx).is_error());
    }

    #[test]
    fn test_restore_from_backup() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        ctx.set_variable("x", 1.0).unwrap();

        assert!(var("RESTORE", "x").execute(&mut ctx).is_error());

        var("SET", "x")
            .with_param(params::VALUE, 99.0)
            .with_param(params::BACKUP, true)
            .execute(&mut ctx);
        assert_eq!(ctx.get_variable("x"), Some(Value::Number(99.0)));

        assert!(var("RESTORE", "x").execute(&mut ctx).is_success());
        assert_eq!(ctx.get_variable("x"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_system_write_is_scope_violation() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        let result = var("SET", "system:weather").with_param(params::VALUE, "sun").execute(&mut ctx);
        assert!(matches!(result.as_error(), Some(ScriptError::ScopeViolation(_))));
    }
}
