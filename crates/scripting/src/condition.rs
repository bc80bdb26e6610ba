//! Condition strings
//!
//! Blocks gate themselves with a tiny condition grammar, checked in this order:
//!
//! 1. empty or `true` → true
//! 2. `false` → false
//! 3. `exists:<name>` → the variable resolves in some scope
//! 4. `<name>==<value>` → textual form of the variable equals the literal
//!    (`8`, never `8.0`, for whole numbers)
//! 5. anything else → true
//!
//! Hitting the last rule logs a warning (see `warnpermissive`).

use crate::context::ExecutionContext;
use crate::error::ScriptError;

/// A parsed condition string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition<'a> {
    Always,
    Never,
    Exists(&'a str),
    /// Compares the variable's textual form with the literal as text.
    /// Whole numbers print without a fraction, so `x==8` matches after
    /// `SET x 5; ADD x 3` while `x==8.0` does not.
    Equals { name: &'a str, value: &'a str },
    /// Not part of the grammar; evaluates to true
    Unrecognized(&'a str),
}

impl<'a> Condition<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let text = raw.trim();

        if text.is_empty() || text == "true" {
            return Condition::Always;
        }
        if text == "false" {
            return Condition::Never;
        }
        if let Some(name) = text.strip_prefix("exists:") {
            return Condition::Exists(name.trim());
        }
        if let Some((name, value)) = text.split_once("==") {
            let name = name.trim();
            if !name.is_empty() {
                return Condition::Equals {
                    name,
                    value: value.trim(),
                };
            }
        }
        Condition::Unrecognized(text)
    }

    pub fn evaluate(&self, ctx: &ExecutionContext) -> bool {
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::Exists(name) => ctx.get_variable(name).is_some(),
            Condition::Equals { name, value } => ctx
                .get_variable(name)
                .map(|actual| actual.to_string() == *value)
                .unwrap_or(false),
            Condition::Unrecognized(text) => {
                if ctx.runtime().config().warn_permissive_conditions {
                    tracing::warn!("Unrecognized condition '{}' evaluates to true", text);
                }
                true
            }
        }
    }

    /// The problem with this condition, if it is malformed
    pub fn diagnose(&self) -> Option<ScriptError> {
        match self {
            Condition::Unrecognized(text) => Some(ScriptError::Condition(format!(
                "'{}' is not a recognized condition and always passes",
                text
            ))),
            Condition::Exists(name) if name.is_empty() => Some(ScriptError::Condition(
                "'exists:' without a variable name never passes".into(),
            )),
            _ => None,
        }
    }
}

/// Parse and evaluate a condition string
pub fn evaluate(raw: &str, ctx: &ExecutionContext) -> bool {
    Condition::parse(raw).evaluate(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GlobalVariables;
    use crate::effects::Collaborators;
    use crate::runtime::Runtime;
    use crate::value::Value;
    use housing_config::EngineConfig;

    fn context() -> ExecutionContext {
        let runtime = Runtime::start(EngineConfig::default(), Collaborators::detached());
        ExecutionContext::new(runtime, GlobalVariables::new())
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(Condition::parse(""), Condition::Always);
        assert_eq!(Condition::parse("  true "), Condition::Always);
        assert_eq!(Condition::parse("false"), Condition::Never);
        assert_eq!(Condition::parse("exists:a==b"), Condition::Exists("a==b"));
        assert_eq!(
            Condition::parse("x == 5"),
            Condition::Equals { name: "x", value: "5" }
        );
        assert_eq!(Condition::parse("x > 5"), Condition::Unrecognized("x > 5"));
        assert_eq!(Condition::parse("==5"), Condition::Unrecognized("==5"));
    }

    #[test]
    fn test_literals() {
        let ctx = context();
        assert!(evaluate("", &ctx));
        assert!(evaluate("true", &ctx));
        assert!(!evaluate("false", &ctx));
    }

    #[test]
    fn test_exists_checks_every_scope() {
        let mut ctx = context();
        assert!(!evaluate("exists:door", &ctx));

        ctx.set_variable("door", "open").unwrap();
        assert!(evaluate("exists:door", &ctx));

        ctx.set_variable("global:bell", true).unwrap();
        assert!(evaluate("exists:bell", &ctx));

        // Provided by the SYSTEM scope
        assert!(evaluate("exists:weather", &ctx));
        assert!(!evaluate("exists:", &ctx));
    }

    #[test]
    fn test_equality_uses_textual_form() {
        let mut ctx = context();
        assert!(!evaluate("x==8", &ctx));

        ctx.set_variable("x", Value::Number(8.0)).unwrap();
        assert!(evaluate("x==8", &ctx));
        assert!(evaluate("x == 8", &ctx));
        assert!(!evaluate("x==8.5", &ctx));
        assert!(!evaluate("x==8.0", &ctx));

        ctx.set_variable("name", "Alex").unwrap();
        assert!(evaluate("name==Alex", &ctx));
        assert!(!evaluate("name==alex", &ctx));
    }

    #[test]
    fn test_unrecognized_is_permissive() {
        let ctx = context();
        assert!(evaluate("score >= 10", &ctx));
        assert!(Condition::parse("score >= 10").diagnose().is_some());
        assert!(Condition::parse("exists:").diagnose().is_some());
        assert!(Condition::parse("x==1").diagnose().is_none());
    }
}
