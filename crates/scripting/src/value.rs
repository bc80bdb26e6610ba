//! Values, scopes and block parameters
//!
//! Every value the interpreter touches is a [`Value`]. The set of kinds is
//! closed so handlers match exhaustively.

use housing_core::{EntityRef, Location};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Dynamically typed script value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<Value>),
    Entity(EntityRef),
    Location(Location),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Entity(_) => "entity",
            Value::Location(_) => "location",
        }
    }

    /// Numeric view; text is parsed, bools count as 1/0
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::List(_) | Value::Entity(_) | Value::Location(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" => Some(true),
                "false" | "no" | "off" => Some(false),
                _ => None,
            },
            Value::List(_) | Value::Entity(_) | Value::Location(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Location view; text in `world:x,y,z` form is parsed
    pub fn as_location(&self) -> Option<Location> {
        match self {
            Value::Location(location) => Some(location.clone()),
            Value::Text(s) => Location::parse(s),
            _ => None,
        }
    }

    /// Narrowest value for a raw editor string
    pub fn infer(raw: &str) -> Value {
        let trimmed = raw.trim();
        match trimmed {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => match trimmed.parse::<f64>() {
                Ok(n) if !trimmed.is_empty() => Value::Number(n),
                _ => Value::Text(raw.to_string()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Entity(entity) => write!(f, "{}", entity),
            Value::Location(location) => write!(f, "{}", location),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<EntityRef> for Value {
    fn from(entity: EntityRef) -> Self {
        Value::Entity(entity)
    }
}

impl From<Location> for Value {
    fn from(location: Location) -> Self {
        Value::Location(location)
    }
}

/// Variable scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Lives for one execution context
    Local,
    /// Owned by the script/house, persists across runs
    Global,
    /// Read-only, computed on access
    System,
}

impl Scope {
    pub fn prefix(self) -> &'static str {
        match self {
            Scope::Local => "local:",
            Scope::Global => "global:",
            Scope::System => "system:",
        }
    }

    /// Split an explicit scope prefix off a variable name
    ///
    /// `None` means the name carries no prefix.
    pub fn split(name: &str) -> (Option<Scope>, &str) {
        for scope in [Scope::Local, Scope::Global, Scope::System] {
            if let Some(rest) = name.strip_prefix(scope.prefix()) {
                return (Some(scope), rest);
            }
        }
        (None, name)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scope::Local => "LOCAL",
            Scope::Global => "GLOBAL",
            Scope::System => "SYSTEM",
        };
        f.write_str(name)
    }
}

/// A resolved variable together with the scope it was found in
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
    pub scope: Scope,
}

/// Block parameter map
///
/// Owned by a single block; the editor and the engine go through the same
/// getters and setters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: BTreeMap<String, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Parameters::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Textual form of a parameter
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_number)
    }

    /// Integral parameter; fractional numbers are rejected
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.number(key)
            .filter(|n| n.fract() == 0.0 && n.is_finite())
            .map(|n| n as i64)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// Boolean switch, absent or unparsable means off
    pub fn flag(&self, key: &str) -> bool {
        self.bool(key).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries whose key starts with `prefix`, with the prefix removed
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.values
            .iter()
            .filter_map(move |(k, v)| k.strip_prefix(prefix).map(|rest| (rest, v)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Number(8.0).to_string(), "8");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(
            Value::List(vec![Value::from("a"), Value::Number(1.0)]).to_string(),
            "[a, 1]"
        );
        assert_eq!(
            Value::Location(Location::new("world", 1.0, 2.0, 3.0)).to_string(),
            "world:1,2,3"
        );
    }

    #[test]
    fn test_value_coercions() {
        assert_eq!(Value::from(" 4.5 ").as_number(), Some(4.5));
        assert_eq!(Value::from("abc").as_number(), None);
        assert_eq!(Value::Bool(true).as_number(), Some(1.0));
        assert_eq!(Value::from("Yes").as_bool(), Some(true));
        assert_eq!(Value::Number(0.0).as_bool(), Some(false));
        assert_eq!(Value::List(vec![]).as_bool(), None);
        assert_eq!(
            Value::from("world:1,2,3").as_location(),
            Some(Location::new("world", 1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn test_value_inference() {
        assert_eq!(Value::infer("5"), Value::Number(5.0));
        assert_eq!(Value::infer("true"), Value::Bool(true));
        assert_eq!(Value::infer("hello"), Value::Text("hello".into()));
        assert_eq!(Value::infer(""), Value::Text(String::new()));
    }

    #[test]
    fn test_scope_split() {
        assert_eq!(Scope::split("global:coins"), (Some(Scope::Global), "coins"));
        assert_eq!(Scope::split("system:time"), (Some(Scope::System), "time"));
        assert_eq!(Scope::split("local:x"), (Some(Scope::Local), "x"));
        assert_eq!(Scope::split("x"), (None, "x"));
    }

    #[test]
    fn test_parameter_getters() {
        let params = Parameters::new()
            .with("amount", 3.0)
            .with("ratio", "0.5")
            .with("notify", "true")
            .with("arg.count", 2.0)
            .with("arg.name", "bob");

        assert_eq!(params.integer("amount"), Some(3));
        assert_eq!(params.integer("ratio"), None);
        assert_eq!(params.number("ratio"), Some(0.5));
        assert!(params.flag("notify"));
        assert!(!params.flag("missing"));
        assert_eq!(params.text("amount").as_deref(), Some("3"));

        let args: Vec<_> = params.with_prefix("arg.").map(|(k, _)| k).collect();
        assert_eq!(args, vec!["count", "name"]);
    }
}
