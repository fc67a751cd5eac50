use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::common::{Document, Value, WindowError};

/// Evaluates a value out of a single document.
///
/// Partition keys, sort keys and window function inputs are all expressions; the
/// window stage only depends on this contract.
pub trait Expression: Send + Sync + fmt::Debug {
    fn evaluate(&self, doc: &Document) -> Result<Value, WindowError>;
}

/// `$a.b.c` style field path.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPathExpression {
    path: Vec<String>,
}

impl FieldPathExpression {
    /// Builds a path from a dotted string without the leading `$`.
    pub fn new(dotted: &str) -> Result<Self, WindowError> {
        let path: Vec<String> = dotted.split('.').map(str::to_string).collect();
        if path.iter().any(|segment| segment.is_empty()) {
            return Err(WindowError::InvalidExpression {
                expr: format!("${}", dotted),
                reason: "field path segments must not be empty".to_string(),
            });
        }
        if path[0].starts_with('$') {
            return Err(WindowError::InvalidExpression {
                expr: format!("${}", dotted),
                reason: "variables are not supported".to_string(),
            });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }
}

// Arrays along the path fan out over their document elements.
fn traverse(value: &Value, rest: &[String]) -> Value {
    let Some((head, tail)) = rest.split_first() else {
        return value.clone();
    };
    match value {
        Value::Document(doc) => traverse(doc.get(head), tail),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| matches!(item, Value::Document(_) | Value::Array(_)))
                .map(|item| traverse(item, rest))
                .filter(|found| !found.is_missing())
                .collect(),
        ),
        _ => Value::Missing,
    }
}

impl Expression for FieldPathExpression {
    fn evaluate(&self, doc: &Document) -> Result<Value, WindowError> {
        match self.path.split_first() {
            Some((head, tail)) => Ok(traverse(doc.get(head), tail)),
            None => Ok(Value::Missing),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpression {
    value: Value,
}

impl LiteralExpression {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Expression for LiteralExpression {
    fn evaluate(&self, _doc: &Document) -> Result<Value, WindowError> {
        Ok(self.value.clone())
    }
}

/// Parses the JSON form of an expression.
pub fn parse_expression(json: &JsonValue) -> Result<Arc<dyn Expression>, WindowError> {
    match json {
        JsonValue::String(s) if s.starts_with('$') => {
            Ok(Arc::new(FieldPathExpression::new(&s[1..])?))
        }
        JsonValue::Object(map) => {
            if let Some(literal) = map.get("$literal") {
                if map.len() != 1 {
                    return Err(WindowError::InvalidExpression {
                        expr: json.to_string(),
                        reason: "$literal must be the only field".to_string(),
                    });
                }
                return Ok(Arc::new(LiteralExpression::new(Value::from(literal.clone()))));
            }
            if let Some(op) = map.keys().find(|k| k.starts_with('$')) {
                return Err(WindowError::InvalidExpression {
                    expr: json.to_string(),
                    reason: format!("unsupported operator {}", op),
                });
            }
            Ok(Arc::new(LiteralExpression::new(Value::from(json.clone()))))
        }
        other => Ok(Arc::new(LiteralExpression::new(Value::from(other.clone())))),
    }
}
