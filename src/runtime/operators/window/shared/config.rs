use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::common::WindowError;
use crate::runtime::expression::{parse_expression, Expression, FieldPathExpression};
use crate::runtime::operators::window::aggregates::{get_aggregate_registry, AccumulatorKind};
use crate::runtime::operators::window::index::{DocumentBound, RangeBound, TimeUnit, WindowBounds};
use crate::runtime::operators::window::window_tuning::WindowOperatorSpec;

pub type WindowId = usize;

/// Raw `$setWindowFields` stage definition as written by users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetWindowFieldsSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_by: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<Map<String, JsonValue>>,
    pub output: Map<String, JsonValue>,
}

impl SetWindowFieldsSpec {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse $setWindowFields spec (json)")
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("failed to parse $setWindowFields spec (yaml)")
    }
}

#[derive(Debug, Clone)]
pub struct SortKeyPart {
    pub path: String,
    pub expr: Arc<dyn Expression>,
    pub descending: bool,
}

/// One output field: a window function, its input and its window.
#[derive(Debug, Clone)]
pub struct WindowFunctionConfig {
    pub window_id: WindowId,
    pub output_field: String,
    pub kind: AccumulatorKind,
    pub input: Arc<dyn Expression>,
    pub bounds: WindowBounds,
}

/// Validated, typed stage configuration.
#[derive(Debug, Clone)]
pub struct WindowOperatorConfig {
    pub partition_by: Option<Arc<dyn Expression>>,
    pub sort_by: Vec<SortKeyPart>,
    /// In declaration order, which is also the evaluation order.
    pub windows: Vec<WindowFunctionConfig>,
    pub tuning: WindowOperatorSpec,
}

impl WindowOperatorConfig {
    pub fn try_from_spec(spec: &SetWindowFieldsSpec) -> Result<Self, WindowError> {
        let partition_by = spec.partition_by.as_ref().map(parse_expression).transpose()?;
        let sort_by = parse_sort_by(spec.sort_by.as_ref())?;

        let mut windows = Vec::with_capacity(spec.output.len());
        for (window_id, (field, func_spec)) in spec.output.iter().enumerate() {
            let window = parse_output(window_id, field, func_spec)?;
            if window.bounds.is_range() && sort_by.len() != 1 {
                return Err(WindowError::invalid_window(
                    field,
                    "range-based windows require a sortBy with exactly one field",
                ));
            }
            windows.push(window);
        }

        Ok(Self {
            partition_by,
            sort_by,
            windows,
            tuning: WindowOperatorSpec::default(),
        })
    }

    pub fn with_tuning(mut self, tuning: WindowOperatorSpec) -> Self {
        self.tuning = tuning;
        self
    }
}

fn parse_sort_by(sort_by: Option<&Map<String, JsonValue>>) -> Result<Vec<SortKeyPart>, WindowError> {
    let Some(sort_by) = sort_by.filter(|s| !s.is_empty()) else {
        return Err(WindowError::InvalidSortBy("sortBy is required and must not be empty".to_string()));
    };
    sort_by
        .iter()
        .map(|(path, direction)| {
            let descending = match direction.as_f64() {
                Some(d) if d == 1.0 => false,
                Some(d) if d == -1.0 => true,
                _ => {
                    return Err(WindowError::InvalidSortBy(format!(
                        "direction for '{}' must be 1 or -1, got {}",
                        path, direction
                    )))
                }
            };
            Ok(SortKeyPart {
                path: path.clone(),
                expr: Arc::new(FieldPathExpression::new(path)?),
                descending,
            })
        })
        .collect()
}

fn parse_output(window_id: WindowId, field: &str, spec: &JsonValue) -> Result<WindowFunctionConfig, WindowError> {
    if field.is_empty() || field.starts_with('$') || field.contains('.') {
        return Err(WindowError::InvalidSpec(format!(
            "output field name '{}' must be non-empty, must not start with '$' and must not contain '.'",
            field
        )));
    }
    let JsonValue::Object(spec) = spec else {
        return Err(WindowError::InvalidSpec(format!(
            "output field '{}' must be specified as an object",
            field
        )));
    };

    let mut function = None;
    let mut window = None;
    for (key, value) in spec {
        if key.starts_with('$') {
            if function.replace((key.as_str(), value)).is_some() {
                return Err(WindowError::InvalidSpec(format!(
                    "output field '{}' must name exactly one window function",
                    field
                )));
            }
        } else if key == "window" {
            window = Some(value);
        } else {
            return Err(WindowError::InvalidSpec(format!(
                "unrecognized key '{}' in output field '{}'",
                key, field
            )));
        }
    }

    let Some((name, argument)) = function else {
        return Err(WindowError::InvalidSpec(format!(
            "output field '{}' must name a window function",
            field
        )));
    };
    let kind = get_aggregate_registry()
        .get_kind(name)
        .ok_or_else(|| WindowError::UnknownFunction {
            field: field.to_string(),
            function: name.to_string(),
        })?;

    let (input, bounds) = match (argument, window) {
        // legacy form: {$fn: {input: <expr>, documents|range: [...], unit: ...}}
        (JsonValue::Object(arg), None) if arg.contains_key("input") => {
            let mut bounds_spec = Map::new();
            for (key, value) in arg {
                match key.as_str() {
                    "input" => {}
                    "documents" | "range" | "unit" => {
                        bounds_spec.insert(key.clone(), value.clone());
                    }
                    other => {
                        return Err(WindowError::InvalidSpec(format!(
                            "unrecognized key '{}' in arguments of output field '{}'",
                            other, field
                        )))
                    }
                }
            }
            (arg.get("input").unwrap_or(&JsonValue::Null), parse_window(field, &JsonValue::Object(bounds_spec))?)
        }
        (argument, Some(window)) => (argument, parse_window(field, window)?),
        (argument, None) => (argument, WindowBounds::default()),
    };

    Ok(WindowFunctionConfig {
        window_id,
        output_field: field.to_string(),
        kind,
        input: parse_expression(input)?,
        bounds,
    })
}

fn parse_window(field: &str, spec: &JsonValue) -> Result<WindowBounds, WindowError> {
    let JsonValue::Object(spec) = spec else {
        return Err(WindowError::invalid_window(field, "window must be an object"));
    };
    if let Some(key) = spec
        .keys()
        .find(|k| !matches!(k.as_str(), "documents" | "range" | "unit"))
    {
        return Err(WindowError::invalid_window(field, format!("unrecognized window key '{}'", key)));
    }

    let bounds = match (spec.get("documents"), spec.get("range"), spec.get("unit")) {
        (Some(_), Some(_), _) => {
            return Err(WindowError::invalid_window(
                field,
                "window must not specify both 'documents' and 'range'",
            ))
        }
        (Some(_), None, Some(_)) => {
            return Err(WindowError::invalid_window(field, "'unit' is only valid with 'range'"))
        }
        (None, None, Some(_)) => {
            return Err(WindowError::invalid_window(field, "'unit' requires 'range'"))
        }
        (None, None, None) => WindowBounds::default(),
        (Some(documents), None, None) => {
            let [lower, upper] = bound_pair(field, documents)?;
            WindowBounds::Documents {
                lower: parse_document_bound(field, lower)?,
                upper: parse_document_bound(field, upper)?,
            }
        }
        (None, Some(range), unit) => {
            let [lower, upper] = bound_pair(field, range)?;
            let unit = unit.map(|u| parse_unit(field, u)).transpose()?;
            WindowBounds::Range {
                lower: parse_range_bound(field, lower)?,
                upper: parse_range_bound(field, upper)?,
                unit,
            }
        }
    };
    bounds.validate(field)?;
    Ok(bounds)
}

fn bound_pair<'a>(field: &str, spec: &'a JsonValue) -> Result<[&'a JsonValue; 2], WindowError> {
    match spec {
        JsonValue::Array(items) if items.len() == 2 => Ok([&items[0], &items[1]]),
        _ => Err(WindowError::invalid_window(
            field,
            "bounds must be an array of exactly two elements",
        )),
    }
}

fn parse_document_bound(field: &str, bound: &JsonValue) -> Result<DocumentBound, WindowError> {
    match bound {
        JsonValue::String(s) if s == "unbounded" => Ok(DocumentBound::Unbounded),
        JsonValue::String(s) if s == "current" => Ok(DocumentBound::Current),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(k), _) => Ok(DocumentBound::Offset(k)),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok(DocumentBound::Offset(f as i64))
            }
            _ => Err(WindowError::invalid_window(
                field,
                format!("document bounds must be integers, got {}", n),
            )),
        },
        other => Err(WindowError::invalid_window(
            field,
            format!("document bound must be 'unbounded', 'current' or an integer, got {}", other),
        )),
    }
}

fn parse_range_bound(field: &str, bound: &JsonValue) -> Result<RangeBound, WindowError> {
    match bound {
        JsonValue::String(s) if s == "unbounded" => Ok(RangeBound::Unbounded),
        JsonValue::String(s) if s == "current" => Ok(RangeBound::Current),
        JsonValue::Number(n) => n
            .as_f64()
            .map(RangeBound::Offset)
            .ok_or_else(|| WindowError::invalid_window(field, format!("invalid range bound {}", n))),
        other => Err(WindowError::invalid_window(
            field,
            format!("range bound must be 'unbounded', 'current' or a number, got {}", other),
        )),
    }
}

fn parse_unit(field: &str, unit: &JsonValue) -> Result<TimeUnit, WindowError> {
    unit.as_str()
        .and_then(TimeUnit::parse)
        .ok_or_else(|| WindowError::invalid_window(field, format!("unsupported time unit {}", unit)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::common::ErrorKind;

    fn config(spec: JsonValue) -> Result<WindowOperatorConfig, WindowError> {
        let spec: SetWindowFieldsSpec = serde_json::from_value(spec).unwrap();
        WindowOperatorConfig::try_from_spec(&spec)
    }

    fn config_err(spec: JsonValue) -> WindowError {
        config(spec).unwrap_err()
    }

    #[test]
    fn test_parse_full_spec() {
        let cfg = config(json!({
            "partitionBy": "$ticker",
            "sortBy": {"_id": 1},
            "output": {
                "runningAvg": {"$avg": "$price", "window": {"documents": ["unbounded", "current"]}},
                "runningAvgLead": {"$avg": "$price", "window": {"documents": ["unbounded", 3]}},
                "total": {"$sum": "$price"}
            }
        }))
        .unwrap();
        assert!(cfg.partition_by.is_some());
        assert_eq!(cfg.sort_by.len(), 1);
        assert!(!cfg.sort_by[0].descending);
        let names: Vec<_> = cfg.windows.iter().map(|w| w.output_field.as_str()).collect();
        assert_eq!(names, vec!["runningAvg", "runningAvgLead", "total"]);
        assert_eq!(cfg.windows[1].window_id, 1);
        assert_eq!(
            cfg.windows[1].bounds,
            WindowBounds::Documents {
                lower: DocumentBound::Unbounded,
                upper: DocumentBound::Offset(3)
            }
        );
        assert_eq!(cfg.windows[2].bounds, WindowBounds::default());
    }

    #[test]
    fn test_legacy_argument_form() {
        let cfg = config(json!({
            "partitionBy": "$arr",
            "sortBy": {"_id": 1},
            "output": {"a": {"$sum": {"input": "$int_field", "documents": ["unbounded", "current"]}}}
        }))
        .unwrap();
        assert_eq!(cfg.windows[0].kind, AccumulatorKind::Sum);
        assert_eq!(
            cfg.windows[0].bounds,
            WindowBounds::Documents {
                lower: DocumentBound::Unbounded,
                upper: DocumentBound::Current
            }
        );
    }

    #[test]
    fn test_range_with_unit() {
        let cfg = config(json!({
            "sortBy": {"ts": -1},
            "output": {"r": {"$max": "$v", "window": {"range": [-2, "current"], "unit": "hour"}}}
        }))
        .unwrap();
        assert!(cfg.sort_by[0].descending);
        assert_eq!(
            cfg.windows[0].bounds,
            WindowBounds::Range {
                lower: RangeBound::Offset(-2.0),
                upper: RangeBound::Current,
                unit: Some(TimeUnit::Hour)
            }
        );
    }

    #[test]
    fn test_sort_by_required() {
        let err = config_err(json!({"output": {"a": {"$sum": 1}}}));
        assert!(matches!(err, WindowError::InvalidSortBy(_)));
        let err = config_err(json!({"sortBy": {}, "output": {}}));
        assert!(matches!(err, WindowError::InvalidSortBy(_)));
        let err = config_err(json!({"sortBy": {"a": 2}, "output": {}}));
        assert!(matches!(err, WindowError::InvalidSortBy(_)));
    }

    #[test]
    fn test_unknown_function() {
        let err = config_err(json!({"sortBy": {"a": 1}, "output": {"x": {"$median": "$a"}}}));
        assert_eq!(
            err,
            WindowError::UnknownFunction {
                field: "x".to_string(),
                function: "$median".to_string()
            }
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_malformed_outputs() {
        let base = |output: JsonValue| json!({"sortBy": {"a": 1}, "output": output});
        for output in [
            json!({"x": 5}),
            json!({"x": {}}),
            json!({"x": {"$sum": "$a", "$avg": "$a"}}),
            json!({"x": {"$sum": "$a", "extra": 1}}),
            json!({"$x": {"$sum": "$a"}}),
            json!({"a.b": {"$sum": "$a"}}),
            json!({"x": {"$sum": "$a", "window": {"documents": [0]}}}),
            json!({"x": {"$sum": "$a", "window": {"documents": [0, 1], "range": [0, 1]}}}),
            json!({"x": {"$sum": "$a", "window": {"documents": [0, 1], "unit": "second"}}}),
            json!({"x": {"$sum": "$a", "window": {"unit": "second"}}}),
            json!({"x": {"$sum": "$a", "window": {"documents": [0.5, 1]}}}),
            json!({"x": {"$sum": "$a", "window": {"documents": ["current", "sometime"]}}}),
            json!({"x": {"$sum": "$a", "window": {"range": [-1, 1], "unit": "month"}}}),
            json!({"x": {"$sum": "$a", "window": {"rows": [0, 1]}}}),
        ] {
            let err = config_err(base(output.clone()));
            assert_eq!(err.kind(), ErrorKind::Configuration, "{output}");
        }
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = config_err(json!({
            "sortBy": {"a": 1},
            "output": {"x": {"$avg": "$a", "window": {"documents": [5, 3]}}}
        }));
        assert!(matches!(err, WindowError::InvalidWindow { .. }));
        let err = config_err(json!({
            "sortBy": {"a": 1},
            "output": {"x": {"$avg": "$a", "window": {"range": ["current", -1]}}}
        }));
        assert!(matches!(err, WindowError::InvalidWindow { .. }));
    }

    #[test]
    fn test_range_requires_single_sort_key() {
        let err = config_err(json!({
            "sortBy": {"a": 1, "b": 1},
            "output": {"x": {"$sum": "$a", "window": {"range": [-1, 1]}}}
        }));
        assert!(matches!(err, WindowError::InvalidWindow { ref field, .. } if field == "x"));
        // document windows are fine over a compound sort
        assert!(config(json!({
            "sortBy": {"a": 1, "b": -1},
            "output": {"x": {"$sum": "$a", "window": {"documents": [-1, 1]}}}
        }))
        .is_ok());
    }

    #[test]
    fn test_from_yaml_keeps_declaration_order() {
        let spec = SetWindowFieldsSpec::from_yaml(
            "partitionBy: $ticker\nsortBy:\n  _id: 1\noutput:\n  zeta:\n    $sum: $price\n  alpha:\n    $count: {}\n",
        )
        .unwrap();
        let cfg = WindowOperatorConfig::try_from_spec(&spec).unwrap();
        let names: Vec<_> = cfg.windows.iter().map(|w| w.output_field.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(cfg.windows[1].kind, AccumulatorKind::Count);
    }

    #[test]
    fn test_from_json_rejects_unknown_top_level_keys() {
        assert!(SetWindowFieldsSpec::from_json(r#"{"sortBy": {"a": 1}, "output": {}, "extra": 1}"#).is_err());
    }
}
