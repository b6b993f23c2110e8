//! Scalar helpers over `serde_json::Value` cells: numeric coercion, display form and grouping keys.

use serde_json::{Map, Number, Value};

/// One dataset row: field name to scalar cell. Field order is preserved.
pub type Row = Map<String, Value>;

/// Look up a field, treating a missing field as null.
pub fn cell<'a>(row: &'a Row, field: &str) -> &'a Value {
    row.get(field).unwrap_or(&Value::Null)
}

/// Numeric coercion used by comparisons and reductions.
///
/// JSON numbers coerce directly; strings coerce when their trimmed form parses as a finite
/// number. Everything else (null, booleans, empty strings, objects) fails coercion.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// String form of a cell, as used by substring operators and lexicographic sorting.
/// Integral floats print without a fractional part (`10.0` prints as `10`).
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            (_, _, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Key used for grouping. Distinguishes `1` from `"1"` and treats `1` and `1.0` alike.
pub fn group_key(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Number(_) => format!("n:{}", display_string(value)),
        Value::String(s) => format!("s:{}", s),
        Value::Bool(b) => format!("b:{}", b),
        other => format!("j:{}", other),
    }
}

pub fn is_null(value: &Value) -> bool {
    value.is_null()
}

/// Coerce a cell to a primitive scalar. Objects and arrays are stringified.
pub fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
        other => other.clone(),
    }
}

/// Build a JSON number from an aggregate result, keeping integral results integral.
pub fn number_value(v: f64) -> Value {
    if !v.is_finite() {
        return Value::Null;
    }
    if v.fract() == 0.0 && v.abs() < 9.0e15 {
        return Value::Number(Number::from(v as i64));
    }
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

/// Loose equality used by `equals`, `not_equals` and `in`: numeric when both sides coerce,
/// otherwise by display string. Null only equals null.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return a.is_null() && b.is_null();
    }
    match (to_number(a), to_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => display_string(a) == display_string(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(&json!(3)), Some(3.0));
        assert_eq!(to_number(&json!(" 2.5 ")), Some(2.5));
        assert_eq!(to_number(&json!("abc")), None);
        assert_eq!(to_number(&json!("")), None);
        assert_eq!(to_number(&json!(null)), None);
        assert_eq!(to_number(&json!(true)), None);
    }

    #[test]
    fn test_display_string_integral_float() {
        assert_eq!(display_string(&json!(10.0)), "10");
        assert_eq!(display_string(&json!(10.5)), "10.5");
        assert_eq!(display_string(&json!("x")), "x");
        assert_eq!(display_string(&Value::Null), "");
    }

    #[test]
    fn test_group_key_distinguishes_types() {
        assert_ne!(group_key(&json!(1)), group_key(&json!("1")));
        assert_eq!(group_key(&json!(1)), group_key(&json!(1.0)));
    }

    #[test]
    fn test_number_value_keeps_integers() {
        assert_eq!(number_value(30.0), json!(30));
        assert_eq!(number_value(2.5), json!(2.5));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }

    #[test]
    fn test_to_primitive_stringifies_objects() {
        assert_eq!(to_primitive(&json!({"a": 1})), json!("{\"a\":1}"));
        assert_eq!(to_primitive(&json!(4)), json!(4));
    }

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&json!(5), &json!("5")));
        assert!(loose_eq(&json!("a"), &json!("a")));
        assert!(!loose_eq(&json!(null), &json!("")));
        assert!(loose_eq(&json!(null), &json!(null)));
    }
}
