use std::cmp::Ordering;
use std::rc::Rc;

use serde_json::Map;
use serde_json::Number;
use weave_dom::NodeId;
use weave_model::JsonValue;
use weave_model::Segment;
use weave_templates::Operator;
use weave_templates::Template;

use crate::contexts::ContextId;

/// The result of evaluating an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Undefined,
    Json(JsonValue),
    /// A template passed as a view attribute, rendered where it is used.
    Template(TemplateValue),
    /// An element reference stored by an `as` hook.
    Node(NodeId),
    /// `NaN` or an infinity. JSON has no such numbers, so they become `null`
    /// only when stored.
    NonFinite(f64),
}

/// A template together with the context it was captured in, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateValue {
    pub template: Rc<Template>,
    pub closure: Option<ContextId>,
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Json(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Json(JsonValue::String(value.to_string()))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Json(JsonValue::Bool(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Value::Json(number(value))
        } else {
            Value::NonFinite(value)
        }
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Json(JsonValue::from(value))
    }
}

impl Value {
    pub const NULL: Value = Value::Json(JsonValue::Null);

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Value::Json(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Vec<JsonValue>> {
        self.as_json().and_then(JsonValue::as_array)
    }

    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Json(JsonValue::Null))
    }

    /// Lossy conversion for storing in the model; non-data values become `null`.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Json(value) => value.clone(),
            Value::Undefined | Value::Template(_) | Value::Node(_) | Value::NonFinite(_) => {
                JsonValue::Null
            }
        }
    }

    #[must_use]
    pub fn into_json(self) -> JsonValue {
        match self {
            Value::Json(value) => value,
            Value::Undefined | Value::Template(_) | Value::Node(_) | Value::NonFinite(_) => {
                JsonValue::Null
            }
        }
    }

    /// Native truthiness: `undefined`, `null`, `false`, `0`, `NaN` and `""` are false.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Json(value) => match value {
                JsonValue::Null => false,
                JsonValue::Bool(b) => *b,
                JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
                JsonValue::String(s) => !s.is_empty(),
                JsonValue::Array(_) | JsonValue::Object(_) => true,
            },
            Value::Template(_) | Value::Node(_) => true,
            Value::NonFinite(n) => !n.is_nan(),
        }
    }

    /// Truthiness used by `if`, `unless` and `else if`: an empty array is false.
    #[must_use]
    pub fn is_template_truthy(&self) -> bool {
        match self {
            Value::Json(JsonValue::Array(items)) => !items.is_empty(),
            _ => self.is_truthy(),
        }
    }

    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Json(JsonValue::Null) => 0.0,
            Value::Json(JsonValue::Bool(b)) => f64::from(u8::from(*b)),
            Value::Json(JsonValue::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Value::Json(JsonValue::String(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    0.0
                } else {
                    s.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Json(JsonValue::Array(items)) => match items.as_slice() {
                [] => 0.0,
                [only] => Value::Json(only.clone()).to_number(),
                _ => f64::NAN,
            },
            Value::NonFinite(n) => *n,
            _ => f64::NAN,
        }
    }

    /// Text as rendered into markup.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Value::Undefined | Value::Node(_) | Value::Template(_) => String::new(),
            Value::Json(value) => json_text(value),
            Value::NonFinite(n) if n.is_nan() => "NaN".to_string(),
            Value::NonFinite(n) if *n > 0.0 => "Infinity".to_string(),
            Value::NonFinite(_) => "-Infinity".to_string(),
        }
    }

    /// Loose (`==`) equality.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Json(JsonValue::String(a)), Value::Json(JsonValue::String(b))) => a == b,
            (Value::Json(a @ (JsonValue::Array(_) | JsonValue::Object(_))), Value::Json(b))
            | (Value::Json(b), Value::Json(a @ (JsonValue::Array(_) | JsonValue::Object(_)))) => {
                if b.is_array() || b.is_object() {
                    a == b
                } else {
                    Value::Json(JsonValue::String(json_text(a))).loose_eq(&Value::Json(b.clone()))
                }
            }
            (Value::Json(_) | Value::NonFinite(_), Value::Json(_) | Value::NonFinite(_)) => {
                self.to_number() == other.to_number()
            }
            _ => self == other,
        }
    }

    /// Strict (`===`) equality.
    #[must_use]
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Json(JsonValue::Number(a)), Value::Json(JsonValue::Number(b))) => {
                a.as_f64() == b.as_f64()
            }
            // NaN is never equal, not even to itself.
            (Value::NonFinite(a), Value::NonFinite(b)) => a == b,
            _ => self == other,
        }
    }

    /// Read `segments` below this value. Missing members are `undefined`.
    #[must_use]
    pub fn member(self, segments: &[Segment]) -> Value {
        let mut current = self;
        for segment in segments {
            let Value::Json(json) = current else {
                return Value::Undefined;
            };
            current = match (json, segment) {
                (JsonValue::Object(mut map), segment) => map
                    .remove(&segment.to_string())
                    .map_or(Value::Undefined, Value::Json),
                (JsonValue::Array(items), Segment::Key(key)) if key == "length" => {
                    Value::from(items.len())
                }
                (JsonValue::String(text), Segment::Key(key)) if key == "length" => {
                    Value::from(text.chars().count())
                }
                (JsonValue::Array(mut items), segment) => match segment.as_index() {
                    Some(index) if index < items.len() => Value::Json(items.swap_remove(index)),
                    _ => Value::Undefined,
                },
                _ => Value::Undefined,
            };
        }
        current
    }

    /// The model path segment this value names when used as a computed key.
    #[must_use]
    pub fn to_segment(&self) -> Option<Segment> {
        match self {
            Value::Json(JsonValue::String(key)) => Some(Segment::from(key.as_str())),
            Value::Json(JsonValue::Number(n)) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Segment::Index),
            Value::Json(JsonValue::Bool(b)) => Some(Segment::Key(b.to_string())),
            _ => None,
        }
    }
}

/// Build a JSON number, folding integral values to integers. Non-finite
/// values have no JSON form and become `null`.
#[allow(clippy::cast_possible_truncation)]
fn number(value: f64) -> JsonValue {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return JsonValue::from(value as i64);
    }
    Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

#[allow(clippy::cast_possible_truncation)]
fn number_text(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => (f as i64).to_string(),
        Some(f) => f.to_string(),
        None => String::new(),
    }
}

fn json_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => number_text(n),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(items) => items.iter().map(json_text).collect::<Vec<_>>().join(","),
        JsonValue::Object(_) => "[object Object]".to_string(),
    }
}

fn is_stringish(value: &Value) -> bool {
    matches!(
        value,
        Value::Json(JsonValue::String(_) | JsonValue::Array(_) | JsonValue::Object(_))
    )
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Json(JsonValue::String(a)), Value::Json(JsonValue::String(b))) => Some(a.cmp(b)),
        _ => a.to_number().partial_cmp(&b.to_number()),
    }
}

/// Apply an operator whose operands are already evaluated.
///
/// `&&`, `||` and `?:` short-circuit in the evaluator and only reach here with
/// every operand computed.
#[must_use]
pub fn apply_operator(op: Operator, args: &[Value]) -> Value {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
    let (a, b) = (arg(0), arg(1));
    match op {
        Operator::Not => Value::from(!a.is_truthy()),
        Operator::Negate => Value::from(-a.to_number()),
        Operator::Positive => Value::from(a.to_number()),
        Operator::Multiply => Value::from(a.to_number() * b.to_number()),
        Operator::Divide => Value::from(a.to_number() / b.to_number()),
        Operator::Remainder => Value::from(a.to_number() % b.to_number()),
        Operator::Subtract => Value::from(a.to_number() - b.to_number()),
        Operator::Add => {
            if is_stringish(&a) || is_stringish(&b) {
                Value::Json(JsonValue::String(a.to_text() + &b.to_text()))
            } else {
                Value::from(a.to_number() + b.to_number())
            }
        }
        Operator::Less => Value::from(compare(&a, &b) == Some(Ordering::Less)),
        Operator::Greater => Value::from(compare(&a, &b) == Some(Ordering::Greater)),
        Operator::LessEqual => Value::from(matches!(
            compare(&a, &b),
            Some(Ordering::Less | Ordering::Equal)
        )),
        Operator::GreaterEqual => Value::from(matches!(
            compare(&a, &b),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        Operator::Equal => Value::from(a.loose_eq(&b)),
        Operator::NotEqual => Value::from(!a.loose_eq(&b)),
        Operator::StrictEqual => Value::from(a.strict_eq(&b)),
        Operator::StrictNotEqual => Value::from(!a.strict_eq(&b)),
        Operator::And => {
            if a.is_truthy() {
                b
            } else {
                a
            }
        }
        Operator::Or => {
            if a.is_truthy() {
                a
            } else {
                b
            }
        }
        Operator::Conditional => {
            if a.is_truthy() {
                b
            } else {
                arg(2)
            }
        }
    }
}

/// Collect evaluated members into a JSON object.
pub(crate) fn object(properties: Vec<(String, Value)>) -> Value {
    let map: Map<String, JsonValue> = properties
        .into_iter()
        .map(|(key, value)| (key, value.into_json()))
        .collect();
    Value::Json(JsonValue::Object(map))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn v(value: JsonValue) -> Value {
        Value::Json(value)
    }

    mod truthiness {
        use super::*;

        #[test]
        fn test_native() {
            assert!(!Value::Undefined.is_truthy());
            assert!(!v(json!(0)).is_truthy());
            assert!(!v(json!("")).is_truthy());
            assert!(v(json!([])).is_truthy());
            assert!(v(json!({})).is_truthy());
            assert!(v(json!("0")).is_truthy());
        }

        #[test]
        fn test_template_empty_array_is_false() {
            assert!(!v(json!([])).is_template_truthy());
            assert!(v(json!([0])).is_template_truthy());
            assert!(v(json!({})).is_template_truthy());
        }
    }

    mod text {
        use super::*;

        #[test]
        fn test_numbers() {
            assert_eq!(v(json!(3)).to_text(), "3");
            assert_eq!(v(json!(1.0)).to_text(), "1");
            assert_eq!(v(json!(0.5)).to_text(), "0.5");
        }

        #[test]
        fn test_nullish_is_empty() {
            assert_eq!(Value::Undefined.to_text(), "");
            assert_eq!(Value::NULL.to_text(), "");
        }

        #[test]
        fn test_array_joins() {
            assert_eq!(v(json!(["a", null, 2])).to_text(), "a,,2");
        }
    }

    mod operators {
        use super::*;

        #[test]
        fn test_add_numbers_and_strings() {
            assert_eq!(
                apply_operator(Operator::Add, &[v(json!(1)), v(json!(2))]),
                v(json!(3))
            );
            assert_eq!(
                apply_operator(Operator::Add, &[v(json!("a")), v(json!(2))]),
                v(json!("a2"))
            );
        }

        #[test]
        fn test_loose_equality() {
            assert!(v(json!(1)).loose_eq(&v(json!("1"))));
            assert!(Value::Undefined.loose_eq(&Value::NULL));
            assert!(!v(json!(0)).loose_eq(&Value::NULL));
            assert!(!v(json!(1)).strict_eq(&v(json!("1"))));
            assert!(v(json!(1)).strict_eq(&v(json!(1.0))));
        }

        #[test]
        fn test_compare_strings_lexically() {
            assert_eq!(
                apply_operator(Operator::Less, &[v(json!("10")), v(json!("9"))]),
                v(json!(true))
            );
            assert_eq!(
                apply_operator(Operator::Less, &[v(json!(10)), v(json!(9))]),
                v(json!(false))
            );
        }

        #[test]
        fn test_and_or_return_operands() {
            assert_eq!(
                apply_operator(Operator::Or, &[v(json!("")), v(json!("x"))]),
                v(json!("x"))
            );
            assert_eq!(
                apply_operator(Operator::And, &[v(json!(0)), v(json!("x"))]),
                v(json!(0))
            );
        }

        #[test]
        fn test_non_finite_results_keep_native_semantics() {
            let infinity = apply_operator(Operator::Divide, &[v(json!(1)), v(json!(0))]);
            assert_eq!(infinity.to_text(), "Infinity");
            assert_eq!(
                apply_operator(Operator::Greater, &[infinity.clone(), v(json!(5))]),
                v(json!(true))
            );
            assert_eq!(infinity.to_json(), JsonValue::Null);

            let nan = apply_operator(Operator::Divide, &[v(json!(0)), v(json!(0))]);
            assert_eq!(nan.to_text(), "NaN");
            assert!(!nan.is_truthy());
            assert!(!nan.loose_eq(&Value::NULL));
            assert!(!nan.loose_eq(&nan));
            assert!(!nan.strict_eq(&nan));
            assert_eq!(
                apply_operator(Operator::Negate, &[infinity]).to_text(),
                "-Infinity"
            );
        }
    }

    #[test]
    fn test_member_access() {
        let value = v(json!({"items": [{"name": "a"}], "s": "abc"}));
        assert_eq!(
            value.clone().member(&[Segment::from("items"), Segment::Index(0), Segment::from("name")]),
            v(json!("a"))
        );
        assert_eq!(
            value.clone().member(&[Segment::from("items"), Segment::from("length")]),
            v(json!(1))
        );
        assert_eq!(value.member(&[Segment::from("missing")]), Value::Undefined);
    }
}
