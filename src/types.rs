//! The structural type lattice (`SPEC_FULL.md` §4.2).
//!
//! Types are attached to IR nodes so the builder can reject obviously
//! mistyped graphs early; `matches` lets strategies and tests check a
//! runtime [`Value`](crate::value::Value) against a declared [`Type`].

use crate::value::Value;

/// A structural type: a sum of `Any`, bounded `Int`/`Float`, `Bool`, and
/// `List` with an element type and optional length bounds.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Any,
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    Bool,
    List {
        element: Box<Type>,
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
}

impl Type {
    #[must_use]
    pub fn int() -> Self {
        Type::Int { min: None, max: None }
    }

    #[must_use]
    pub fn float() -> Self {
        Type::Float { min: None, max: None }
    }

    #[must_use]
    pub fn list_of(element: Type) -> Self {
        Type::List {
            element: Box::new(element),
            min_len: None,
            max_len: None,
        }
    }

    /// Does `value` belong to this type? Numeric ranges and list-length
    /// bounds are inclusive at both ends.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Any, _) => true,
            (Type::Bool, Value::Bool(_)) => true,
            (Type::Int { min, max }, Value::Int(i)) => {
                min.is_none_or(|m| *i >= m) && max.is_none_or(|m| *i <= m)
            }
            (Type::Float { min, max }, Value::Float(x)) => {
                min.is_none_or(|m| *x >= m) && max.is_none_or(|m| *x <= m)
            }
            // An integer is a valid member of an unbounded/compatible float range too,
            // since arithmetic in this system silently widens Int -> Float.
            (Type::Float { min, max }, Value::Int(i)) => {
                let x = *i as f64;
                min.is_none_or(|m| x >= m) && max.is_none_or(|m| x <= m)
            }
            (Type::List { element, min_len, max_len }, Value::List(items)) => {
                min_len.is_none_or(|m| items.len() >= m)
                    && max_len.is_none_or(|m| items.len() <= m)
                    && items.iter().all(|item| element.matches(item))
            }
            _ => false,
        }
    }
}

/// Infer the most specific type for a literal value (`SPEC_FULL.md` §4.2).
/// Used only when building `Constant` nodes. Ordering: `Bool` before
/// `Int` before `Float`; an empty list defaults to `List(Any)`.
#[must_use]
pub fn infer(value: &Value) -> Type {
    match value {
        Value::Bool(_) => Type::Bool,
        Value::Int(i) => Type::Int {
            min: Some(*i),
            max: Some(*i),
        },
        Value::Float(x) => Type::Float {
            min: Some(*x),
            max: Some(*x),
        },
        Value::Str(_) => Type::Any,
        Value::List(items) => match items.first() {
            Some(first) => Type::list_of(infer(first)),
            None => Type::list_of(Type::Any),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything() {
        assert!(Type::Any.matches(&Value::Int(5)));
        assert!(Type::Any.matches(&Value::Bool(true)));
        assert!(Type::Any.matches(&Value::List(vec![])));
    }

    #[test]
    fn bool_is_disjoint_from_int() {
        assert!(Type::Bool.matches(&Value::Bool(true)));
        assert!(!Type::Bool.matches(&Value::Int(1)));
        assert!(!Type::int().matches(&Value::Bool(true)));
    }

    #[test]
    fn int_range_inclusive_both_ends() {
        let t = Type::Int { min: Some(0), max: Some(10) };
        assert!(t.matches(&Value::Int(0)));
        assert!(t.matches(&Value::Int(10)));
        assert!(!t.matches(&Value::Int(11)));
        assert!(!t.matches(&Value::Int(-1)));
    }

    #[test]
    fn list_length_bounds_inclusive() {
        let t = Type::List {
            element: Box::new(Type::int()),
            min_len: Some(1),
            max_len: Some(2),
        };
        assert!(!t.matches(&Value::List(vec![])));
        assert!(t.matches(&Value::List(vec![Value::Int(1)])));
        assert!(t.matches(&Value::List(vec![Value::Int(1), Value::Int(2)])));
        assert!(!t.matches(&Value::List(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3)
        ])));
    }

    #[test]
    fn infer_order_bool_int_float() {
        assert_eq!(infer(&Value::Bool(true)), Type::Bool);
        assert_eq!(
            infer(&Value::Int(3)),
            Type::Int { min: Some(3), max: Some(3) }
        );
        assert_eq!(
            infer(&Value::Float(1.5)),
            Type::Float { min: Some(1.5), max: Some(1.5) }
        );
    }

    #[test]
    fn infer_list_recurses_into_first_element() {
        let t = infer(&Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(
            t,
            Type::List {
                element: Box::new(Type::Int { min: Some(1), max: Some(1) }),
                min_len: None,
                max_len: None,
            }
        );
    }

    #[test]
    fn infer_empty_list_defaults_to_any() {
        let t = infer(&Value::List(vec![]));
        assert_eq!(
            t,
            Type::List {
                element: Box::new(Type::Any),
                min_len: None,
                max_len: None,
            }
        );
    }
}
