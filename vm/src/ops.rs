//! Binary/unary operator semantics for the `infix`/`prefix` opcodes (spec
//! §4.3).

use filly_core::Value;
use log::warn;

/// `==, !=, <, >, <=, >=, + - * / %` (int), `+` (string concat), `&& ||`
/// (truthiness). Division/modulo by zero returns `0` and logs, matching
/// spec §7.
pub fn apply_infix(op: &str, l: Value, r: Value) -> Value {
    match op {
        "==" => Value::from(compare_eq(&l, &r)),
        "!=" => Value::from(!compare_eq(&l, &r)),
        "<" => Value::from(compare(&l, &r).is_lt()),
        ">" => Value::from(compare(&l, &r).is_gt()),
        "<=" => Value::from(compare(&l, &r).is_le()),
        ">=" => Value::from(compare(&l, &r).is_ge()),
        "+" if is_stringy(&l) || is_stringy(&r) => Value::from(l.as_str() + &r.as_str()),
        "+" => Value::from(l.as_int().wrapping_add(r.as_int())),
        "-" => Value::from(l.as_int().wrapping_sub(r.as_int())),
        "*" => Value::from(l.as_int().wrapping_mul(r.as_int())),
        "/" => {
            let rhs = r.as_int();
            if rhs == 0 {
                warn!("division by zero, result coerced to 0");
                Value::Int(0)
            } else {
                Value::from(l.as_int() / rhs)
            }
        }
        "%" => {
            let rhs = r.as_int();
            if rhs == 0 {
                warn!("modulo by zero, result coerced to 0");
                Value::Int(0)
            } else {
                Value::from(l.as_int() % rhs)
            }
        }
        "&&" => Value::from(l.truthy() && r.truthy()),
        "||" => Value::from(l.truthy() || r.truthy()),
        other => {
            warn!("unknown infix operator `{other}`, result coerced to 0");
            Value::Int(0)
        }
    }
}

pub fn apply_prefix(op: &str, x: Value) -> Value {
    match op {
        "-" => Value::from(-x.as_int()),
        "!" => Value::from(!x.truthy()),
        other => {
            warn!("unknown prefix operator `{other}`, result coerced to 0");
            Value::Int(0)
        }
    }
}

fn is_stringy(v: &Value) -> bool {
    matches!(v, Value::Str(_))
}

fn compare_eq(l: &Value, r: &Value) -> bool {
    if is_stringy(l) || is_stringy(r) {
        l.as_str() == r.as_str()
    } else {
        l.as_int() == r.as_int()
    }
}

fn compare(l: &Value, r: &Value) -> std::cmp::Ordering {
    if is_stringy(l) || is_stringy(r) {
        l.as_str().cmp(&r.as_str())
    } else {
        l.as_int().cmp(&r.as_int())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_concat_via_plus() {
        let v = apply_infix("+", Value::from("a"), Value::from(1i64));
        assert_eq!(v, Value::from("a1"));
    }

    #[test]
    fn int_arithmetic_via_plus() {
        assert_eq!(apply_infix("+", Value::from(2i64), Value::from(3i64)), Value::from(5i64));
    }

    #[test]
    fn division_by_zero_is_zero_not_panic() {
        assert_eq!(apply_infix("/", Value::from(1i64), Value::from(0i64)), Value::from(0i64));
    }

    #[test]
    fn comparisons_use_string_order_when_either_side_is_string() {
        assert_eq!(apply_infix("<", Value::from("a"), Value::from("b")), Value::from(true));
    }

    #[test]
    fn prefix_negate_and_not() {
        assert_eq!(apply_prefix("-", Value::from(5i64)), Value::from(-5i64));
        assert_eq!(apply_prefix("!", Value::from(0i64)), Value::from(true));
    }
}
