//! Case-insensitive variable storage, shared by every scope in the system:
//! a [`Sequencer`](../../filly_vm/struct.Sequencer.html)'s locals, the
//! engine's global mirror, and the Event Registry's `MesP1..MesP4` seeding.

use rustc_hash::FxHashMap;

use crate::value::Value;

/// A flat name → value map with case-insensitive lookup (spec §3 "Variable",
/// §8 P7). Keys are stored lower-cased; the original case the script used is
/// not retained, matching the spec's silence on case-preserving iteration.
#[derive(Clone, Debug, Default)]
pub struct VarTable {
    vars: FxHashMap<String, Value>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(&Self::key(name))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(&Self::key(name))
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(Self::key(name), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(&Self::key(name))
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Auto-expanding array read/write helpers shared by scalar-array ops and the
/// `index`/`assign-array` interpreter opcodes (spec §3, §8 P8).
pub fn get_int_elem(arr: &[i64], i: usize) -> i64 {
    arr.get(i).copied().unwrap_or(0)
}

pub fn get_str_elem(arr: &[String], i: usize) -> String {
    arr.get(i).cloned().unwrap_or_default()
}

pub fn set_int_elem(arr: &mut Vec<i64>, i: usize, v: i64) {
    if i >= arr.len() {
        arr.resize(i + 1, 0);
    }
    arr[i] = v;
}

pub fn set_str_elem(arr: &mut Vec<String>, i: usize, v: String) {
    if i >= arr.len() {
        arr.resize(i + 1, String::new());
    }
    arr[i] = v;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_round_trip() {
        let mut t = VarTable::new();
        t.set("Foo", Value::from(1));
        assert_eq!(t.get("FOO"), Some(&Value::from(1)));
        assert_eq!(t.get("foo"), Some(&Value::from(1)));
    }

    #[test]
    fn int_array_auto_expands_with_zero_fill() {
        let mut arr = vec![1, 2];
        set_int_elem(&mut arr, 4, 9);
        assert_eq!(arr, vec![1, 2, 0, 0, 9]);
    }

    #[test]
    fn str_array_auto_expands_with_empty_fill() {
        let mut arr = vec!["a".to_string()];
        set_str_elem(&mut arr, 2, "z".to_string());
        assert_eq!(arr, vec!["a".to_string(), String::new(), "z".to_string()]);
    }

    #[test]
    fn out_of_bounds_read_returns_zero_value() {
        assert_eq!(get_int_elem(&[1, 2], 5), 0);
        assert_eq!(get_str_elem(&[], 0), "");
    }
}
