//! Deep dependency collection.

use std::collections::HashSet;

use super::value::Value;

/// Read every reachable reactive property under `value` so the active
/// watcher subscribes to all of them.
///
/// Each container is visited once, which keeps cyclic graphs finite. Frozen
/// containers are skipped along with everything beneath them.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    walk(value, &mut seen);
}

fn walk(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Record(record) => {
            if record.is_frozen() || !seen.insert(record.addr()) {
                return;
            }
            for key in record.keys() {
                walk(&record.get(&key), seen);
            }
        }
        Value::Sequence(sequence) => {
            if sequence.is_frozen() || !seen.insert(sequence.addr()) {
                return;
            }
            for item in sequence.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}
