//! Dot-delimited path getters.
//!
//! A path such as `"user.profile.name"` reads one segment at a time from
//! the context value. Each record segment goes through the reactive read,
//! so evaluating a path subscribes the watcher to every property on the way
//! down. Numeric segments index into sequences.

use smallvec::SmallVec;

use super::value::Value;

/// A parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGetter {
    segments: SmallVec<[String; 4]>,
}

impl PathGetter {
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk the path from `root`. A missing segment yields `Null`.
    pub fn resolve(&self, root: &Value) -> Value {
        let mut current = root.clone();
        for segment in &self.segments {
            current = match &current {
                Value::Record(record) => record.get(segment),
                Value::Sequence(sequence) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| sequence.get(index))
                    .unwrap_or(Value::Null),
                _ => return Value::Null,
            };
        }
        current
    }
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '$' | '_')
}

/// Parse a path; `None` if it contains anything besides word characters,
/// `$` and `.`.
pub fn parse_path(path: &str) -> Option<PathGetter> {
    if !path.chars().all(is_path_char) {
        return None;
    }
    Some(PathGetter {
        segments: path.split('.').map(str::to_string).collect(),
    })
}
