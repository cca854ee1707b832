//! Structural diff between two JSON documents
//!
//! Objects are compared key by key and arrays index by index. Each leaf level
//! difference becomes one `Change` carrying the path from the document root.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of a path into a JSON document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A single difference between the stored and the new document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Change {
    /// Present only in the new document
    #[serde(rename = "N")]
    Added { path: Vec<PathSegment>, rhs: Value },
    /// Present only in the stored document
    #[serde(rename = "D")]
    Deleted { path: Vec<PathSegment>, lhs: Value },
    /// Present in both with different values
    #[serde(rename = "E")]
    Edited {
        path: Vec<PathSegment>,
        lhs: Value,
        rhs: Value,
    },
}

/// Computes the changes turning `lhs` into `rhs`; empty when they are equal
pub fn diff(lhs: &Value, rhs: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut path = Vec::new();
    diff_into(lhs, rhs, &mut path, &mut changes);
    changes
}

fn diff_into(lhs: &Value, rhs: &Value, path: &mut Vec<PathSegment>, out: &mut Vec<Change>) {
    match (lhs, rhs) {
        (Value::Object(left), Value::Object(right)) => {
            for (key, left_value) in left {
                path.push(PathSegment::Key(key.clone()));
                match right.get(key) {
                    Some(right_value) => diff_into(left_value, right_value, path, out),
                    None => out.push(Change::Deleted {
                        path: path.clone(),
                        lhs: left_value.clone(),
                    }),
                }
                path.pop();
            }
            for (key, right_value) in right {
                if !left.contains_key(key) {
                    path.push(PathSegment::Key(key.clone()));
                    out.push(Change::Added {
                        path: path.clone(),
                        rhs: right_value.clone(),
                    });
                    path.pop();
                }
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            let shared = left.len().min(right.len());
            for index in 0..shared {
                path.push(PathSegment::Index(index));
                diff_into(&left[index], &right[index], path, out);
                path.pop();
            }
            for (index, removed) in left.iter().enumerate().skip(shared) {
                path.push(PathSegment::Index(index));
                out.push(Change::Deleted {
                    path: path.clone(),
                    lhs: removed.clone(),
                });
                path.pop();
            }
            for (index, added) in right.iter().enumerate().skip(shared) {
                path.push(PathSegment::Index(index));
                out.push(Change::Added {
                    path: path.clone(),
                    rhs: added.clone(),
                });
                path.pop();
            }
        }
        _ if lhs == rhs => {}
        _ => out.push(Change::Edited {
            path: path.clone(),
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(k: &str) -> PathSegment {
        PathSegment::Key(k.to_string())
    }

    #[test]
    fn test_identical_documents_have_no_changes() {
        let doc = json!({"display": {"title": "Car"}, "assets": ["a.jpg"], "prices": {"cop": 10}});
        assert!(diff(&doc, &doc.clone()).is_empty());
    }

    #[test]
    fn test_nested_edit() {
        let changes = diff(
            &json!({"prices": {"cop": 10, "usd": 3}}),
            &json!({"prices": {"cop": 12, "usd": 3}}),
        );
        assert_eq!(
            changes,
            vec![Change::Edited {
                path: vec![key("prices"), key("cop")],
                lhs: json!(10),
                rhs: json!(12),
            }]
        );
    }

    #[test]
    fn test_added_and_deleted_keys() {
        let changes = diff(&json!({"a": 1, "b": 2}), &json!({"b": 2, "c": 3}));
        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&Change::Deleted {
            path: vec![key("a")],
            lhs: json!(1)
        }));
        assert!(changes.contains(&Change::Added {
            path: vec![key("c")],
            rhs: json!(3)
        }));
    }

    #[test]
    fn test_array_growth_and_shrink() {
        let grown = diff(&json!(["x"]), &json!(["x", "y"]));
        assert_eq!(
            grown,
            vec![Change::Added {
                path: vec![PathSegment::Index(1)],
                rhs: json!("y")
            }]
        );

        let shrunk = diff(&json!(["x", "y"]), &json!(["y"]));
        assert_eq!(shrunk.len(), 2);
    }

    #[test]
    fn test_first_extraction_against_empty_object() {
        let changes = diff(&json!({}), &json!({"title": "Car"}));
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_type_change_is_an_edit() {
        let changes = diff(&json!({"a": [1]}), &json!({"a": {"0": 1}}));
        assert!(matches!(changes[0], Change::Edited { .. }));
    }

    #[test]
    fn test_change_serialization_shape() {
        let change = Change::Edited {
            path: vec![key("items"), PathSegment::Index(2)],
            lhs: json!(1),
            rhs: json!(2),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value, json!({"kind": "E", "path": ["items", 2], "lhs": 1, "rhs": 2}));
        assert_eq!(serde_json::from_value::<Change>(value).unwrap(), change);
    }
}
