//! Update masks: which fields of a resource an update touches

use crate::diff::{Diff, Operation};
use serde::{Deserialize, Serialize};

/// How a masked field changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOperation {
    Update,
    Delete,
}

/// A changed field, with the changed fields nested below it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub operation: FieldOperation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_fields: Vec<Field>,
}

impl Field {
    pub fn new(name: impl Into<String>, operation: FieldOperation) -> Self {
        Self {
            name: name.into(),
            operation,
            sub_fields: Vec::new(),
        }
    }

    pub fn with_sub_fields(mut self, sub_fields: Vec<Field>) -> Self {
        self.sub_fields = sub_fields;
        self
    }

    /// Dotted paths of every leaf field, for logs
    pub fn paths(fields: &[Self]) -> Vec<String> {
        let mut out = Vec::new();
        for field in fields {
            if field.sub_fields.is_empty() {
                out.push(field.name.clone());
            } else {
                out.extend(
                    Self::paths(&field.sub_fields)
                        .into_iter()
                        .map(|p| format!("{}.{p}", field.name)),
                );
            }
        }
        out
    }
}

/// Fields changed by `diff`
///
/// A resource diff masks its config. Maps and lists produce one field per
/// changed entry, named by key or index; everything else is a leaf and
/// produces no fields of its own.
pub fn derive_mask(diff: &Diff) -> Vec<Field> {
    match diff {
        Diff::Resource(d) => derive_mask(&d.config),
        Diff::Map(d) => d
            .entries
            .iter()
            .filter_map(|(name, entry)| field(name.clone(), entry))
            .collect(),
        Diff::List(d) => d
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| field(i.to_string(), entry))
            .collect(),
        _ => Vec::new(),
    }
}

fn field(name: String, entry: &Diff) -> Option<Field> {
    let operation = match entry.operation() {
        Operation::Noop => return None,
        Operation::Delete => FieldOperation::Delete,
        _ => FieldOperation::Update,
    };
    Some(Field {
        name,
        operation,
        sub_fields: derive_mask(entry),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::value::{Provider, Resource, Value};

    fn bucket(config: Value) -> Value {
        Value::from(Resource::new(Provider::new("cloud"), "bucket", "assets").with_config(config))
    }

    #[test]
    fn test_only_changed_fields_are_masked() {
        let from = bucket(Value::map([("name", Value::from("foo")), ("acl", Value::from("private"))]));
        let to = bucket(Value::map([("name", Value::from("bar")), ("acl", Value::from("private"))]));

        let mask = derive_mask(&diff(&from, &to).unwrap());
        assert_eq!(mask, vec![Field::new("name", FieldOperation::Update)]);
    }

    #[test]
    fn test_removed_key_is_delete() {
        let from = bucket(Value::map([("name", Value::from("foo")), ("acl", Value::from("private"))]));
        let to = bucket(Value::map([("name", Value::from("foo"))]));

        let mask = derive_mask(&diff(&from, &to).unwrap());
        assert_eq!(mask, vec![Field::new("acl", FieldOperation::Delete)]);
    }

    #[test]
    fn test_nested_containers_produce_sub_fields() {
        let from = bucket(Value::map([(
            "lifecycle",
            Value::map([
                ("days", Value::from("30")),
                ("rules", Value::List(vec![Value::from("a"), Value::from("b")])),
            ]),
        )]));
        let to = bucket(Value::map([(
            "lifecycle",
            Value::map([
                ("days", Value::from("30")),
                ("rules", Value::List(vec![Value::from("a"), Value::from("c")])),
            ]),
        )]));

        let mask = derive_mask(&diff(&from, &to).unwrap());
        let expected = vec![
            Field::new("lifecycle", FieldOperation::Update).with_sub_fields(vec![
                Field::new("rules", FieldOperation::Update)
                    .with_sub_fields(vec![Field::new("1", FieldOperation::Update)]),
            ]),
        ];
        assert_eq!(mask, expected);
        assert_eq!(Field::paths(&mask), vec!["lifecycle.rules.1"]);
    }

    #[test]
    fn test_leaves_terminate() {
        let d = diff(&Value::from("a"), &Value::from("b")).unwrap();
        assert!(derive_mask(&d).is_empty());

        let from = bucket(Value::map([("region", Value::immutable(Value::from("eu")))]));
        let to = bucket(Value::map([("region", Value::immutable(Value::from("us")))]));
        let mask = derive_mask(&diff(&from, &to).unwrap());
        assert_eq!(mask, vec![Field::new("region", FieldOperation::Update)]);
    }
}
