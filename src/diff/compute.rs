//! The structural diff algorithm

use super::{Diff, ImmutableDiff, ListDiff, MapDiff, Operation, ResourceDiff, ScalarDiff, UnknownDiff};
use crate::error::{Error, Result};
use crate::value::{Provider, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Compare an observed value (`from`) with a desired one (`to`)
///
/// Pure and deterministic. Unknown values are never compared: if either
/// side is unknown the result is an unknown diff. `Nil` stands for the
/// zero value of the other side's type. Environments are not diffed here;
/// the diff scheduler assembles them as their children complete.
pub fn diff(from: &Value, to: &Value) -> Result<Diff> {
    match (from, to) {
        (Value::Unknown(_), _) | (_, Value::Unknown(_)) => Ok(Diff::Unknown(UnknownDiff {
            from: from.clone(),
            to: to.clone(),
        })),
        (Value::Nil, Value::Nil) => Ok(Diff::Nil),
        (Value::Nil, to) => diff(&to.zero_like(), to),
        (from, Value::Nil) => diff(from, &from.zero_like()),
        (Value::Immutable(f), Value::Immutable(t)) => immutable(f, t, from, to),
        (Value::Immutable(f), t) => immutable(f, t, from, to),
        (f, Value::Immutable(t)) => immutable(f, t, from, to),
        (Value::String(f), Value::String(t)) => Ok(Diff::String(scalar(f, t, String::is_empty))),
        (Value::Bool(f), Value::Bool(t)) => Ok(Diff::Bool(scalar(f, t, |b| !b))),
        (Value::Identifier(f), Value::Identifier(t)) => {
            Ok(Diff::Identifier(scalar(f, t, String::is_empty)))
        }
        (Value::File(f), Value::File(t)) => Ok(Diff::File(scalar(f, t, String::is_empty))),
        (Value::Provider(f), Value::Provider(t)) => {
            Ok(Diff::Provider(scalar(f, t, |p| *p == Provider::default())))
        }
        (Value::Map(f), Value::Map(t)) => map(f, t),
        (Value::List(f), Value::List(t)) => list(f, t),
        (Value::Resource(f), Value::Resource(t)) => Ok(Diff::Resource(Box::new(ResourceDiff {
            identifier: diff(&f.identifier, &t.identifier)?,
            config: diff(&f.config, &t.config)?,
            exists: diff(&Value::Bool(f.exists), &Value::Bool(t.exists))?,
            from: (**f).clone(),
            to: (**t).clone(),
        }))),
        (Value::Environment(_), Value::Environment(_)) => Err(Error::UnsupportedDiff("environment")),
        (f, t) => Err(Error::TypeMismatch {
            expected: f.kind(),
            found: t.kind(),
        }),
    }
}

fn scalar<T: Clone + PartialEq>(from: &T, to: &T, is_zero: impl Fn(&T) -> bool) -> ScalarDiff<T> {
    let operation = if from == to {
        Operation::Noop
    } else if is_zero(from) {
        Operation::Create
    } else if is_zero(to) {
        Operation::Delete
    } else {
        Operation::Update
    };
    ScalarDiff {
        from: from.clone(),
        to: to.clone(),
        operation,
    }
}

/// `inner_*` are the unwrapped values; `from`/`to` are kept as given so
/// only the side that was immutable reports a wrapper
fn immutable(inner_from: &Value, inner_to: &Value, from: &Value, to: &Value) -> Result<Diff> {
    Ok(Diff::Immutable(ImmutableDiff {
        inner: Box::new(diff(inner_from, inner_to)?),
        from: from.clone(),
        to: to.clone(),
    }))
}

fn map(from: &BTreeMap<String, Value>, to: &BTreeMap<String, Value>) -> Result<Diff> {
    let keys: BTreeSet<&String> = from.keys().chain(to.keys()).collect();
    let mut entries = BTreeMap::new();
    for key in keys {
        entries.insert(key.clone(), entry(from.get(key), to.get(key))?);
    }
    Ok(Diff::Map(MapDiff {
        from: from.clone(),
        to: to.clone(),
        entries,
    }))
}

fn list(from: &[Value], to: &[Value]) -> Result<Diff> {
    let entries = (0..from.len().max(to.len()))
        .map(|i| entry(from.get(i), to.get(i)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Diff::List(ListDiff {
        from: from.to_vec(),
        to: to.to_vec(),
        entries,
    }))
}

/// A key or index that may be missing on one side
fn entry(from: Option<&Value>, to: Option<&Value>) -> Result<Diff> {
    match (from, to) {
        (Some(f), Some(t)) => diff(f, t),
        (None, Some(t)) => one_sided(t, Operation::Create),
        (Some(f), None) => one_sided(f, Operation::Delete),
        (None, None) => Ok(Diff::Nil),
    }
}

/// Diff for a value present on one side only
///
/// Leaves carry `operation` even when the present value is a zero value,
/// so a key that only exists in `to` is always a `Create`.
fn one_sided(value: &Value, operation: Operation) -> Result<Diff> {
    let added = operation == Operation::Create;
    let sides = |present: Value, absent: Value| {
        if added { (absent, present) } else { (present, absent) }
    };

    Ok(match value {
        Value::Nil => Diff::Nil,
        Value::Unknown(_) => {
            let (from, to) = sides(value.clone(), Value::Nil);
            Diff::Unknown(UnknownDiff { from, to })
        }
        Value::String(s) => {
            let (from, to) = sides_of(added, s.clone(), String::new());
            Diff::String(ScalarDiff { from, to, operation })
        }
        Value::Identifier(s) => {
            let (from, to) = sides_of(added, s.clone(), String::new());
            Diff::Identifier(ScalarDiff { from, to, operation })
        }
        Value::File(s) => {
            let (from, to) = sides_of(added, s.clone(), String::new());
            Diff::File(ScalarDiff { from, to, operation })
        }
        Value::Bool(b) => {
            let (from, to) = sides_of(added, *b, false);
            Diff::Bool(ScalarDiff { from, to, operation })
        }
        Value::Provider(p) => {
            let (from, to) = sides_of(added, p.clone(), Provider::default());
            Diff::Provider(ScalarDiff { from, to, operation })
        }
        Value::Map(m) => {
            let entries = m
                .iter()
                .map(|(k, v)| Ok((k.clone(), one_sided(v, operation)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            let (from, to) = sides_of(added, m.clone(), BTreeMap::new());
            Diff::Map(MapDiff { from, to, entries })
        }
        Value::List(l) => {
            let entries = l
                .iter()
                .map(|v| one_sided(v, operation))
                .collect::<Result<Vec<_>>>()?;
            let (from, to) = sides_of(added, l.clone(), Vec::new());
            Diff::List(ListDiff { from, to, entries })
        }
        Value::Immutable(inner) => {
            let (from, to) = sides(value.clone(), value.zero_like());
            Diff::Immutable(ImmutableDiff {
                from,
                to,
                inner: Box::new(one_sided(inner, operation)?),
            })
        }
        Value::Resource(_) => {
            let (from, to) = sides(value.clone(), value.zero_like());
            diff(&from, &to)?
        }
        Value::Environment(_) => return Err(Error::UnsupportedDiff("environment")),
    })
}

fn sides_of<T>(added: bool, present: T, absent: T) -> (T, T) {
    if added { (absent, present) } else { (present, absent) }
}
