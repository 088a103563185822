//! Substituting unknowns once the values they point at exist

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::eval::lookup;
use crate::value::{Resource, Value};

/// Replace every unknown in `value` by looking its reference up in `env`
///
/// `env` is the enclosing level of the reconcile tree, so references see
/// the backend-returned values of siblings that already finished. A
/// reference that still cannot be satisfied is an error. Resource attrs
/// are left alone; they only become known when the backend returns them.
pub fn resolve(value: &Value, env: &Environment) -> Result<Value> {
    Ok(match value {
        Value::Unknown(unknown) => match lookup(&unknown.reference, env) {
            Value::Unknown(_) => {
                return Err(Error::unresolved(
                    &unknown.name,
                    "referenced value is not available",
                ));
            }
            found => found,
        },
        Value::Map(m) => Value::Map(
            m.iter()
                .map(|(k, v)| Ok((k.clone(), resolve(v, env)?)))
                .collect::<Result<_>>()?,
        ),
        Value::List(l) => Value::List(l.iter().map(|v| resolve(v, env)).collect::<Result<_>>()?),
        Value::Immutable(inner) => Value::immutable(resolve(inner, env)?),
        Value::Resource(r) => Value::from(Resource {
            identifier: resolve(&r.identifier, env)?,
            config: resolve(&r.config, env)?,
            ..(**r).clone()
        }),
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Provider, Reference, Unknown};

    fn unknown(alias: &str, path: &[&str]) -> Value {
        Value::Unknown(Unknown::new(Reference::component(alias, path.iter().copied())))
    }

    #[test]
    fn test_resolves_nested_unknowns() {
        let mut env = Environment::default();
        let bucket = Resource::new(Provider::new("cloud"), "bucket", "assets")
            .with_attrs(Value::map([("arn", Value::from("arn:assets"))]));
        env.values.insert("bucket".into(), Value::from(bucket));

        let policy = Resource::new(Provider::new("cloud"), "policy", "p").with_config(Value::map([(
            "targets",
            Value::List(vec![unknown("bucket", &["attrs", "arn"])]),
        )]));

        let resolved = resolve(&Value::from(policy), &env).unwrap();
        let config = &resolved.as_resource().unwrap().config;
        assert_eq!(
            config,
            &Value::map([("targets", Value::List(vec![Value::from("arn:assets")]))])
        );
        assert!(resolved.is_known());
    }

    #[test]
    fn test_unsatisfied_reference_is_an_error() {
        // `db` is missing from the environment entirely
        let err = resolve(&unknown("db", &["attrs", "host"]), &Environment::default()).unwrap_err();

        assert!(err.category().is_node_local());
        assert!(matches!(
            err,
            Error::Unresolved { ref reference, .. } if reference == "db.attrs.host"
        ));
    }

    #[test]
    fn test_known_values_pass_through() {
        let value = Value::map([("a", Value::immutable(Value::from("x")))]);
        assert_eq!(resolve(&value, &Environment::default()).unwrap(), value);
    }
}
