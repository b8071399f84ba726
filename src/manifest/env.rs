//! Scalar coercion and path expansion for manifest fields (FA-001).
//!
//! Env maps accept YAML strings, integers, floats and booleans; everything
//! else is a schema error. Path fields expand `~` and host environment
//! references before being resolved against the manifest directory.

use indexmap::IndexMap;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

/// Deserialize an env mapping, coercing scalar values to their string form.
pub(crate) fn env_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: IndexMap<String, serde_yaml::Value> = IndexMap::deserialize(deserializer)?;
    coerce_scalars(raw).map_err(D::Error::custom)
}

/// Deserialize a task env declaration: either a mapping of name to
/// description, or a bare list of names (each gets an `N/A` description).
pub(crate) fn task_env<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_yaml::Value::deserialize(deserializer)?;
    match raw {
        serde_yaml::Value::Sequence(items) => {
            let mut env = IndexMap::with_capacity(items.len());
            for item in items {
                match item {
                    serde_yaml::Value::String(name) => {
                        env.insert(name, "N/A".to_string());
                    }
                    other => {
                        return Err(D::Error::custom(format!(
                            "task env names must be strings, got: {}",
                            type_name(&other)
                        )))
                    }
                }
            }
            Ok(env)
        }
        serde_yaml::Value::Mapping(_) => {
            let map: IndexMap<String, serde_yaml::Value> =
                serde_yaml::from_value(raw).map_err(D::Error::custom)?;
            coerce_scalars(map).map_err(D::Error::custom)
        }
        other => Err(D::Error::custom(format!(
            "task env must be a mapping or a list of names, got: {}",
            type_name(&other)
        ))),
    }
}

/// Deserialize a field that accepts either a single scalar or a list.
pub(crate) fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => Ok(vec![value]),
        OneOrMany::Many(values) => Ok(values),
    }
}

fn coerce_scalars(
    raw: IndexMap<String, serde_yaml::Value>,
) -> Result<IndexMap<String, String>, String> {
    let mut env = IndexMap::with_capacity(raw.len());
    for (key, value) in raw {
        let coerced = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            other => {
                return Err(format!(
                    "env value for `{key}` must be a string, number, or boolean, got: {}",
                    type_name(&other)
                ))
            }
        };
        env.insert(key, coerced);
    }
    Ok(env)
}

fn type_name(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "boolean",
        serde_yaml::Value::Number(_) => "number",
        serde_yaml::Value::String(_) => "string",
        serde_yaml::Value::Sequence(_) => "sequence",
        serde_yaml::Value::Mapping(_) => "mapping",
        serde_yaml::Value::Tagged(_) => "tagged value",
    }
}

/// Expand `~` and host environment references in a path string, then
/// resolve it against `base` if it is still relative.
pub(crate) fn expand_path(raw: &str, base: &Path) -> PathBuf {
    let expanded = expand_env_vars(raw, |name| std::env::var(name).ok());
    let expanded = expand_user(&expanded, std::env::var("HOME").ok().as_deref());
    let path = PathBuf::from(expanded);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Replace a leading `~` or `~/` with the home directory. `~user` forms
/// are left untouched.
fn expand_user(raw: &str, home: Option<&str>) -> String {
    let Some(home) = home else {
        return raw.to_string();
    };
    if raw == "~" {
        home.to_string()
    } else if let Some(rest) = raw.strip_prefix("~/") {
        format!("{}/{}", home.trim_end_matches('/'), rest)
    } else {
        raw.to_string()
    }
}

/// Expand `$VAR` and `${VAR}` host environment references. Unknown
/// variables are left verbatim.
fn expand_env_vars(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pos = 0;
    while pos < raw.len() {
        let rest = &raw[pos..];
        if let Some(after) = rest.strip_prefix('$') {
            let (name, consumed) = if let Some(inner) = after.strip_prefix('{') {
                match inner.find('}') {
                    Some(end) => (&inner[..end], end + 3),
                    None => (&after[..0], 1),
                }
            } else {
                let end = after
                    .char_indices()
                    .find(|(_, c)| !c.is_ascii_alphanumeric() && *c != '_')
                    .map(|(i, _)| i)
                    .unwrap_or(after.len());
                (&after[..end], end + 1)
            };
            if !name.is_empty() {
                if let Some(value) = lookup(name) {
                    out.push_str(&value);
                    pos += consumed;
                    continue;
                }
                out.push_str(&raw[pos..pos + consumed]);
                pos += consumed;
                continue;
            }
            out.push('$');
            pos += 1;
        } else {
            let ch = rest.chars().next().unwrap();
            out.push(ch);
            pos += ch.len_utf8();
        }
    }
    out
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn fake_env(name: &str) -> Option<String> {
        match name {
            "DATA_ROOT" => Some("/srv/data".to_string()),
            "USER" => Some("worker".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_FA001_expand_env_vars_braced() {
        assert_eq!(
            expand_env_vars("${DATA_ROOT}/in", fake_env),
            "/srv/data/in"
        );
    }

    #[test]
    fn test_FA001_expand_env_vars_bare() {
        assert_eq!(expand_env_vars("$DATA_ROOT/in", fake_env), "/srv/data/in");
        assert_eq!(expand_env_vars("run-$USER", fake_env), "run-worker");
    }

    #[test]
    fn test_FA001_expand_env_vars_unknown_left_verbatim() {
        assert_eq!(expand_env_vars("$MISSING/x", fake_env), "$MISSING/x");
        assert_eq!(expand_env_vars("${MISSING}/x", fake_env), "${MISSING}/x");
    }

    #[test]
    fn test_FA001_expand_env_vars_lone_dollar() {
        assert_eq!(expand_env_vars("a$ b", fake_env), "a$ b");
    }

    #[test]
    fn test_FA001_expand_user_home() {
        assert_eq!(expand_user("~", Some("/home/w")), "/home/w");
        assert_eq!(expand_user("~/jobs", Some("/home/w")), "/home/w/jobs");
        assert_eq!(expand_user("~other/jobs", Some("/home/w")), "~other/jobs");
        assert_eq!(expand_user("~/jobs", None), "~/jobs");
    }

    #[test]
    fn test_FA001_expand_path_relative_joins_base() {
        let path = expand_path("sub/dir", Path::new("/base"));
        assert_eq!(path, PathBuf::from("/base/sub/dir"));
    }

    #[test]
    fn test_FA001_expand_path_absolute_kept() {
        let path = expand_path("/abs/dir", Path::new("/base"));
        assert_eq!(path, PathBuf::from("/abs/dir"));
    }

    #[test]
    fn test_FA001_coerce_scalars() {
        let yaml = r#"
A: text
B: 512
C: 0.3
D: true
"#;
        let raw: IndexMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml).unwrap();
        let env = coerce_scalars(raw).unwrap();
        assert_eq!(env["A"], "text");
        assert_eq!(env["B"], "512");
        assert_eq!(env["C"], "0.3");
        assert_eq!(env["D"], "true");
    }

    #[test]
    fn test_FA001_coerce_rejects_null() {
        let yaml = "A: null\n";
        let raw: IndexMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml).unwrap();
        let err = coerce_scalars(raw).unwrap_err();
        assert!(err.contains("`A`"));
        assert!(err.contains("null"));
    }

    #[test]
    fn test_FA001_coerce_rejects_nested() {
        let yaml = "A:\n  nested: true\n";
        let raw: IndexMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml).unwrap();
        let err = coerce_scalars(raw).unwrap_err();
        assert!(err.contains("mapping"));
    }
}
