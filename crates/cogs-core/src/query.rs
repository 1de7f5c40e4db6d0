//! Sub-path queries into a document tree, evaluated as jq filters.
//!
//! `""` and `.` select the document root. Anything else is handed to jaq,
//! so pipes, `select`, slices and the rest of the jq language all work:
//! `.servers[] | select(.name == "b") | .env`.
//!
//! Path expressions are resolved back onto the original tree, which keeps
//! YAML tags and non-string keys intact. Keys that do not exist produce no
//! match rather than a null node. Filters that compute new values fall back
//! to converting each output.

use crate::CoreError;
use cogs_schema::tree;
use cogs_schema::Value;
use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, RcIter};
use jaq_json::Val;
use tracing::trace;

/// Evaluate `expr` against `root`, returning every output.
pub fn query(root: &Value, expr: &str) -> Result<Vec<Value>, CoreError> {
    let expr = expr.trim();
    if expr.is_empty() || expr == "." {
        return Ok(vec![root.clone()]);
    }
    let input = serde_json::to_value(root).map_err(|e| query_error(expr, e.to_string()))?;

    if let Ok(paths) = run(&format!("path({expr})"), &input) {
        return Ok(paths
            .iter()
            .filter_map(|path| lookup(root, path))
            .cloned()
            .collect());
    }
    trace!("'{expr}' is not a path expression, converting its outputs");
    let outputs = run(expr, &input).map_err(|reason| query_error(expr, reason))?;
    Ok(outputs.into_iter().map(tree::from_json).collect())
}

/// Evaluate `expr`, which must produce exactly one node.
pub fn query_one(root: &Value, expr: &str) -> Result<Value, CoreError> {
    let mut nodes = query(root, expr)?;
    if nodes.len() != 1 {
        return Err(CoreError::NonSingular(expr.to_owned()));
    }
    Ok(nodes.remove(0))
}

fn query_error(expr: &str, reason: String) -> CoreError {
    CoreError::Query {
        expr: expr.to_owned(),
        reason,
    }
}

/// Compile and run one filter over `input`, collecting its outputs.
fn run(code: &str, input: &serde_json::Value) -> Result<Vec<serde_json::Value>, String> {
    let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let arena = Arena::default();
    let modules = loader
        .load(&arena, File { code, path: () })
        .map_err(|errs| format!("{} syntax error(s)", errs.len()))?;
    let filter = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(|errs| format!("{} undefined name(s)", errs.len()))?;

    let inputs = RcIter::new(core::iter::empty());
    let outputs: Result<Vec<_>, _> = filter
        .run((Ctx::new([], &inputs), Val::from(input.clone())))
        .map(|out| out.map(serde_json::Value::from).map_err(|e| e.to_string()))
        .collect();
    outputs
}

/// Follow a jq path (an array of keys and indexes) through `root`.
fn lookup<'a>(root: &'a Value, path: &serde_json::Value) -> Option<&'a Value> {
    let mut node = root;
    for step in path.as_array()? {
        node = match (node, step) {
            // tags serialize as a single-key map named after the tag
            (Value::Tagged(tagged), serde_json::Value::String(key))
                if tagged.tag.to_string() == *key =>
            {
                &tagged.value
            }
            (Value::Mapping(map), serde_json::Value::String(key)) => {
                map.get(key.as_str()).or_else(|| {
                    // numeric and boolean keys are stringified on the way in
                    let scalar: Value = serde_yaml::from_str(key).ok()?;
                    map.get(&scalar)
                })?
            }
            (Value::Sequence(items), serde_json::Value::Number(index)) => {
                let len = i64::try_from(items.len()).ok()?;
                let index = index.as_i64()?;
                let index = if index < 0 { len + index } else { index };
                items.get(usize::try_from(index).ok()?)?
            }
            _ => return None,
        };
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Value {
        serde_yaml::from_str(
            r#"
nested:
  key: hello
  "dotted.key": dotted
servers:
  - name: a
    env: {PORT: 80}
  - name: b
    env: {PORT: 81}
1: one
secret: !vault {a: b}
"#,
        )
        .unwrap()
    }

    #[test]
    fn root_expressions() {
        let doc = doc();
        assert_eq!(query_one(&doc, "").unwrap(), doc);
        assert_eq!(query_one(&doc, " . ").unwrap(), doc);
    }

    #[test]
    fn key_chains() {
        let doc = doc();
        assert_eq!(query_one(&doc, ".nested.key").unwrap().as_str(), Some("hello"));
        assert_eq!(
            query_one(&doc, r#".nested."dotted.key""#).unwrap().as_str(),
            Some("dotted")
        );
        assert_eq!(
            query_one(&doc, r#".["nested"]["key"]"#).unwrap().as_str(),
            Some("hello")
        );
    }

    #[test]
    fn pipes_and_select() {
        let doc = doc();
        assert_eq!(
            query_one(&doc, ".nested | .key").unwrap().as_str(),
            Some("hello")
        );
        let server = query_one(&doc, r#".servers[] | select(.name == "b")"#).unwrap();
        assert_eq!(
            server.get("env").and_then(|env| env.get("PORT")).and_then(Value::as_u64),
            Some(81)
        );
    }

    #[test]
    fn sequence_indexes() {
        let doc = doc();
        assert_eq!(query_one(&doc, ".servers[0].name").unwrap().as_str(), Some("a"));
        assert_eq!(
            query_one(&doc, ".servers[-1].env.PORT").unwrap().as_u64(),
            Some(81)
        );
        assert!(query(&doc, ".servers[5]").unwrap().is_empty());
    }

    #[test]
    fn numeric_keys_match_unquoted() {
        let doc = doc();
        assert_eq!(query_one(&doc, r#".["1"]"#).unwrap().as_str(), Some("one"));
    }

    #[test]
    fn tags_survive_the_query() {
        let doc = doc();
        let node = query_one(&doc, ".secret").unwrap();
        assert!(matches!(node, Value::Tagged(_)));
    }

    #[test]
    fn computed_values_are_converted() {
        let doc = doc();
        let names = query_one(&doc, "[.servers[].name]").unwrap();
        assert_eq!(names, serde_yaml::from_str::<Value>("[a, b]").unwrap());
    }

    #[test]
    fn splat_is_non_singular() {
        let doc = doc();
        assert_eq!(query(&doc, ".servers[].name").unwrap().len(), 2);
        let err = query_one(&doc, ".servers[]").unwrap_err();
        assert_eq!(
            err.to_string(),
            "returned non singular result for path '.servers[]'"
        );
    }

    #[test]
    fn missing_key_is_non_singular() {
        let doc = doc();
        assert!(matches!(
            query_one(&doc, ".nested.absent"),
            Err(CoreError::NonSingular(_))
        ));
    }

    #[test]
    fn malformed_expressions() {
        let doc = doc();
        for expr in [".nested.[", ".servers[0", r#"."open"#, "undefined_fn(1)"] {
            assert!(
                matches!(query(&doc, expr), Err(CoreError::Query { .. })),
                "{expr} should not evaluate"
            );
        }
    }
}
