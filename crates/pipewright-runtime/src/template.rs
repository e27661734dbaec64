//! Configuration resolution against the run context.
//!
//! Task configuration is resolved just before dispatch, against the snapshot
//! the task will also receive in its input envelope.
//!
//! # Rules
//! - A string that is exactly one plain path keeps the referenced value's type:
//!   `"{{ fetch.items }}"` becomes the array itself.
//! - Mixed text with only plain paths is substituted directly; strings are
//!   inserted raw and other values as compact JSON.
//! - Anything else (filters, expressions, `{% %}` blocks) is rendered with
//!   minijinja in strict mode. Plain paths inside it are checked first so that
//!   a missing one is reported as `PathNotFound` rather than a render error;
//!   names bound by a block (loop variables, `set` targets) are left to the
//!   engine.
//! - Objects and arrays are walked recursively. Other values pass through.

use minijinja::{Environment, UndefinedBehavior};
use pipewright_workflow::references::{
  bound_names, expressions, has_blocks, is_plain_path, root_segment, sole_expression,
};
use serde_json::Value;

use crate::context::ContextSnapshot;
use crate::error::TaskErrorKind;

/// Resolve every template reference inside `config`.
pub fn resolve_config(config: &Value, context: &ContextSnapshot) -> Result<Value, TaskErrorKind> {
  let renderer = Renderer::new(context);
  renderer.resolve(config)
}

struct Renderer<'a> {
  env: Environment<'static>,
  context: &'a ContextSnapshot,
  globals: minijinja::Value,
}

impl<'a> Renderer<'a> {
  fn new(context: &'a ContextSnapshot) -> Self {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    Self {
      env,
      context,
      globals: minijinja::Value::from_serialize(context.as_map()),
    }
  }

  fn resolve(&self, value: &Value) -> Result<Value, TaskErrorKind> {
    match value {
      Value::String(text) => self.resolve_string(text),
      Value::Array(items) => items
        .iter()
        .map(|item| self.resolve(item))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array),
      Value::Object(map) => map
        .iter()
        .map(|(key, item)| Ok((key.clone(), self.resolve(item)?)))
        .collect::<Result<serde_json::Map<_, _>, TaskErrorKind>>()
        .map(Value::Object),
      other => Ok(other.clone()),
    }
  }

  fn resolve_string(&self, text: &str) -> Result<Value, TaskErrorKind> {
    let exprs = expressions(text);
    let blocks = has_blocks(text);
    if exprs.is_empty() && !blocks {
      return Ok(Value::String(text.to_string()));
    }

    if !blocks
      && let Some(expr) = sole_expression(text)
      && is_plain_path(expr)
    {
      return Ok(self.context.resolve_path(expr)?.clone());
    }

    let bound = bound_names(text);
    for expr in exprs.iter().filter(|e| is_plain_path(e)) {
      if root_segment(expr).is_some_and(|root| bound.contains(&root)) {
        continue;
      }
      self.context.resolve_path(expr)?;
    }

    if !blocks && exprs.iter().all(|e| is_plain_path(e)) {
      return self.substitute(text).map(Value::String);
    }

    self
      .env
      .render_str(text, &self.globals)
      .map(Value::String)
      .map_err(|e| TaskErrorKind::Template {
        message: format!("failed to render '{text}': {e}"),
      })
  }

  /// Replace each plain-path placeholder with its stringified value.
  fn substitute(&self, text: &str) -> Result<String, TaskErrorKind> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
      let after = &rest[start + 2..];
      let Some(end) = after.find("}}") else {
        break;
      };

      out.push_str(&rest[..start]);
      let inner = after[..end].trim();
      if inner.is_empty() {
        out.push_str(&rest[start..start + end + 4]);
      } else {
        match self.context.resolve_path(inner)? {
          Value::String(s) => out.push_str(s),
          other => out.push_str(&other.to_string()),
        }
      }
      rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
  }
}

/// Light pre-dispatch check of a resolved config against a runtime's schema.
///
/// Only the top-level shape is checked: the declared `type`, `required` keys,
/// and the `type` of each listed property. Anything more is the module's job.
pub fn check_shape(config: &Value, schema: &Value) -> Result<(), TaskErrorKind> {
  let Some(schema) = schema.as_object() else {
    return Ok(());
  };

  if let Some(expected) = schema.get("type").and_then(Value::as_str)
    && !type_matches(config, expected)
  {
    return Err(TaskErrorKind::Schema {
      message: format!("expected {expected}, got {}", type_name(config)),
    });
  }

  let Some(fields) = config.as_object() else {
    return Ok(());
  };

  if let Some(required) = schema.get("required").and_then(Value::as_array) {
    for key in required.iter().filter_map(Value::as_str) {
      if !fields.contains_key(key) {
        return Err(TaskErrorKind::Schema {
          message: format!("missing required property '{key}'"),
        });
      }
    }
  }

  if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
    for (name, property) in properties {
      let (Some(value), Some(expected)) = (
        fields.get(name),
        property.get("type").and_then(Value::as_str),
      ) else {
        continue;
      };
      if !type_matches(value, expected) {
        return Err(TaskErrorKind::Schema {
          message: format!(
            "property '{name}' expected {expected}, got {}",
            type_name(value)
          ),
        });
      }
    }
  }

  Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
  match expected {
    "string" => value.is_string(),
    "number" => value.is_number(),
    "integer" => value.is_i64() || value.is_u64(),
    "boolean" => value.is_boolean(),
    "null" => value.is_null(),
    "array" => value.is_array(),
    "object" => value.is_object(),
    // Unknown types are not ours to judge.
    _ => true,
  }
}

fn type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(n) if n.is_f64() => "number",
    Value::Number(_) => "integer",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
