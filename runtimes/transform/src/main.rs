//! Transform runtime.
//!
//! Reshapes context data by path. Config takes exactly one of:
//! - `expression`: a dot path into the context (`fetch.body.items.0`)
//! - `mappings`: an object whose string values are dot paths; the output is
//!   an object with the same keys
//!
//! Unresolvable paths produce `null`. Placeholder rendering already happened
//! on the host, so strings here are taken literally.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Deserialize)]
struct Input {
  #[serde(default)]
  config: Option<Config>,
  #[serde(default)]
  context: Value,
}

#[derive(Default, Deserialize)]
struct Config {
  expression: Option<String>,
  mappings: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Output {
  Ok { output: Value },
  Error { error: String },
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
  path.split('.').try_fold(root, |current, segment| match current {
    Value::Object(map) => map.get(segment),
    Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
    _ => None,
  })
}

fn transform(input: Input) -> Result<Value, String> {
  let config = input.config.unwrap_or_default();
  match (config.expression, config.mappings) {
    (Some(expression), None) => Ok(lookup(&input.context, &expression).cloned().unwrap_or(Value::Null)),
    (None, Some(mappings)) => {
      let mut out = Map::with_capacity(mappings.len());
      for (key, path) in mappings {
        let path = path
          .as_str()
          .ok_or_else(|| format!("mapping '{key}' must be a path string"))?;
        let value = lookup(&input.context, path).cloned().unwrap_or(Value::Null);
        out.insert(key, value);
      }
      Ok(Value::Object(out))
    }
    (Some(_), Some(_)) => Err("config takes either 'expression' or 'mappings', not both".to_string()),
    (None, None) => Err("config needs 'expression' or 'mappings'".to_string()),
  }
}

fn process(raw: &str) -> Output {
  let result = serde_json::from_str::<Input>(raw)
    .map_err(|e| format!("invalid input envelope: {e}"))
    .and_then(transform);

  match result {
    Ok(output) => Output::Ok { output },
    Err(error) => Output::Error { error },
  }
}

fn main() {
  let mut raw = String::new();
  let output = match io::stdin().read_to_string(&mut raw) {
    Ok(_) => process(&raw),
    Err(e) => Output::Error {
      error: format!("failed to read stdin: {e}"),
    },
  };

  let encoded = serde_json::to_string(&output)
    .unwrap_or_else(|_| r#"{"status":"error","error":"failed to encode output"}"#.to_string());
  let _ = io::stdout().write_all(encoded.as_bytes());
}
