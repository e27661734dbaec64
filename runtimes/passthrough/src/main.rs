//! Passthrough runtime.
//!
//! Answers with the resolved config and the context it was given. Handy for
//! checking what a task actually sees.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Deserialize)]
struct Input {
  #[serde(default)]
  config: Value,
  #[serde(default)]
  context: Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Output {
  Ok { output: Value },
  Error { error: String },
}

fn process(raw: &str) -> Output {
  match serde_json::from_str::<Input>(raw) {
    Ok(input) => Output::Ok {
      output: json!({ "config": input.config, "context": input.context }),
    },
    Err(e) => Output::Error {
      error: format!("invalid input envelope: {e}"),
    },
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
