//! Template references inside task configuration.
//!
//! Configuration strings may embed `{{ expr }}` placeholders and `{% ... %}`
//! blocks. The first segment of an expression names a context root: the
//! reserved `input` entry or the id of another task. Names bound by a block
//! (`{% for item in ... %}`, `{% set x = ... %}`) are local to the template
//! and never roots. Plain paths (`fetch.body`, `items[0].name`) are resolved
//! directly against the context; anything else is rendered by the template
//! engine at dispatch time.

use serde_json::Value;

/// Jinja words that can lead an expression without naming a context root.
const KEYWORDS: &[&str] = &["true", "false", "none", "True", "False", "None", "not"];

/// Inner text of every `{{ ... }}` placeholder in `text`, trimmed.
///
/// Unclosed and empty placeholders are left alone as literal text.
pub fn expressions(text: &str) -> Vec<&str> {
  let mut found = Vec::new();
  let mut rest = text;

  while let Some(start) = rest.find("{{") {
    let after = &rest[start + 2..];
    let Some(end) = after.find("}}") else {
      break;
    };
    let inner = after[..end].trim();
    if !inner.is_empty() {
      found.push(inner);
    }
    rest = &after[end + 2..];
  }

  found
}

/// Whether `text` contains a `{% ... %}` block.
pub fn has_blocks(text: &str) -> bool {
  text.contains("{%")
}

/// Inner text of every `{% ... %}` block, without whitespace-control dashes.
pub fn blocks(text: &str) -> Vec<&str> {
  let mut found = Vec::new();
  let mut rest = text;

  while let Some(start) = rest.find("{%") {
    let after = &rest[start + 2..];
    let Some(end) = after.find("%}") else {
      break;
    };
    let inner = after[..end].trim();
    let inner = inner.strip_prefix('-').unwrap_or(inner);
    let inner = inner.strip_suffix('-').unwrap_or(inner).trim();
    if !inner.is_empty() {
      found.push(inner);
    }
    rest = &after[end + 2..];
  }

  found
}

/// Variables introduced by `for` and `set` blocks in `text`.
pub fn bound_names(text: &str) -> Vec<&str> {
  let mut names = Vec::new();

  for block in blocks(text) {
    let targets = if let Some(rest) = block.strip_prefix("for ") {
      rest.split_once(" in ").map(|(targets, _)| targets)
    } else if let Some(rest) = block.strip_prefix("set ") {
      Some(rest.split_once('=').map_or(rest, |(targets, _)| targets))
    } else {
      None
    };

    let Some(targets) = targets else {
      continue;
    };
    for name in targets.split(',').map(|n| n.trim().trim_matches(['(', ')']).trim()) {
      if !name.is_empty() && !names.contains(&name) {
        names.push(name);
      }
    }
  }

  names
}

/// Expressions a block reads from: the iterable of a `for`, the condition of
/// an `if`/`elif`, the value of a `set`.
fn block_expressions(text: &str) -> Vec<&str> {
  blocks(text)
    .into_iter()
    .filter_map(|block| {
      if let Some(rest) = block.strip_prefix("for ") {
        rest.split_once(" in ").map(|(_, iterable)| iterable.trim())
      } else if let Some(rest) = block.strip_prefix("set ") {
        rest.split_once('=').map(|(_, value)| value.trim())
      } else if let Some(rest) = block.strip_prefix("if ") {
        Some(rest.trim())
      } else {
        block.strip_prefix("elif ").map(str::trim)
      }
    })
    .map(|expr| expr.strip_prefix("not ").map_or(expr, str::trim))
    .collect()
}

/// Context roots read by a single configuration string.
pub fn string_roots(text: &str) -> Vec<&str> {
  let bound = bound_names(text);
  let mut roots: Vec<&str> = Vec::new();

  for expr in expressions(text).into_iter().chain(block_expressions(text)) {
    if let Some(root) = root_segment(expr)
      && !bound.contains(&root)
      && !roots.contains(&root)
    {
      roots.push(root);
    }
  }

  roots
}

/// The inner expression when `text` consists of exactly one placeholder.
pub fn sole_expression(text: &str) -> Option<&str> {
  let inner = text.trim().strip_prefix("{{")?.strip_suffix("}}")?;
  if inner.contains("{{") || inner.contains("}}") {
    return None;
  }
  let inner = inner.trim();
  (!inner.is_empty()).then_some(inner)
}

/// Whether `expr` is a plain context path such as `fetch.body` or `items[0]`.
pub fn is_plain_path(expr: &str) -> bool {
  !expr.is_empty()
    && !expr.starts_with(['.', '['])
    && expr
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '[' | ']'))
}

/// Split a plain path into its segments: `a.b[0].c` becomes `["a", "b", "0", "c"]`.
///
/// Empty segments are kept so that a malformed path fails to resolve instead
/// of silently matching something else.
pub fn path_segments(path: &str) -> Vec<&str> {
  let mut segments = Vec::new();

  for part in path.split('.') {
    let Some(open) = part.find('[') else {
      segments.push(part);
      continue;
    };

    let head = &part[..open];
    if !head.is_empty() {
      segments.push(head);
    }

    let mut rest = &part[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
      match stripped.find(']') {
        Some(close) => {
          segments.push(&stripped[..close]);
          rest = &stripped[close + 1..];
        }
        None => {
          segments.push(stripped);
          rest = "";
        }
      }
    }
    if !rest.is_empty() {
      segments.push(rest);
    }
  }

  segments
}

/// The context root an expression reads from, if it reads from one.
pub fn root_segment(expr: &str) -> Option<&str> {
  if is_plain_path(expr) {
    return path_segments(expr).into_iter().next().filter(|s| !s.is_empty());
  }

  let end = expr
    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
    .unwrap_or(expr.len());
  let root = &expr[..end];
  if root.is_empty() || KEYWORDS.contains(&root) || root.starts_with(|c: char| c.is_ascii_digit()) {
    return None;
  }

  match expr[end..].chars().next() {
    None | Some('.') | Some('[') | Some(' ') | Some('|') => Some(root),
    _ => None,
  }
}

/// Every distinct context root referenced anywhere inside `value`.
pub fn collect_roots(value: &Value) -> Vec<String> {
  let mut roots = Vec::new();
  walk_roots(value, &mut roots);
  roots
}

fn walk_roots(value: &Value, roots: &mut Vec<String>) {
  match value {
    Value::String(s) => {
      for root in string_roots(s) {
        if !roots.iter().any(|r| r == root) {
          roots.push(root.to_string());
        }
      }
    }
    Value::Array(items) => items.iter().for_each(|v| walk_roots(v, roots)),
    Value::Object(map) => map.values().for_each(|v| walk_roots(v, roots)),
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_expressions() {
    assert_eq!(
      expressions("Hello {{ name }}, you have {{count}} messages"),
      vec!["name", "count"]
    );
    assert!(expressions("no placeholders").is_empty());
    assert!(expressions("unclosed {{ name").is_empty());
    assert!(expressions("empty {{ }}").is_empty());
    assert_eq!(expressions("{{a}}{{b}}"), vec!["a", "b"]);
  }

  #[test]
  fn test_sole_expression() {
    assert_eq!(sole_expression("{{ fetch.body }}"), Some("fetch.body"));
    assert_eq!(sole_expression("  {{fetch}} "), Some("fetch"));
    assert_eq!(sole_expression("{{ a }} and {{ b }}"), None);
    assert_eq!(sole_expression("prefix {{ a }}"), None);
    assert_eq!(sole_expression("{{ }}"), None);
  }

  #[test]
  fn test_path_segments() {
    assert_eq!(path_segments("fetch.body"), vec!["fetch", "body"]);
    assert_eq!(path_segments("a.items[0].name"), vec!["a", "items", "0", "name"]);
    assert_eq!(path_segments("grid[1][2]"), vec!["grid", "1", "2"]);
    assert_eq!(path_segments("a..b"), vec!["a", "", "b"]);
  }

  #[test]
  fn test_root_segment() {
    assert_eq!(root_segment("fetch.body"), Some("fetch"));
    assert_eq!(root_segment("fetch-data.body"), Some("fetch-data"));
    assert_eq!(root_segment("items[0]"), Some("items"));
    assert_eq!(root_segment("name | upper"), Some("name"));
    assert_eq!(root_segment("range(3)"), None);
    assert_eq!(root_segment("\"literal\""), None);
    assert_eq!(root_segment("not flag"), None);
  }

  #[test]
  fn test_collect_roots_walks_nested_values() {
    let config = json!({
      "url": "{{ input.url }}",
      "headers": [{"auth": "Bearer {{ login.token }}"}],
      "body": "{{ fetch.body }} / {{ input.extra }}",
      "count": 3
    });

    let mut roots = collect_roots(&config);
    roots.sort();
    assert_eq!(roots, vec!["fetch", "input", "login"]);
  }

  #[test]
  fn test_blocks_and_bound_names() {
    let text = "{%- for key, value in fetch.meta|items -%}{{ key }}{% endfor %}{% set total = input.n %}";
    assert_eq!(
      blocks(text),
      vec!["for key, value in fetch.meta|items", "endfor", "set total = input.n"]
    );
    assert_eq!(bound_names(text), vec!["key", "value", "total"]);
    assert!(has_blocks(text));
    assert!(!has_blocks("{{ a }}"));
  }

  #[test]
  fn test_string_roots_skip_loop_variables() {
    let text = "{% for item in fetch.items %}{{ item.name }}{% endfor %}";
    assert_eq!(string_roots(text), vec!["fetch"]);

    let text = "{% if not input.flag %}{{ login.token }}{% elif other.ok %}no{% endif %}";
    let mut roots = string_roots(text);
    roots.sort_unstable();
    assert_eq!(roots, vec!["input", "login", "other"]);
  }
}
