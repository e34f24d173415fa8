use crate::trace::{CallEvent, LoopInfo, Variables};
use serde_json::Value;

/// Containers nested deeper than this render as `[...]` / `{...}`
const MAX_INLINE_DEPTH: usize = 2;

/// Elements shown before a container is cut off with `...`
const MAX_INLINE_ELEMENTS: usize = 8;

/// Format a variable value on a single line
pub fn format_value(value: &Value) -> String {
    format_value_at(value, 0)
}

fn format_value_at(value: &Value, depth: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // JSON quoting escapes control characters
        Value::String(_) => value.to_string(),
        Value::Array(elements) => {
            if depth > MAX_INLINE_DEPTH {
                return "[...]".to_string();
            }
            let mut s = String::from("[");
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    s.push_str(", ");
                }
                if i >= MAX_INLINE_ELEMENTS {
                    s.push_str("...");
                    break;
                }
                s.push_str(&format_value_at(element, depth + 1));
            }
            s.push(']');
            s
        }
        Value::Object(fields) => {
            if depth > MAX_INLINE_DEPTH {
                return "{...}".to_string();
            }
            let mut s = String::from("{");
            for (i, (key, field)) in fields.iter().enumerate() {
                if i > 0 {
                    s.push_str(", ");
                }
                if i >= MAX_INLINE_ELEMENTS {
                    s.push_str("...");
                    break;
                }
                s.push_str(key);
                s.push_str(": ");
                s.push_str(&format_value_at(field, depth + 1));
            }
            s.push('}');
            s
        }
    }
}

/// `a = 2, b = 5`
pub fn format_locals(locals: &Variables) -> String {
    locals
        .iter()
        .map(|(name, value)| format!("{} = {}", name, format_value(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `add(2, 5)`
pub fn format_call(call: &CallEvent) -> String {
    let args: Vec<String> = call.args.iter().map(format_value).collect();
    format!("{}({})", call.function_name, args.join(", "))
}

/// `for #3`
pub fn format_loop(info: &LoopInfo) -> String {
    format!("{} #{}", info.kind.as_str(), info.iteration)
}
