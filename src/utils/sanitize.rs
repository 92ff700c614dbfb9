/// Captured value rendering
///
/// Every value a script hands to the console is turned into text here before it
/// leaves the execution context. Strings are entity-escaped so the output can be
/// dropped into markup; structured values go through JSON with every nested
/// string and key escaped the same way.
use rhai::Dynamic;
use serde_json::Value;

/// Replace HTML-significant characters with entity equivalents.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Convert one captured value to its output text.
pub fn render_value(value: &Dynamic) -> String {
    if value.is_string() || value.is::<char>() {
        return escape_html(&value.to_string());
    }

    if value.is_unit() {
        return "()".to_string();
    }

    if value.is_bool() || value.is_int() || value.is_float() {
        return value.to_string();
    }

    match serde_json::to_value(value) {
        Ok(json) => escape_json_strings(json).to_string(),
        Err(e) => {
            log::debug!("JSON rendering of {} failed: {}", value.type_name(), e);
            escape_html(&value.to_string())
        }
    }
}

fn escape_json_strings(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_html(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(escape_json_strings).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (escape_html(&key), escape_json_strings(item)))
                .collect(),
        ),
        other => other,
    }
}

/// Render the arguments of one console call as a single line.
pub fn render_args(args: &[Dynamic]) -> String {
    args.iter().map(render_value).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::{Array, Map};

    #[test]
    fn escapes_script_tag() {
        let escaped = escape_html("<script>alert('x')</script>");
        assert_eq!(
            escaped,
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;&#x2F;script&gt;"
        );
        assert!(!escaped.contains('<'));
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(escape_html("hello & goodbye"), "hello & goodbye");
    }

    #[test]
    fn escapes_quotes() {
        assert_eq!(escape_html(r#"say "hi""#), "say &quot;hi&quot;");
    }

    #[test]
    fn string_values_are_escaped() {
        let value: Dynamic = "<b>".into();
        assert_eq!(render_value(&value), "&lt;b&gt;");
    }

    #[test]
    fn primitives_use_display() {
        assert_eq!(render_value(&Dynamic::from(42_i64)), "42");
        assert_eq!(render_value(&Dynamic::from(true)), "true");
        assert_eq!(render_value(&Dynamic::UNIT), "()");
    }

    #[test]
    fn arrays_render_as_json() {
        let array: Array = vec![Dynamic::from(1_i64), "two".into()];
        assert_eq!(render_value(&Dynamic::from_array(array)), r#"[1,"two"]"#);
    }

    #[test]
    fn maps_render_as_json() {
        let mut map = Map::new();
        map.insert("name".into(), "builder".into());
        assert_eq!(render_value(&Dynamic::from_map(map)), r#"{"name":"builder"}"#);
    }

    #[test]
    fn nested_strings_are_escaped() {
        let mut inner = Map::new();
        inner.insert("<k>".into(), "'q'".into());
        let list: Array = vec!["</b>".into(), Dynamic::from_map(inner), Dynamic::from(1_i64)];
        let mut map = Map::new();
        map.insert("tag".into(), Dynamic::from_array(list));

        let rendered = render_value(&Dynamic::from_map(map));
        assert_eq!(
            rendered,
            r#"{"tag":["&lt;&#x2F;b&gt;",{"&lt;k&gt;":"&#x27;q&#x27;"},1]}"#
        );
        assert!(!rendered.contains('<'));
    }

    #[test]
    fn multiple_args_join_with_space() {
        let args: Vec<Dynamic> = vec!["count:".into(), Dynamic::from(3_i64)];
        assert_eq!(render_args(&args), "count: 3");
    }
}
