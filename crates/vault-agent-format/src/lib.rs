//! # vault-agent-format
//!
//! Pure rendering of a secret's key→value data into the bytes written to
//! disk (component C3). No I/O happens here; [`render`] is a total function
//! over `(data, format, options)`.

use serde_json::Value;
use vault_agent_common::{AgentError, AgentResult, SecretFormat, SecretFormatOptions};

/// A secret's decrypted key→value map, in the order it should be rendered.
pub type SecretData = Vec<(String, Value)>;

/// Render `data` according to `format` and `options`. Returns `None` for
/// `SecretFormat::None`, where the destination must not be written at all.
pub fn render(
    data: &SecretData,
    format: SecretFormat,
    options: &SecretFormatOptions,
) -> AgentResult<Option<Vec<u8>>> {
    match format {
        SecretFormat::Env => Ok(Some(render_env(data, options))),
        SecretFormat::Json => Ok(Some(render_json(data)?)),
        SecretFormat::Yaml => Ok(Some(render_yaml(data))),
        SecretFormat::Raw => render_raw(data, options).map(Some),
        SecretFormat::Template => render_template(data, options).map(Some),
        SecretFormat::None => Ok(None),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Uppercase, replacing any character outside `[A-Z0-9_]` with `_`.
fn env_safe_key(key: &str) -> String {
    key.to_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Escape order: `\` -> `\\`, `"` -> `\"`, newline -> `\n` (literal two
/// characters, not an actual newline).
fn env_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

fn render_env(data: &SecretData, options: &SecretFormatOptions) -> Vec<u8> {
    let prefix = options.env_prefix.as_deref().unwrap_or("");
    let prefix_joined = if prefix.is_empty() {
        String::new()
    } else if prefix.ends_with('_') {
        prefix.to_string()
    } else {
        format!("{prefix}_")
    };

    let mut out = String::new();
    for (key, value) in data {
        let rendered_value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&prefix_joined);
        out.push_str(&env_safe_key(key));
        out.push_str("=\"");
        out.push_str(&env_escape(&rendered_value));
        out.push_str("\"\n");
    }
    out.into_bytes()
}

fn render_json(data: &SecretData) -> AgentResult<Vec<u8>> {
    let map: serde_json::Map<String, Value> = data.iter().cloned().collect();
    let mut out = serde_json::to_vec_pretty(&Value::Object(map))?;
    out.push(b'\n');
    Ok(out)
}

/// Minimal documented-subset YAML: one `key: value` line per entry. Strings
/// are quoted iff they contain `\n`, `:`, `#`, or a leading space;
/// non-strings are JSON-encoded. Not a general YAML emitter — no
/// multi-line/anchor support (spec §9 open question, intentional minimum).
fn render_yaml(data: &SecretData) -> Vec<u8> {
    let mut out = String::new();
    for (key, value) in data {
        out.push_str(key);
        out.push_str(": ");
        match value {
            Value::String(s) => {
                if s.contains('\n') || s.contains(':') || s.contains('#') || s.starts_with(' ') {
                    out.push('"');
                    out.push_str(&s.replace('\\', "\\\\").replace('"', "\\\""));
                    out.push('"');
                } else {
                    out.push_str(s);
                }
            }
            other => out.push_str(&other.to_string()),
        }
        out.push('\n');
    }
    out.into_bytes()
}

fn render_raw(data: &SecretData, options: &SecretFormatOptions) -> AgentResult<Vec<u8>> {
    let key = options
        .raw_key
        .as_deref()
        .ok_or_else(|| AgentError::MissingOption("options.key is required for raw format".to_string()))?;

    let value = data
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
        .ok_or_else(|| AgentError::MissingKey(key.to_string()))?;

    Ok(stringify(value).into_bytes())
}

/// Substitute every `{{ key }}` (optional internal whitespace) occurrence
/// with the stringified value; keys absent from `data` are left untouched.
fn render_template(data: &SecretData, options: &SecretFormatOptions) -> AgentResult<Vec<u8>> {
    let template_path = options.template_path.as_deref().ok_or_else(|| {
        AgentError::MissingOption("options.template_path is required for template format".to_string())
    })?;

    let template = std::fs::read_to_string(template_path)
        .map_err(|_| AgentError::TemplateNotFound(template_path.to_string()))?;

    Ok(substitute_template(&template, data).into_bytes())
}

fn substitute_template(template: &str, data: &SecretData) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if template[i..].starts_with("{{") {
            if let Some(end) = template[i..].find("}}") {
                let inner = template[i + 2..i + end].trim();
                if let Some((_, value)) = data.iter().find(|(k, _)| k == inner) {
                    out.push_str(&stringify(value));
                } else {
                    out.push_str(&template[i..i + end + 2]);
                }
                i += end + 2;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> SecretData {
        vec![
            ("DB_HOST".to_string(), Value::String("db.local".to_string())),
            (
                "DB_PASS".to_string(),
                Value::String("p\"w\nd".to_string()),
            ),
        ]
    }

    #[test]
    fn env_format_matches_spec_scenario_one() {
        let options = SecretFormatOptions {
            env_prefix: Some("APP".to_string()),
            ..Default::default()
        };
        let out = render(&sample_data(), SecretFormat::Env, &options).unwrap().unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "APP_DB_HOST=\"db.local\"\nAPP_DB_PASS=\"p\\\"w\\nd\"\n"
        );
    }

    #[test]
    fn env_prefix_without_trailing_underscore_gets_one_interposed() {
        let options = SecretFormatOptions {
            env_prefix: Some("APP".to_string()),
            ..Default::default()
        };
        let data = vec![("host".to_string(), Value::String("x".to_string()))];
        let out = render(&data, SecretFormat::Env, &options).unwrap().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "APP_HOST=\"x\"\n");
    }

    #[test]
    fn env_prefix_already_ending_in_underscore_is_not_doubled() {
        let options = SecretFormatOptions {
            env_prefix: Some("APP_".to_string()),
            ..Default::default()
        };
        let data = vec![("host".to_string(), Value::String("x".to_string()))];
        let out = render(&data, SecretFormat::Env, &options).unwrap().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "APP_HOST=\"x\"\n");
    }

    #[test]
    fn env_key_safe_form_replaces_non_alnum() {
        assert_eq!(env_safe_key("db-host.name"), "DB_HOST_NAME");
    }

    #[test]
    fn env_non_string_values_are_json_serialized() {
        let data = vec![("count".to_string(), Value::from(3))];
        let out = render(&data, SecretFormat::Env, &SecretFormatOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "COUNT=\"3\"\n");
    }

    #[test]
    fn json_format_is_pretty_with_trailing_newline() {
        let data = vec![("a".to_string(), Value::from(1))];
        let out = render(&data, SecretFormat::Json, &SecretFormatOptions::default())
            .unwrap()
            .unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(s.ends_with("}\n"));
        assert!(s.contains("  \"a\": 1"));
    }

    #[test]
    fn yaml_quotes_strings_with_special_characters() {
        let data = vec![
            ("plain".to_string(), Value::String("value".to_string())),
            ("colon".to_string(), Value::String("a:b".to_string())),
        ];
        let out = render(&data, SecretFormat::Yaml, &SecretFormatOptions::default())
            .unwrap()
            .unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(s.contains("plain: value\n"));
        assert!(s.contains("colon: \"a:b\"\n"));
    }

    #[test]
    fn raw_format_requires_key_option() {
        let err = render(&sample_data(), SecretFormat::Raw, &SecretFormatOptions::default())
            .unwrap_err();
        assert!(matches!(err, AgentError::MissingOption(_)));
    }

    #[test]
    fn raw_format_returns_selected_value() {
        let options = SecretFormatOptions {
            raw_key: Some("DB_HOST".to_string()),
            ..Default::default()
        };
        let out = render(&sample_data(), SecretFormat::Raw, &options).unwrap().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "db.local");
    }

    #[test]
    fn raw_format_missing_key_errors() {
        let options = SecretFormatOptions {
            raw_key: Some("MISSING".to_string()),
            ..Default::default()
        };
        let err = render(&sample_data(), SecretFormat::Raw, &options).unwrap_err();
        assert!(matches!(err, AgentError::MissingKey(_)));
    }

    #[test]
    fn none_format_is_not_rendered() {
        let out = render(&sample_data(), SecretFormat::None, &SecretFormatOptions::default()).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn template_substitution_leaves_missing_keys_untouched() {
        let data = vec![("name".to_string(), Value::String("world".to_string()))];
        let rendered = substitute_template("hello {{ name }}, missing {{ other }}", &data);
        assert_eq!(rendered, "hello world, missing {{ other }}");
    }
}
