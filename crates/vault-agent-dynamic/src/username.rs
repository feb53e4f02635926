//! Username and SQL statement templating for dynamic credential issuance.

use chrono::Utc;
use rand::Rng;

const POSTGRES_IDENTIFIER_LIMIT: usize = 63;
const ALLOWED_CHARS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";

/// Renders a username template, substituting `{{role}}`, `{{random:N}}`,
/// `{{timestamp}}`, and `{{uuid}}`, then sanitising and truncating the
/// result to the PostgreSQL identifier limit.
pub fn render_username(template: &str, role: &str) -> String {
    let mut rendered = template.to_string();

    if rendered.contains("{{role}}") {
        rendered = rendered.replace("{{role}}", &sanitise(role));
    }
    rendered = substitute_random(&rendered);
    if rendered.contains("{{timestamp}}") {
        rendered = rendered.replace("{{timestamp}}", &Utc::now().timestamp().to_string());
    }
    if rendered.contains("{{uuid}}") {
        let short: String = uuid::Uuid::now_v7().simple().to_string().chars().take(8).collect();
        rendered = rendered.replace("{{uuid}}", &short);
    }

    let sanitised = sanitise(&rendered);
    sanitised.chars().take(POSTGRES_IDENTIFIER_LIMIT).collect()
}

fn substitute_random(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{random:") {
        output.push_str(&rest[..start]);
        let after_marker = &rest[start + "{{random:".len()..];
        let Some(end) = after_marker.find("}}") else {
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let count: usize = after_marker[..end].trim().parse().unwrap_or(8);
        output.push_str(&random_chars(count));
        rest = &after_marker[end + "}}".len()..];
    }
    output.push_str(rest);
    output
}

fn random_chars(count: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Constrains output to `[A-Za-z0-9_]`, replacing anything else with `_`.
fn sanitise(input: &str) -> String {
    input
        .chars()
        .map(|c| if ALLOWED_CHARS.contains(c) { c } else { '_' })
        .collect()
}

/// Substitutes `{{username}}`, `{{password}}`, `{{expiration}}`, and
/// `{{expiration_timestamp}}` into a SQL statement template.
pub fn render_statement(
    template: &str,
    username: &str,
    password: &str,
    expires_at: chrono::DateTime<Utc>,
) -> String {
    template
        .replace("{{username}}", username)
        .replace("{{password}}", password)
        .replace("{{expiration}}", &expires_at.to_rfc3339())
        .replace("{{expiration_timestamp}}", &expires_at.timestamp().to_string())
}
