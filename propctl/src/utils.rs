//! Common utilities and helper functions.
//!
//! Placeholder expansion for configured paths and parsing of `--set`
//! assignments.

use std::path::Path;

use serde_json::Value;

/// Expand `${workspaceFolder}` and `${env:VAR}` placeholders.
///
/// Unset environment variables expand to the empty string. Anything else
/// that looks like a placeholder, including an unterminated one, is kept as
/// written.
///
/// # Example
///
/// ```rust
/// use propctl::utils::expand_placeholders;
/// use std::path::Path;
///
/// let path = expand_placeholders("${workspaceFolder}/schemas", Path::new("/ws"));
/// assert_eq!(path, "/ws/schemas");
/// ```
pub fn expand_placeholders(input: &str, workspace: &Path) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match name {
            "workspaceFolder" => out.push_str(&workspace.display().to_string()),
            _ if name.starts_with("env:") => {
                let var = &name["env:".len()..];
                match std::env::var(var) {
                    Ok(value) => {
                        debug!("using {var}={value}");
                        out.push_str(&value);
                    }
                    Err(_) => debug!("{var} is not set"),
                }
            }
            _ => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Parse a `PATH=VALUE` assignment.
///
/// The value is read as JSON when it parses (`42`, `true`, `["a","b"]`),
/// otherwise it is taken as a plain string.
pub fn parse_assignment(input: &str) -> anyhow::Result<(String, Value)> {
    let Some((path, raw)) = input.split_once('=') else {
        bail!("expected PATH=VALUE, got `{input}`");
    };
    let path = path.trim();
    if path.is_empty() {
        bail!("missing field path in `{input}`");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((path.to_string(), value))
}

/// File-system safe name for a form id (`Book:Dune` → `Book_Dune`).
pub fn file_stem(form_id: &str) -> String {
    form_id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::env;

    #[test]
    fn test_expand_workspace_and_env() {
        unsafe {
            env::set_var("PROPCTL_TEST_DIR", "/data");
        }
        let ws = Path::new("/ws");
        assert_eq!(expand_placeholders("${workspaceFolder}/out", ws), "/ws/out");
        assert_eq!(
            expand_placeholders("${env:PROPCTL_TEST_DIR}/s:${workspaceFolder}", ws),
            "/data/s:/ws"
        );
        assert_eq!(expand_placeholders("${env:PROPCTL_NOT_SET}/x", ws), "/x");
        assert_eq!(expand_placeholders("plain", ws), "plain");
    }

    #[test]
    fn test_expand_keeps_unknown_and_unterminated() {
        let ws = Path::new("/ws");
        assert_eq!(expand_placeholders("${other}", ws), "${other}");
        assert_eq!(expand_placeholders("a ${env:X", ws), "a ${env:X");
        assert_eq!(expand_placeholders("$ and $$", ws), "$ and $$");
        assert_eq!(expand_placeholders("${workspaceFolder}}", ws), "/ws}");
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("Book/year=1965").unwrap(),
            ("Book/year".to_string(), json!(1965))
        );
        assert_eq!(
            parse_assignment("Book/tags=[\"a\",\"b\"]").unwrap().1,
            json!(["a", "b"])
        );
        assert_eq!(
            parse_assignment("Book/title=Dune = Messiah").unwrap().1,
            json!("Dune = Messiah")
        );
        assert_eq!(parse_assignment("Book/title=").unwrap().1, json!(""));
        assert!(parse_assignment("no-equals").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Book:Dune/1"), "Book_Dune_1");
        assert_eq!(file_stem("plain"), "plain");
    }
}
