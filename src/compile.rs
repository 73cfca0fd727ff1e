use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::string_field;
use crate::error::Result;

pub type CompileId = String;

/// A compile artifact as reported when it was created. `log` is a snapshot and is never
/// refreshed; submit another compile for a newer one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compile {
    pub id: CompileId,
    pub log: String,
}

impl Compile {
    pub fn new(id: impl Into<CompileId>, log: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            log: log.into(),
        }
    }

    pub(crate) fn from_response(body: &Value, route: &str) -> Result<Self> {
        let id = string_field(body, route, "compileId")?;
        Ok(Self {
            id,
            log: log_text(body.get("log")),
        })
    }
}

// The service has sent the log both as one string and as a list of lines.
fn log_text(log: Option<&Value>) -> String {
    match log {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(lines)) => lines
            .iter()
            .map(|line| match line {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Compile;

    #[test]
    fn test_that_log_lines_are_joined() {
        let body = json!({"success": true, "compileId": "abc-1", "log": ["one", "two"]});
        let compile = Compile::from_response(&body, "compiler/create").unwrap();
        assert_eq!(compile, Compile::new("abc-1", "one\ntwo"));
    }

    #[test]
    fn test_that_missing_compile_id_is_malformed() {
        let body = json!({"success": true, "log": "ok"});
        let err = Compile::from_response(&body, "compiler/create").unwrap_err();
        assert!(err.is_transport());
    }
}
