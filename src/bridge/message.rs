//! Wire schema for the cross-process channel.
//!
//! One JSON object per line, internally tagged by `kind`:
//!
//! ```text
//! {"kind":"command","module":"calendar","reload":true}
//! {"kind":"server_exited"}
//! ```
//!
//! Decoding validates as well as parses; anything that does not match one of
//! these shapes is rejected with a [`BridgeError`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest module name accepted in a [`Command`].
pub const MAX_MODULE_NAME: usize = 64;

// ---------------------------------------------------------------------------
// BridgeError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("message is not valid UTF-8")]
    NotUtf8,

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid command: {0}")]
    Invalid(String),

    #[error("bridge I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("bridge closed by the other side")]
    Closed,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Ask the main process to act on one module's view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub module: String,
    #[serde(default)]
    pub reload: bool,
}

impl Command {
    pub fn reload(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            reload: true,
        }
    }

    /// Module names are 1–64 ASCII letters, digits, `_` or `-`.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let name = &self.module;
        if name.is_empty() {
            return Err(BridgeError::Invalid("module name is empty".into()));
        }
        if name.len() > MAX_MODULE_NAME {
            return Err(BridgeError::Invalid(format!(
                "module name longer than {MAX_MODULE_NAME} characters"
            )));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(BridgeError::Invalid(format!(
                "module name contains {bad:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeMessage {
    Command(Command),
    /// The request server is shutting down.
    ServerExited,
}

impl BridgeMessage {
    /// Parse and validate one line (without or with its trailing newline).
    pub fn decode(line: &[u8]) -> Result<Self, BridgeError> {
        let text = std::str::from_utf8(line).map_err(|_| BridgeError::NotUtf8)?;
        let value: serde_json::Value = serde_json::from_str(text.trim())?;
        let message = BridgeMessage::deserialize(&value)?;
        message.reject_extra_fields(&value)?;
        if let BridgeMessage::Command(command) = &message {
            command.validate()?;
        }
        Ok(message)
    }

    /// Every field a message of this kind may carry, tag included.
    fn fields(&self) -> &'static [&'static str] {
        match self {
            BridgeMessage::Command(_) => &["kind", "module", "reload"],
            BridgeMessage::ServerExited => &["kind"],
        }
    }

    fn reject_extra_fields(&self, value: &serde_json::Value) -> Result<(), BridgeError> {
        let allowed = self.fields();
        let extra = value
            .as_object()
            .and_then(|object| object.keys().find(|key| !allowed.contains(&key.as_str())));
        match extra {
            Some(key) => Err(BridgeError::Invalid(format!("unexpected field `{key}`"))),
            None => Ok(()),
        }
    }

    /// Serialise as one newline-terminated line.
    pub fn encode(&self) -> Result<String, BridgeError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_command_with_and_without_reload() {
        let msg = BridgeMessage::decode(br#"{"kind":"command","module":"calendar","reload":true}"#)
            .unwrap();
        assert_eq!(msg, BridgeMessage::Command(Command::reload("calendar")));

        let msg = BridgeMessage::decode(b"{\"kind\":\"command\",\"module\":\"media\"}\n").unwrap();
        assert_eq!(
            msg,
            BridgeMessage::Command(Command {
                module: "media".into(),
                reload: false
            })
        );
    }

    #[test]
    fn decodes_server_exit() {
        assert_eq!(
            BridgeMessage::decode(br#"{"kind":"server_exited"}"#).unwrap(),
            BridgeMessage::ServerExited
        );
    }

    #[test]
    fn encode_is_a_single_decodable_line() {
        let line = BridgeMessage::Command(Command::reload("utils")).encode().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(
            BridgeMessage::decode(line.as_bytes()).unwrap(),
            BridgeMessage::Command(Command::reload("utils"))
        );
    }

    #[test]
    fn rejects_unknown_shapes() {
        let cases: [&[u8]; 6] = [
            b"not json",
            br#"{"module":"calendar"}"#,
            br#"{"kind":"explode"}"#,
            br#"{"kind":"command"}"#,
            br#"{"kind":"command","module":7}"#,
            br#"{"kind":"command","module":"calendar","reload":"yes"}"#,
        ];
        for bad in cases {
            assert!(
                matches!(BridgeMessage::decode(bad), Err(BridgeError::Decode(_))),
                "accepted {:?}",
                String::from_utf8_lossy(bad)
            );
        }

        // Well-formed but carrying fields the kind does not define.
        let extra: [&[u8]; 3] = [
            br#"{"kind":"command","module":"x","bogus":1}"#,
            br#"{"kind":"command","module":"media","reload":true,"args":[]}"#,
            br#"{"kind":"server_exited","code":0}"#,
        ];
        for bad in extra {
            assert!(
                matches!(BridgeMessage::decode(bad), Err(BridgeError::Invalid(_))),
                "accepted {:?}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn rejects_invalid_module_names() {
        let long = "x".repeat(MAX_MODULE_NAME + 1);
        for name in ["", "../etc", "cal endar", long.as_str()] {
            let line = serde_json::json!({ "kind": "command", "module": name }).to_string();
            assert!(
                matches!(BridgeMessage::decode(line.as_bytes()), Err(BridgeError::Invalid(_))),
                "accepted {name:?}"
            );
        }
        assert!(Command::reload("x".repeat(MAX_MODULE_NAME)).validate().is_ok());
        assert!(Command::reload("my_module-2").validate().is_ok());
    }

    #[test]
    fn rejects_non_utf8() {
        assert!(matches!(
            BridgeMessage::decode(&[0xff, 0xfe, b'{']),
            Err(BridgeError::NotUtf8)
        ));
    }
}
