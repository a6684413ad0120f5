//! Request and response shapes.
//!
//! The transport (HTTP, CLI, ...) is responsible for turning bytes into a
//! [`Request`] and a [`Response`] back into bytes; these types only fix the
//! field names and which fields are present.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CommandError, ErrorList, Warning};
use crate::node::FileNode;
use crate::options::VolumeOptions;

/// Protocol version reported on `open` with `init`.
pub const API_VERSION: &str = "2.1";

/// One client request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Request {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Map::new(),
        }
    }

    /// Add an argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// Raw file answer for the `file` command.
///
/// The body is handed to the transport as-is and is never part of the
/// serialized envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFile {
    /// HTTP-equivalent status (200, 403, 404).
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl RawFile {
    /// A bodiless answer with only a status.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The response envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upl_max_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_drivers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<FileNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<VolumeOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<FileNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<FileNode>,
    /// Hashes of removed nodes, de-duplicated, in first-seen order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorList>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warning: Vec<Warning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
    /// Total size (`size`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Hash → thumbnail name (`tmb`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<BTreeMap<String, String>>,
    /// File contents (`get`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Image dimensions (`dim`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<String>,
    /// Raw file answer (`file`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<RawFile>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Error-only envelope.
    pub fn error(errors: ErrorList) -> Self {
        Self {
            error: Some(errors),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warning.is_empty()
    }
}

impl From<CommandError> for Response {
    fn from(err: CommandError) -> Self {
        Self::error(err.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_error_envelope_has_only_error() {
        let resp = Response::from(CommandError::new(ErrorKind::UnknownCmd));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, serde_json::json!({"error": "errUnknownCmd"}));
    }

    #[test]
    fn test_init_fields_use_client_names() {
        let resp = Response {
            api: Some(API_VERSION.to_string()),
            upl_max_size: Some("0".to_string()),
            net_drivers: Some(vec![]),
            ..Response::default()
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["api"], "2.1");
        assert_eq!(json["uplMaxSize"], "0");
        assert_eq!(json["netDrivers"], serde_json::json!([]));
    }

    #[test]
    fn test_request_parses_without_args() {
        let req: Request = serde_json::from_str(r#"{"command": "open"}"#).unwrap();
        assert_eq!(req.command, "open");
        assert!(req.args.is_empty());
    }

    #[test]
    fn test_raw_file_body_is_not_serialized() {
        let file = RawFile {
            status: 200,
            headers: vec![("Content-Type".into(), "text/plain".into())],
            body: b"hello".to_vec(),
        };
        assert_eq!(file.header("content-type"), Some("text/plain"));
        let json = serde_json::to_value(&file).unwrap();
        assert!(json.get("body").is_none());
    }
}
