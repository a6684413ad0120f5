//! Error taxonomy shared by the connector and its clients.
//!
//! Errors travel as codes the file-manager client knows how to translate
//! (`errOpen`, `errRm`, ...). A fatal error is an [`ErrorList`]: a flat
//! sequence of codes, each optionally followed by context values
//! (`["errOpen", "m1_L2E", "errPerm"]`). Per-item failures inside a batch
//! command are [`Warning`]s attached to an otherwise successful response.

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{EnumIter, EnumString};
use thiserror::Error;

/// Canonical error kinds.
///
/// The string form is the code sent to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, EnumIter)]
pub enum ErrorKind {
    #[strum(serialize = "errUnknown")]
    Unknown,
    #[strum(serialize = "errUnknownCmd")]
    UnknownCmd,
    /// The backend does not implement the requested operation.
    #[strum(serialize = "errCmdNoSupport")]
    CmdNoSupport,
    #[strum(serialize = "errOpen")]
    Open,
    #[strum(serialize = "errFolderNotFound")]
    DirNotFound,
    #[strum(serialize = "errPerm")]
    PermDenied,
    #[strum(serialize = "errFileNotFound")]
    FileNotFound,
    #[strum(serialize = "errMkdir")]
    Mkdir,
    #[strum(serialize = "errMkfile")]
    Mkfile,
    #[strum(serialize = "errRename")]
    Rename,
    #[strum(serialize = "errRm")]
    Rm,
    #[strum(serialize = "errCopy")]
    Copy,
    #[strum(serialize = "errMove")]
    Move,
    #[strum(serialize = "errTrgFolderNotFound")]
    TrgDirNotFound,
    #[strum(serialize = "errUpload")]
    Upload,
    #[strum(serialize = "errUploadNoFiles")]
    UploadNoFiles,
    #[strum(serialize = "errUploadTransfer")]
    UploadTransfer,
    #[strum(serialize = "errSave")]
    Save,
    #[strum(serialize = "errExtract")]
    Extract,
    #[strum(serialize = "errArchive")]
    Archive,
    #[strum(serialize = "errResize")]
    Resize,
}

impl ErrorKind {
    /// Wire code for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unknown => "errUnknown",
            ErrorKind::UnknownCmd => "errUnknownCmd",
            ErrorKind::CmdNoSupport => "errCmdNoSupport",
            ErrorKind::Open => "errOpen",
            ErrorKind::DirNotFound => "errFolderNotFound",
            ErrorKind::PermDenied => "errPerm",
            ErrorKind::FileNotFound => "errFileNotFound",
            ErrorKind::Mkdir => "errMkdir",
            ErrorKind::Mkfile => "errMkfile",
            ErrorKind::Rename => "errRename",
            ErrorKind::Rm => "errRm",
            ErrorKind::Copy => "errCopy",
            ErrorKind::Move => "errMove",
            ErrorKind::TrgDirNotFound => "errTrgFolderNotFound",
            ErrorKind::Upload => "errUpload",
            ErrorKind::UploadNoFiles => "errUploadNoFiles",
            ErrorKind::UploadTransfer => "errUploadTransfer",
            ErrorKind::Save => "errSave",
            ErrorKind::Extract => "errExtract",
            ErrorKind::Archive => "errArchive",
            ErrorKind::Resize => "errResize",
        }
    }

    /// Parse a wire code. Returns `None` for unknown codes.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        ErrorKind::from_str(&code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code: {code}")))
    }
}

/// One element of an error array: a code or a context value for the code
/// before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorPart {
    Kind(ErrorKind),
    Context(String),
}

impl ErrorPart {
    fn as_str(&self) -> &str {
        match self {
            ErrorPart::Kind(kind) => kind.as_str(),
            ErrorPart::Context(value) => value,
        }
    }
}

/// Multi-part error: `[code, context, code2, ...]`.
///
/// Built incrementally; appending never overwrites what is already there.
/// Serializes as a bare string when it holds a single code, as an array
/// otherwise.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorList {
    parts: Vec<ErrorPart>,
}

impl ErrorList {
    /// Start a list with one code.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            parts: vec![ErrorPart::Kind(kind)],
        }
    }

    /// Append a code.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.push_kind(kind);
        self
    }

    /// Append a context value.
    pub fn with(mut self, context: impl Into<String>) -> Self {
        self.push_context(context);
        self
    }

    pub fn push_kind(&mut self, kind: ErrorKind) {
        self.parts.push(ErrorPart::Kind(kind));
    }

    pub fn push_context(&mut self, context: impl Into<String>) {
        self.parts.push(ErrorPart::Context(context.into()));
    }

    /// Append every part of `other` after the existing ones.
    pub fn extend(&mut self, other: ErrorList) {
        self.parts.extend(other.parts);
    }

    /// All parts in order.
    pub fn parts(&self) -> &[ErrorPart] {
        &self.parts
    }

    /// Codes only, in order.
    pub fn kinds(&self) -> impl Iterator<Item = ErrorKind> + '_ {
        self.parts.iter().filter_map(|p| match p {
            ErrorPart::Kind(kind) => Some(*kind),
            ErrorPart::Context(_) => None,
        })
    }

    /// The leading code.
    pub fn primary(&self) -> Option<ErrorKind> {
        self.kinds().next()
    }

    pub fn contains_kind(&self, kind: ErrorKind) -> bool {
        self.kinds().any(|k| k == kind)
    }

    /// True if `value` appears anywhere in the list, code or context.
    pub fn mentions(&self, value: &str) -> bool {
        self.parts.iter().any(|p| p.as_str() == value)
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Flat string form, as sent on the wire.
    pub fn to_strings(&self) -> Vec<String> {
        self.parts.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl From<ErrorKind> for ErrorList {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strings().join(", "))
    }
}

impl Serialize for ErrorList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let [ErrorPart::Kind(kind)] = self.parts.as_slice() {
            return serializer.serialize_str(kind.as_str());
        }
        let mut seq = serializer.serialize_seq(Some(self.parts.len()))?;
        for part in &self.parts {
            seq.serialize_element(part.as_str())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ErrorList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            One(String),
            Many(Vec<String>),
        }

        let values = match Wire::deserialize(deserializer)? {
            Wire::One(code) => vec![code],
            Wire::Many(values) => values,
        };
        let parts = values
            .into_iter()
            .map(|v| match ErrorKind::from_str(&v) {
                Some(kind) => ErrorPart::Kind(kind),
                None => ErrorPart::Context(v),
            })
            .collect();
        Ok(Self { parts })
    }
}

/// A non-fatal, per-item failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// What went wrong.
    pub code: ErrorKind,
    /// The offending target (hash, or file name for uploads).
    pub hash: String,
    /// Backend message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Warning {
    pub fn new(code: ErrorKind, hash: impl Into<String>) -> Self {
        Self {
            code,
            hash: hash.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Fatal outcome of a command: the whole request rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("command failed: {errors}")]
pub struct CommandError {
    pub errors: ErrorList,
}

impl CommandError {
    pub fn new(errors: impl Into<ErrorList>) -> Self {
        Self {
            errors: errors.into(),
        }
    }

    /// The leading error code.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.errors.primary()
    }
}

impl From<ErrorList> for CommandError {
    fn from(errors: ErrorList) -> Self {
        Self { errors }
    }
}

impl From<ErrorKind> for CommandError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}
