//! Values passed to and returned from volume operations.

use std::path::PathBuf;
use std::str::FromStr;

use strum::EnumString;

/// An opened file, ready to be handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStream {
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub content: Vec<u8>,
}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Client-side file name.
    pub name: String,
    pub content: Vec<u8>,
    /// Where the transport spooled the upload, if it did.
    pub tmp_path: Option<PathBuf>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            tmp_path: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// What `resize` should do with the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ResizeMode {
    #[default]
    Resize,
    Crop,
    Rotate,
}

impl ResizeMode {
    /// Parse a mode name, falling back to `Resize`.
    pub fn parse(s: &str) -> Self {
        <Self as FromStr>::from_str(s).unwrap_or_default()
    }
}

/// Arguments of the `resize` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeRequest {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
    pub mode: ResizeMode,
    /// Background color for rotation, `#rrggbb`.
    pub bg: Option<String>,
    pub degree: i32,
}

impl ResizeRequest {
    pub fn resize(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            x: 0,
            y: 0,
            mode: ResizeMode::Resize,
            bg: None,
            degree: 0,
        }
    }
}
