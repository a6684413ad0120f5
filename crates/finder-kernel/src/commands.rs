//! Command table.
//!
//! Every command the connector understands, with its argument schema. The
//! table is static: it is used to validate command names and to fill in
//! defaults for optional arguments. Missing required arguments are not
//! rejected here; the handler reports whatever error the missing value
//! leads to.

use std::fmt;
use std::str::FromStr;

use strum::{EnumIter, EnumString, IntoEnumIterator};

/// A known command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Command {
    Open,
    Ls,
    Tree,
    Parents,
    Tmb,
    File,
    Size,
    Mkdir,
    Mkfile,
    Rm,
    Rename,
    Duplicate,
    Paste,
    Upload,
    Get,
    Put,
    Archive,
    Extract,
    Search,
    Info,
    Dim,
    Resize,
    Netmount,
}

/// One argument in a command schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub required: bool,
    /// Value used when the argument is absent.
    pub default: Option<&'static str>,
}

const fn req(name: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        required: true,
        default: None,
    }
}

const fn opt(name: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        required: false,
        default: None,
    }
}

const fn opt_default(name: &'static str, default: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        required: false,
        default: Some(default),
    }
}

impl Command {
    /// Parse a command name. Returns `None` for unknown names.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Open => "open",
            Command::Ls => "ls",
            Command::Tree => "tree",
            Command::Parents => "parents",
            Command::Tmb => "tmb",
            Command::File => "file",
            Command::Size => "size",
            Command::Mkdir => "mkdir",
            Command::Mkfile => "mkfile",
            Command::Rm => "rm",
            Command::Rename => "rename",
            Command::Duplicate => "duplicate",
            Command::Paste => "paste",
            Command::Upload => "upload",
            Command::Get => "get",
            Command::Put => "put",
            Command::Archive => "archive",
            Command::Extract => "extract",
            Command::Search => "search",
            Command::Info => "info",
            Command::Dim => "dim",
            Command::Resize => "resize",
            Command::Netmount => "netmount",
        }
    }

    /// Argument schema of this command.
    pub fn schema(&self) -> &'static [ArgSpec] {
        match self {
            Command::Open => const { &[opt("target"), opt("tree"), opt("init"), opt("mimes")] },
            Command::Ls => const { &[req("target"), opt("mimes")] },
            Command::Tree => const { &[req("target")] },
            Command::Parents => const { &[req("target")] },
            Command::Tmb => const { &[req("targets")] },
            Command::File => const { &[req("targets"), opt("download")] },
            Command::Size => const { &[req("targets")] },
            Command::Mkdir => const { &[req("target"), req("name")] },
            Command::Mkfile => const { &[req("target"), req("name"), opt("mimes")] },
            Command::Rm => const { &[req("targets")] },
            Command::Rename => const { &[req("target"), req("name"), opt("mimes")] },
            Command::Duplicate => const { &[req("targets"), opt_default("suffix", "copy")] },
            Command::Paste => const { &[req("dst"), req("targets"), opt("cut"), opt("mimes")] },
            Command::Upload => const { &[req("target"), req("FILES"), opt("mimes"), opt("html")] },
            Command::Get => const { &[req("target")] },
            Command::Put => const { &[req("target"), opt_default("content", ""), opt("mimes")] },
            Command::Archive => const { &[req("targets"), req("type"), opt("mimes")] },
            Command::Extract => const { &[req("target"), opt("mimes")] },
            Command::Search => const { &[req("q"), opt("mimes")] },
            Command::Info => const { &[req("targets")] },
            Command::Dim => const { &[req("target")] },
            Command::Resize => const { &[
                req("target"),
                req("width"),
                req("height"),
                opt("mode"),
                opt("x"),
                opt("y"),
                opt("degree"),
                opt("bg"),
            ] },
            Command::Netmount => const { &[
                req("protocol"),
                req("host"),
                opt("path"),
                opt("port"),
                req("user"),
                req("pass"),
                opt("alias"),
                opt("options"),
            ] },
        }
    }

    /// Commands that iterate a `targets` list item by item.
    pub fn is_batch(&self) -> bool {
        matches!(
            self,
            Command::Rm
                | Command::Duplicate
                | Command::Paste
                | Command::Size
                | Command::Tmb
                | Command::Info
        )
    }

    /// Commands that may change volume contents.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::Mkdir
                | Command::Mkfile
                | Command::Rm
                | Command::Rename
                | Command::Duplicate
                | Command::Paste
                | Command::Upload
                | Command::Put
                | Command::Archive
                | Command::Extract
                | Command::Resize
        )
    }

    /// Every known command.
    pub fn all() -> impl Iterator<Item = Command> {
        Command::iter()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True iff `name` is a known command.
pub fn is_valid(name: &str) -> bool {
    Command::from_str(name).is_some()
}

/// Argument schema for `name`, or `None` for unknown commands.
pub fn schema(name: &str) -> Option<&'static [ArgSpec]> {
    Command::from_str(name).map(|c| c.schema())
}
