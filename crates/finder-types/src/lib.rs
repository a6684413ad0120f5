//! Wire types for the finder connector.
//!
//! A leaf crate with no internal dependencies: the shapes the connector
//! speaks to a file-manager client, independent of any transport.
//!
//! | Type              | Purpose                                        |
//! |-------------------|------------------------------------------------|
//! | [`FileNode`]      | One file or directory in a response            |
//! | [`ErrorKind`]     | Canonical error code                           |
//! | [`ErrorList`]     | Multi-part error array `[code, ctx, code2]`    |
//! | [`Warning`]       | Non-fatal per-item failure                     |
//! | [`Request`]       | `{command, args}` as handed over by transport  |
//! | [`Response`]      | The response envelope                          |
//! | [`VolumeOptions`] | Client options of a volume                     |

pub mod envelope;
pub mod error;
pub mod node;
pub mod options;

pub use envelope::{API_VERSION, RawFile, Request, Response};
pub use error::{CommandError, ErrorKind, ErrorList, ErrorPart, Warning};
pub use node::{DIRECTORY_MIME, FileNode};
pub use options::{Archivers, VolumeOptions};

/// Current time as unix seconds.
pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
