//! Shared fixtures for connector integration tests.

#![allow(dead_code)]

use serde_json::{Map, Value};

use finder_kernel::{Connector, ConnectorConfig, HashCodec, RootConfig};

/// Volume id of the first fixture root (`Test` driver).
pub const HOME: &str = "m1_";
/// Volume id of the second fixture root (`Memory` driver).
pub const SCRATCH: &str = "m2_";

/// Two roots: a seeded `Home` and a mostly empty `Scratch`.
pub fn config() -> ConnectorConfig {
    ConnectorConfig::default()
        .with_root(RootConfig::new("Test").with_alias("Home").with_seed([
            "docs/readme.txt=hello",
            "docs/notes.md=# notes",
            "photos/cat.png=meow",
            "empty/",
        ]))
        .with_root(RootConfig::new("Memory").with_alias("Scratch").with_seed(["inbox/"]))
}

pub async fn connector() -> Connector {
    Connector::open(config()).await
}

/// Hash of `path` on volume `id`.
pub fn hash(id: &str, path: &str) -> String {
    HashCodec::new(id).encode(path)
}

/// Turn a JSON object literal into request arguments.
pub fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("arguments must be an object, got {other}"),
    }
}
