//! Accumulator for multi-target commands.

use finder_types::{ErrorKind, Warning};

use crate::volume::VolumeError;

/// Results of iterating a target list: what succeeded and what did not.
///
/// Items are pushed in target order; a failure is recorded and iteration
/// carries on.
#[derive(Debug)]
pub struct Batch<T> {
    items: Vec<T>,
    warnings: Vec<Warning>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Batch<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn ok(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(code = %warning.code, target = %warning.hash, detail = ?warning.detail, "item failed");
        self.warnings.push(warning);
    }

    /// Target did not resolve to any volume.
    pub fn not_found(&mut self, hash: &str) {
        self.warn(Warning::new(ErrorKind::FileNotFound, hash));
    }

    /// Backend failure on `hash`, reported as `code`.
    pub fn failed(&mut self, code: ErrorKind, hash: &str, err: &VolumeError) {
        self.warn(Warning::new(code, hash).with_detail(err.to_string()));
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<Warning>) {
        (self.items, self.warnings)
    }
}
