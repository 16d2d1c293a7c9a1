use std::collections::HashMap;
use std::io::{Error, ErrorKind};

use parking_lot::RwLock;

use crate::*;

/// A [ByteSource] over bytes kept in memory.
///
/// Useful for generated content which should still go through the normal load path, and for tests.
#[derive(Debug, Default)]
pub struct MemorySource(RwLock<HashMap<String, Vec<u8>, ahash::RandomState>>);

impl MemorySource {
    pub fn new() -> MemorySource {
        Default::default()
    }

    pub fn insert(&self, key: &str, value: Vec<u8>) -> Option<Vec<u8>> {
        self.0.write().insert(key.to_string(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.0.write().remove(key)
    }
}

impl ByteSource for MemorySource {
    fn contains(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, Error> {
        self.0
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "Entry not found"))
    }
}
