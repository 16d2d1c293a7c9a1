//! Resource kinds and helpers shared by the unit tests.
use std::time::{Duration, Instant};

use crate::*;

/// Stand-in for an uploaded texture: the placeholder is a single white pixel.
#[derive(Debug, PartialEq)]
pub(crate) struct Texture {
    pub(crate) data: Vec<u8>,
    pub(crate) is_placeholder: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("texture data is empty")]
pub(crate) struct EmptyTexture;

impl Texture {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Texture {
        Texture {
            data: bytes.to_vec(),
            is_placeholder: false,
        }
    }
}

impl Resource for Texture {
    type Error = EmptyTexture;

    fn placeholder() -> Texture {
        Texture {
            data: vec![0xff; 4],
            is_placeholder: true,
        }
    }

    fn load(bytes: &[u8]) -> Result<Texture, EmptyTexture> {
        if bytes.is_empty() {
            return Err(EmptyTexture);
        }
        Ok(Texture::from_bytes(bytes))
    }
}

/// A second kind, so that the same path can name two different resources.
#[derive(Debug, PartialEq)]
pub(crate) struct Sound(pub(crate) String);

impl Resource for Sound {
    type Error = std::str::Utf8Error;

    fn placeholder() -> Sound {
        Sound(String::new())
    }

    fn load(bytes: &[u8]) -> Result<Sound, std::str::Utf8Error> {
        Ok(Sound(std::str::from_utf8(bytes)?.to_string()))
    }
}

/// Poll `cond` until it holds, failing the test after a generous timeout.
pub(crate) fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "Timed out waiting for the worker");
        std::thread::sleep(Duration::from_millis(1));
    }
}
