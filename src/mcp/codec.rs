//! Newline-delimited JSON framing for the stdio transport.
//!
//! A line that is not valid JSON does not end the stream: it decodes to
//! [`Frame::Malformed`] so the server can answer with a parse error and keep
//! reading.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

/// Default maximum line length (16 MB)
pub const DEFAULT_MAX_LENGTH: usize = 16 * 1024 * 1024;

/// One decoded line
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    Message(T),
    /// The line could not be decoded; carries the reason
    Malformed(String),
}

#[derive(Debug)]
pub struct NdJsonCodec<T> {
    _phantom: PhantomData<T>,
    max_length: usize,
    /// Set while skipping the rest of an oversized line
    discarding: bool,
}

impl<T> NdJsonCodec<T> {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            _phantom: PhantomData,
            max_length,
            discarding: false,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl<T> Default for NdJsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for NdJsonCodec<T> {
    fn clone(&self) -> Self {
        Self::with_max_length(self.max_length)
    }
}

impl<T: DeserializeOwned> Decoder for NdJsonCodec<T> {
    type Item = Frame<T>;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > self.max_length {
                    // Drop what we have and skip up to the next newline
                    src.clear();
                    if !self.discarding {
                        self.discarding = true;
                        return Ok(Some(Frame::Malformed(format!(
                            "Message too large: more than {} bytes",
                            self.max_length
                        ))));
                    }
                }
                return Ok(None);
            };

            let line = src.split_to(pos);
            src.advance(1);

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_length {
                return Ok(Some(Frame::Malformed(format!(
                    "Message too large: {} > {}",
                    line.len(),
                    self.max_length
                ))));
            }

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(Some(match serde_json::from_slice(trimmed) {
                Ok(item) => Frame::Message(item),
                Err(e) => Frame::Malformed(format!("JSON error: {}", e)),
            }));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        // A final line without a trailing newline
        if src.is_empty() || self.discarding {
            src.clear();
            return Ok(None);
        }
        src.put_u8(b'\n');
        self.decode(src)
    }
}

impl<T: Serialize> Encoder<T> for NdJsonCodec<T> {
    type Error = std::io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // serde_json's compact form never contains a raw newline
        let json = serde_json::to_vec(&item)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, format!("JSON error: {}", e)))?;

        if json.len() > self.max_length {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Message too large: {} > {}", json.len(), self.max_length),
            ));
        }

        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
