//! Byte caps for uploaded files.
//!
//! The declared `Content-Length` is checked before the body is touched, and
//! each file field is counted while it streams in, so a lying header cannot
//! get more than the cap into memory.

use axum::extract::multipart::Field;
use axum::http::{HeaderMap, header::CONTENT_LENGTH};
use log::warn;

use crate::error::{AppError, AppResult};

/// Accumulates chunks, refusing to grow past `limit` bytes.
#[derive(Debug)]
pub struct CappedBuffer {
    limit: usize,
    buf: Vec<u8>,
}

impl CappedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            buf: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> AppResult<()> {
        if self.buf.len() + chunk.len() > self.limit {
            return Err(AppError::PayloadTooLarge);
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Reject a request up front when its declared length is over `limit`.
pub fn check_content_length(headers: &HeaderMap, limit: usize) -> AppResult<()> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    match declared {
        Some(length) if length > limit => {
            warn!("Rejecting request with Content-Length {length} (limit {limit})");
            Err(AppError::PayloadTooLarge)
        }
        _ => Ok(()),
    }
}

/// Drain a multipart file field, counting bytes as they arrive.
pub async fn read_field(mut field: Field<'_>, limit: usize) -> AppResult<Vec<u8>> {
    let mut buffer = CappedBuffer::new(limit);

    while let Some(chunk) = field.chunk().await? {
        buffer.push(&chunk)?;
    }

    Ok(buffer.into_inner())
}

/// Read a text field, treating an empty value as absent.
pub async fn read_text(field: Field<'_>) -> AppResult<Option<String>> {
    let text = field.text().await?;
    if text.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}
