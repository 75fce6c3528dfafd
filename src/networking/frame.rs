// Copyright (c) 2026 Blocknet
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Length-prefixed framing: `[unsigned LEB128 length][payload]`.
//!
//! Zero-length frames are keepalives and never surface from [`FrameReader`].
//! A stream that ends between frames is a clean close; one that ends inside a
//! frame is [`FrameError::Truncated`].

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use unsigned_varint::{decode, encode};

/// Payload bytes are pulled in chunks of at most this size.
const READ_CHUNK: usize = 8 * 1024;

/// Longest LEB128 encoding of a u64.
const MAX_VARINT_LEN: usize = 10;

/// Framing errors. All are fatal to the stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying transport error.
    #[error("io: {0}")]
    Io(#[from] io::Error),
    /// Stream ended inside a frame.
    #[error("stream closed mid-frame")]
    Truncated,
    /// Length prefix is not a minimal LEB128 value that fits in usize.
    #[error("malformed length prefix")]
    BadLength,
    /// Declared length exceeds the reader's cap.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    TooLarge {
        /// Declared length.
        len: u64,
        /// Configured cap.
        max: usize,
    },
}

/// Prefix `payload` with its LEB128 length.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = encode::usize_buffer();
    let prefix = encode::usize(payload.len(), &mut buf);
    let mut out = Vec::with_capacity(prefix.len() + payload.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(payload);
    out
}

/// Write one frame and flush.
pub async fn write_frame<W>(w: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(&encode_frame(payload)).await?;
    w.flush().await?;
    Ok(())
}

/// Pulls frames off a byte stream.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader; frames longer than `max_len` are rejected.
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_len,
        }
    }

    /// Next non-empty payload, or `None` once the stream closed between frames.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            let Some(len) = self.read_len().await? else {
                return Ok(None);
            };
            if len == 0 {
                continue;
            }
            if len > self.max_len as u64 {
                return Err(FrameError::TooLarge {
                    len,
                    max: self.max_len,
                });
            }
            let len = usize::try_from(len).map_err(|_| FrameError::BadLength)?;
            return self.read_payload(len).await.map(Some);
        }
    }

    async fn read_len(&mut self) -> Result<Option<u64>, FrameError> {
        let mut buf = [0u8; MAX_VARINT_LEN];
        for i in 0..MAX_VARINT_LEN {
            let mut byte = [0u8; 1];
            if self.inner.read(&mut byte).await? == 0 {
                return if i == 0 {
                    Ok(None)
                } else {
                    Err(FrameError::Truncated)
                };
            }
            buf[i] = byte[0];
            if decode::is_last(byte[0]) {
                let (len, _) = decode::u64(&buf[..=i]).map_err(|_| FrameError::BadLength)?;
                return Ok(Some(len));
            }
        }
        Err(FrameError::BadLength)
    }

    async fn read_payload(&mut self, len: usize) -> Result<Vec<u8>, FrameError> {
        let mut payload = Vec::with_capacity(len.min(READ_CHUNK));
        while payload.len() < len {
            let start = payload.len();
            let want = (len - start).min(READ_CHUNK);
            payload.resize(start + want, 0);
            let n = self.inner.read(&mut payload[start..]).await?;
            if n == 0 {
                return Err(FrameError::Truncated);
            }
            payload.truncate(start + n);
        }
        Ok(payload)
    }
}
