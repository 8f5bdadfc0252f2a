//! NUL-delimited framing
//!
//! Wire format: `<json text>\0<json text>\0...`. JSON text never contains a
//! raw NUL byte (string escapes encode it as `\u0000`), so the delimiter is
//! unambiguous and no length prefix is needed.

use crate::error::CodecError;
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

pub const DELIMITER: u8 = b'\0';

/// Encode one message or batch as a complete frame (payload + delimiter).
pub fn encode_frame<T: Serialize + ?Sized>(payload: &T) -> Result<Bytes, serde_json::Error> {
    let mut frame = serde_json::to_vec(payload)?;
    frame.push(DELIMITER);
    Ok(Bytes::from(frame))
}

/// Splits an inbound byte stream on NUL.
///
/// The decoder's buffer is the accumulator: bytes after the last delimiter
/// stay buffered until the rest of the frame arrives, however many reads that
/// takes. Yielded frames exclude the delimiter.
#[derive(Debug, Clone, Default)]
pub struct NulCodec {
    /// Bytes already scanned for a delimiter in the current partial frame.
    next_index: usize,
}

impl NulCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for NulCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        let scan_from = self.next_index.min(buf.len());
        match buf[scan_from..].iter().position(|b| *b == DELIMITER) {
            Some(offset) => {
                let end = scan_from + offset;
                self.next_index = 0;
                let mut frame = buf.split_to(end + 1);
                frame.truncate(end);
                Ok(Some(frame.freeze()))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        // An unterminated tail at end of stream is never a message.
        if !buf.is_empty() {
            tracing::debug!(bytes = buf.len(), "Discarding unterminated frame at end of stream");
            buf.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

impl<T: Serialize + ?Sized> Encoder<&T> for NulCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &T, dst: &mut BytesMut) -> Result<(), CodecError> {
        let json = serde_json::to_vec(item)?;
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(DELIMITER);
        Ok(())
    }
}
