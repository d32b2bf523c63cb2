//! Newline-delimited line codec.
//!
//! Frames on `\n` with [`AnyDelimiterCodec`] and a maximum line length, then
//! decodes each line as UTF-8. Invalid sequences become U+FFFD instead of
//! failing the stream. A trailing `\r` is stripped.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

use crate::error::TransportError;

/// Default maximum accepted line length in bytes.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

#[derive(Debug)]
pub struct LineCodec {
    inner: AnyDelimiterCodec,
    max_length: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                max_length,
            ),
            max_length,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, TransportError> {
        match self.inner.decode(src) {
            Ok(chunk) => Ok(chunk.map(decode_line)),
            Err(e) => Err(map_codec_error(e, self.max_length)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, TransportError> {
        match self.inner.decode_eof(src) {
            Ok(chunk) => Ok(chunk.map(decode_line)),
            Err(e) => Err(map_codec_error(e, self.max_length)),
        }
    }
}

impl<'a> Encoder<&'a str> for LineCodec {
    type Error = TransportError;

    fn encode(&mut self, line: &'a str, dst: &mut BytesMut) -> Result<(), TransportError> {
        // The length limit only applies to inbound lines.
        self.inner
            .encode(line, dst)
            .map_err(|e| map_codec_error(e, self.max_length))
    }
}

fn decode_line(chunk: Bytes) -> String {
    let line = match &chunk[..] {
        [rest @ .., b'\r'] => rest,
        line => line,
    };
    String::from_utf8_lossy(line).into_owned()
}

fn map_codec_error(e: AnyDelimiterCodecError, max_length: usize) -> TransportError {
    match e {
        AnyDelimiterCodecError::MaxChunkLengthExceeded => TransportError::LineTooLong(max_length),
        AnyDelimiterCodecError::Io(e) => TransportError::Io(e),
    }
}
