use std::borrow::Cow;

use encoding_rs::{CoderResult, Decoder, Encoding};

use crate::errors::{GatewayError, Result};

/// Encodes an outgoing payload in the gateway's encoding.
pub fn encode_payload<'a>(encoding: &'static Encoding, payload: &'a str) -> Result<Cow<'a, [u8]>> {
    let (bytes, _, had_unmappable) = encoding.encode(payload);
    if had_unmappable {
        return Err(GatewayError::Unencodable {
            encoding: encoding.name(),
        });
    }
    Ok(bytes)
}

/// Streaming text decoder for one drain of the receive buffer.
///
/// The receive buffer is refilled chunk by chunk, so a multi-byte character can be
/// split across two reads. The inner decoder keeps the dangling lead bytes until the
/// next chunk arrives instead of emitting replacement characters.
pub struct ChunkDecoder {
    inner: Decoder,
    text: String,
}

impl ChunkDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        ChunkDecoder {
            inner: encoding.new_decoder_without_bom_handling(),
            text: String::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.decode(chunk, false);
    }

    /// Flushes any incomplete trailing sequence (as U+FFFD) and returns the text.
    pub fn finish(mut self) -> String {
        self.decode(&[], true);
        self.text
    }

    fn decode(&mut self, mut chunk: &[u8], last: bool) {
        loop {
            // NOTE: decode_to_string never grows the String itself, capacity must be reserved
            let needed = self
                .inner
                .max_utf8_buffer_length(chunk.len())
                .unwrap_or(chunk.len() * 3 + 16);
            self.text.reserve(needed);

            let (result, read, _) = self.inner.decode_to_string(chunk, &mut self.text, last);
            chunk = &chunk[read..];
            match result {
                CoderResult::InputEmpty => return,
                CoderResult::OutputFull => continue,
            }
        }
    }
}
