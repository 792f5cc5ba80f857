use core::{cmp, fmt::Write, mem};

use bytes::{Buf, Bytes, BytesMut};
use tracing::warn;

use super::error::{Parse, ProtoError};

// bound on a single chunk-size line. a peer that can not terminate the size
// line within this window is framing garbage.
const CHUNK_LINE_LIMIT: usize = 1024;

/// Coder for different Transfer-Decoding/Transfer-Encoding.
pub(crate) enum TransferCoding {
    /// Coder used when a Content-Length header is passed with a positive integer,
    /// on either direction of the exchange.
    Length(u64),

    /// Decoder used when Transfer-Encoding is `chunked`.
    DecodeChunked(ChunkedDecoder),

    /// Encoder for when Transfer-Encoding includes `chunked`.
    EncodeChunked,

    /// Decoder for response with no framing header at all. The body extends
    /// until the peer closes the connection.
    CloseDelimited,

    /// No body is expected or the body has been fully decoded.
    Eof,
}

/// Outcome of one decode step.
pub(crate) enum ChunkResult {
    /// a chunk of decoded body bytes.
    Ok(Bytes),
    /// the source buffer holds no complete chunk. read more bytes.
    InsufficientData,
    /// the body is complete. the coder stays in eof state afterwards.
    Eof,
    Err(ProtoError),
}

impl TransferCoding {
    #[inline]
    pub(crate) const fn eof() -> Self {
        Self::Eof
    }

    #[inline]
    pub(crate) fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    #[inline]
    pub(crate) fn is_close_delimited(&self) -> bool {
        matches!(self, Self::CloseDelimited)
    }

    #[inline]
    pub(crate) const fn length(len: u64) -> Self {
        Self::Length(len)
    }

    #[inline]
    pub(crate) const fn decode_chunked() -> Self {
        Self::DecodeChunked(ChunkedDecoder {
            state: ChunkedState::Size,
            remaining: 0,
        })
    }

    #[inline]
    pub(crate) const fn encode_chunked() -> Self {
        Self::EncodeChunked
    }

    /// transition from the initial eof state exactly once. a second framing
    /// header, or a conflicting one, is a protocol violation.
    pub(crate) fn try_set(&mut self, other: Self) -> Result<(), ProtoError> {
        match *self {
            Self::Eof => {
                *self = other;
                Ok(())
            }
            _ => Err(ProtoError::Parse(Parse::HeaderName)),
        }
    }

    /// Encode body bytes into the write buffer.
    pub(crate) fn encode(&mut self, mut bytes: Bytes, buf: &mut BytesMut) {
        // Skip encoding empty bytes. This is to avoid writing the chunked
        // terminator early when user provided empty bytes by accident.
        if bytes.is_empty() {
            return;
        }

        match *self {
            Self::EncodeChunked => {
                let _ = write!(SizeHex(buf), "{:x}", bytes.len());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(&bytes);
                buf.extend_from_slice(b"\r\n");
            }
            Self::Length(ref mut remaining) => {
                if *remaining > 0 {
                    let len = cmp::min(*remaining, bytes.len() as u64);
                    buf.extend_from_slice(&bytes.split_to(len as usize));
                    *remaining -= len;
                }
            }
            Self::Eof => warn!(target: "h1_encode", "TransferCoding::Eof should not encode request body"),
            _ => warn!(target: "h1_encode", "decoder should not encode request body"),
        }
    }

    /// Encode end of body marker.
    pub(crate) fn encode_eof(&mut self, buf: &mut BytesMut) {
        match *self {
            Self::Eof | Self::Length(0) => {}
            Self::EncodeChunked => buf.extend_from_slice(b"0\r\n\r\n"),
            Self::Length(n) => {
                warn!(target: "h1_encode", "request body ended {n} bytes short of its content-length")
            }
            _ => {}
        }
    }

    /// Decode one body chunk from the read buffer. On [ChunkResult::Eof] the
    /// coder transitions to [TransferCoding::Eof] and stays there.
    pub(crate) fn decode(&mut self, src: &mut BytesMut) -> ChunkResult {
        match *self {
            Self::Length(0) => {
                *self = Self::Eof;
                ChunkResult::Eof
            }
            Self::Length(ref mut remaining) => {
                if src.is_empty() {
                    return ChunkResult::InsufficientData;
                }
                let len = src.len() as u64;
                let bytes = if *remaining > len {
                    *remaining -= len;
                    src.split().freeze()
                } else {
                    let mut rem = 0;
                    mem::swap(remaining, &mut rem);
                    src.split_to(rem as usize).freeze()
                };
                ChunkResult::Ok(bytes)
            }
            Self::DecodeChunked(ref mut decoder) => match decoder.decode(src) {
                ChunkResult::Eof => {
                    *self = Self::Eof;
                    ChunkResult::Eof
                }
                res => res,
            },
            Self::CloseDelimited => {
                if src.is_empty() {
                    ChunkResult::InsufficientData
                } else {
                    ChunkResult::Ok(src.split().freeze())
                }
            }
            Self::Eof => ChunkResult::Eof,
            Self::EncodeChunked => ChunkResult::Err(ProtoError::Parse(Parse::Chunk)),
        }
    }
}

// BytesMut sink for the hex chunk size line.
struct SizeHex<'a>(&'a mut BytesMut);

impl Write for SizeHex<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

/// Incremental decoder for `Transfer-Encoding: chunked` bodies. Operates on
/// whole size/trailer lines instead of single bytes. Partial lines stay in
/// the source buffer until more data arrives.
pub(crate) struct ChunkedDecoder {
    state: ChunkedState,
    remaining: u64,
}

enum ChunkedState {
    // expecting a "<hex-size>[;ext]\r\n" line.
    Size,
    // inside chunk data with `remaining` bytes left.
    Data,
    // expecting the "\r\n" terminating a data chunk.
    DataEnd,
    // after the zero size chunk. trailer lines until an empty line.
    Trailer,
}

impl ChunkedDecoder {
    fn decode(&mut self, src: &mut BytesMut) -> ChunkResult {
        loop {
            match self.state {
                ChunkedState::Size => {
                    let Some(line) = find_line(src) else {
                        if src.len() > CHUNK_LINE_LIMIT {
                            return ChunkResult::Err(ProtoError::Parse(Parse::ChunkSize));
                        }
                        return ChunkResult::InsufficientData;
                    };

                    let size = match parse_chunk_size(&src[..line]) {
                        Ok(size) => size,
                        Err(e) => return ChunkResult::Err(e),
                    };

                    src.advance(line + 2);

                    if size == 0 {
                        self.state = ChunkedState::Trailer;
                    } else {
                        self.remaining = size;
                        self.state = ChunkedState::Data;
                    }
                }
                ChunkedState::Data => {
                    if src.is_empty() {
                        return ChunkResult::InsufficientData;
                    }

                    let len = cmp::min(self.remaining, src.len() as u64);
                    let bytes = src.split_to(len as usize).freeze();
                    self.remaining -= len;

                    if self.remaining == 0 {
                        self.state = ChunkedState::DataEnd;
                    }

                    return ChunkResult::Ok(bytes);
                }
                ChunkedState::DataEnd => {
                    if src.len() < 2 {
                        return ChunkResult::InsufficientData;
                    }
                    if &src[..2] != b"\r\n" {
                        return ChunkResult::Err(ProtoError::Parse(Parse::Chunk));
                    }
                    src.advance(2);
                    self.state = ChunkedState::Size;
                }
                ChunkedState::Trailer => {
                    let Some(line) = find_line(src) else {
                        if src.len() > CHUNK_LINE_LIMIT {
                            return ChunkResult::Err(ProtoError::Parse(Parse::Chunk));
                        }
                        return ChunkResult::InsufficientData;
                    };

                    // trailer section ends with an empty line. trailer fields
                    // themselves are dropped.
                    src.advance(line + 2);

                    if line == 0 {
                        return ChunkResult::Eof;
                    }
                }
            }
        }
    }
}

fn find_line(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|w| w == b"\r\n")
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, ProtoError> {
    let mut size = 0u64;
    let mut digits = 0usize;

    for &b in line {
        let digit = match b {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            // whitespace or extension ends the size part. extensions are not supported
            // and get ignored.
            b' ' | b'\t' | b';' => break,
            _ => return Err(ProtoError::Parse(Parse::ChunkSize)),
        };

        size = size
            .checked_mul(16)
            .and_then(|size| size.checked_add(digit as u64))
            .ok_or(ProtoError::Parse(Parse::ChunkSize))?;
        digits += 1;
    }

    if digits == 0 {
        return Err(ProtoError::Parse(Parse::ChunkSize));
    }

    Ok(size)
}

#[cfg(test)]
mod test {
    use super::*;

    fn read(s: &str) -> u64 {
        parse_chunk_size(s.as_bytes()).unwrap()
    }

    #[test]
    fn chunk_size() {
        assert_eq!(1, read("1"));
        assert_eq!(1, read("01"));
        assert_eq!(0, read("0"));
        assert_eq!(10, read("A"));
        assert_eq!(10, read("a"));
        assert_eq!(255, read("Ff"));
        assert_eq!(255, read("Ff   "));
        // extensions do not influence the size.
        assert_eq!(1, read("1;extension"));

        assert!(parse_chunk_size(b"X").is_err());
        assert!(parse_chunk_size(b"1X").is_err());
        assert!(parse_chunk_size(b"-1").is_err());
        assert!(parse_chunk_size(b"").is_err());
        // overflow of u64.
        assert!(parse_chunk_size(b"fffffffffffffffff").is_err());
    }

    #[test]
    fn decode_chunked_body() {
        let mut decoder = TransferCoding::decode_chunked();
        let mut src = BytesMut::from("4\r\nmoor\r\n3\r\ning\r\n0\r\n\r\n");

        match decoder.decode(&mut src) {
            ChunkResult::Ok(bytes) => assert_eq!(bytes.as_ref(), b"moor"),
            _ => panic!("expected body chunk"),
        }
        match decoder.decode(&mut src) {
            ChunkResult::Ok(bytes) => assert_eq!(bytes.as_ref(), b"ing"),
            _ => panic!("expected body chunk"),
        }
        assert!(matches!(decoder.decode(&mut src), ChunkResult::Eof));
        assert!(decoder.is_eof());
    }

    #[test]
    fn decode_chunked_partial() {
        let mut decoder = TransferCoding::decode_chunked();

        let mut src = BytesMut::from("4\r\nmo");
        match decoder.decode(&mut src) {
            ChunkResult::Ok(bytes) => assert_eq!(bytes.as_ref(), b"mo"),
            _ => panic!("expected partial chunk"),
        }
        assert!(matches!(decoder.decode(&mut src), ChunkResult::InsufficientData));

        src.extend_from_slice(b"or\r\n0\r\n\r\n");
        match decoder.decode(&mut src) {
            ChunkResult::Ok(bytes) => assert_eq!(bytes.as_ref(), b"or"),
            _ => panic!("expected rest of chunk"),
        }
        assert!(matches!(decoder.decode(&mut src), ChunkResult::Eof));
    }

    #[test]
    fn decode_chunked_trailers_dropped() {
        let mut decoder = TransferCoding::decode_chunked();
        let mut src = BytesMut::from("1\r\nx\r\n0\r\nExpires: 0\r\n\r\n");

        match decoder.decode(&mut src) {
            ChunkResult::Ok(bytes) => assert_eq!(bytes.as_ref(), b"x"),
            _ => panic!("expected body chunk"),
        }
        assert!(matches!(decoder.decode(&mut src), ChunkResult::Eof));
        assert!(src.is_empty());
    }

    #[test]
    fn decode_length() {
        let mut decoder = TransferCoding::length(4);
        let mut src = BytesMut::from("moorline");

        match decoder.decode(&mut src) {
            ChunkResult::Ok(bytes) => assert_eq!(bytes.as_ref(), b"moor"),
            _ => panic!("expected body chunk"),
        }
        assert!(matches!(decoder.decode(&mut src), ChunkResult::Eof));
        // bytes beyond content-length stay in the buffer.
        assert_eq!(src.as_ref(), b"line");
    }

    #[test]
    fn encode_chunked_frames() {
        let mut encoder = TransferCoding::encode_chunked();
        let mut buf = BytesMut::new();

        encoder.encode(Bytes::from_static(b"mooring"), &mut buf);
        encoder.encode(Bytes::new(), &mut buf);
        encoder.encode_eof(&mut buf);

        assert_eq!(buf.as_ref(), b"7\r\nmooring\r\n0\r\n\r\n");
    }

    #[test]
    fn encode_length_clamped() {
        let mut encoder = TransferCoding::length(4);
        let mut buf = BytesMut::new();

        encoder.encode(Bytes::from_static(b"mooring"), &mut buf);
        encoder.encode_eof(&mut buf);

        assert_eq!(buf.as_ref(), b"moor");
    }
}
