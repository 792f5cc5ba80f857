use bytes::{Bytes, BytesMut};
use http::{
    Response, StatusCode, Version,
    header::{CONNECTION, CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue, TRANSFER_ENCODING},
};
use httparse::{EMPTY_HEADER, Status};

use super::{
    codec::TransferCoding,
    context::{ConnectionType, Context},
    error::{Parse, ProtoError},
};

impl<const MAX_HEADERS: usize> Context<MAX_HEADERS> {
    /// decode response head from the read buffer. returns the head and the
    /// body decoder when a complete head is buffered, `None` when more bytes
    /// are needed.
    pub(crate) fn decode_head(&mut self, buf: &mut BytesMut) -> Result<Option<(Response<()>, TransferCoding)>, ProtoError> {
        let mut headers = [EMPTY_HEADER; MAX_HEADERS];

        let mut parsed = httparse::Response::new(&mut headers);

        match parsed.parse(buf.as_ref())? {
            Status::Complete(len) => {
                let version = if parsed.version.unwrap() == 1 {
                    // keep-alive is the default for http/1.1 unless the response
                    // says otherwise.
                    self.set_ctype(ConnectionType::KeepAlive);
                    Version::HTTP_11
                } else {
                    // http/1.0 closes unless the response opts into keep-alive.
                    self.set_ctype(ConnectionType::Close);
                    Version::HTTP_10
                };

                let status = StatusCode::from_u16(parsed.code.unwrap()).map_err(|_| Parse::StatusCode)?;

                // record the offsets of headers inside the buffer before the
                // head is split off, so header values can share the buffer
                // allocation instead of copying.
                let mut header_idx = [HeaderIndex::EMPTY; MAX_HEADERS];
                let header_idx_slice = HeaderIndex::record(&mut header_idx, buf, parsed.headers);

                let headers_len = parsed.headers.len();

                // split the head from buffer. the remainder is body bytes.
                let slice = buf.split_to(len).freeze();

                let mut headers = HeaderMap::with_capacity(headers_len);

                let mut decoder = TransferCoding::eof();
                let mut saw_length = false;

                for idx in header_idx_slice {
                    self.try_write_header(&mut headers, &mut decoder, &mut saw_length, idx, &slice)?;
                }

                // a response with no framing header at all extends until the
                // peer closes the connection.
                if decoder.is_eof() && !saw_length && status_allows_body(status) {
                    decoder = TransferCoding::CloseDelimited;
                    self.set_ctype(ConnectionType::Close);
                }

                let mut res = Response::new(());

                *res.version_mut() = version;
                *res.status_mut() = status;
                *res.headers_mut() = headers;

                Ok(Some((res, decoder)))
            }
            Status::Partial => Ok(None),
        }
    }

    fn try_write_header(
        &mut self,
        headers: &mut HeaderMap,
        decoder: &mut TransferCoding,
        saw_length: &mut bool,
        idx: &HeaderIndex,
        slice: &Bytes,
    ) -> Result<(), ProtoError> {
        let name = HeaderName::from_bytes(&slice[idx.name.0..idx.name.1]).map_err(|_| Parse::HeaderName)?;
        let value = HeaderValue::from_maybe_shared(slice.slice(idx.value.0..idx.value.1))
            .map_err(|_| Parse::HeaderValue)?;

        if name == TRANSFER_ENCODING {
            let chunked = value
                .to_str()
                .map_err(|_| ProtoError::Parse(Parse::HeaderValue))?
                .rsplit(',')
                .next()
                .map(|v| v.trim().eq_ignore_ascii_case("chunked"))
                .unwrap_or(false);

            if !chunked {
                return Err(ProtoError::Parse(Parse::HeaderName));
            }

            *saw_length = true;
            decoder.try_set(TransferCoding::decode_chunked())?;
        } else if name == CONTENT_LENGTH {
            let len = value
                .to_str()
                .map_err(|_| ProtoError::Parse(Parse::HeaderValue))?
                .parse::<u64>()
                .map_err(|_| ProtoError::Parse(Parse::HeaderValue))?;

            *saw_length = true;

            if len != 0 {
                decoder.try_set(TransferCoding::length(len))?;
            }
        } else if name == CONNECTION {
            let v = value.as_bytes();
            if v.eq_ignore_ascii_case(b"keep-alive") {
                self.set_ctype(ConnectionType::KeepAlive);
            } else {
                // Treat all other values as close connection.
                self.set_ctype(ConnectionType::Close);
            }
        }

        headers.append(name, value);

        Ok(())
    }
}

fn status_allows_body(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    const EMPTY: Self = Self {
        name: (0, 0),
        value: (0, 0),
    };

    // httparse hands out sub slices of the read buffer. convert them to
    // offsets relative to the buffer start so they survive the head split.
    fn record<'a>(
        indices: &'a mut [HeaderIndex],
        buf: &BytesMut,
        headers: &[httparse::Header<'_>],
    ) -> &'a [HeaderIndex] {
        let base = buf.as_ptr() as usize;

        for (header, idx) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - base;
            let value_start = header.value.as_ptr() as usize - base;
            idx.name = (name_start, name_start + header.name.len());
            idx.value = (value_start, value_start + header.value.len());
        }

        &indices[..headers.len()]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode(head: &[u8]) -> (Context<16>, Response<()>, TransferCoding, BytesMut) {
        let mut ctx = Context::<16>::new();
        let mut buf = BytesMut::from(head);
        let (res, decoder) = ctx.decode_head(&mut buf).unwrap().unwrap();
        (ctx, res, decoder, buf)
    }

    #[test]
    fn partial_head() {
        let mut ctx = Context::<16>::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\ncontent-"[..]);
        assert!(ctx.decode_head(&mut buf).unwrap().is_none());
    }

    #[test]
    fn sized_response() {
        let (ctx, res, decoder, buf) = decode(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nbody");

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.version(), Version::HTTP_11);
        assert_eq!(res.headers().get(CONTENT_LENGTH).unwrap(), "4");
        assert!(matches!(decoder, TransferCoding::Length(4)));
        assert!(!ctx.is_connection_closed());
        // body bytes stay behind in the read buffer.
        assert_eq!(buf.as_ref(), b"body");
    }

    #[test]
    fn chunked_response() {
        let (_, _, decoder, _) = decode(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\n\r\n");
        assert!(matches!(decoder, TransferCoding::DecodeChunked(_)));

        let mut ctx = Context::<16>::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nTransfer-Encoding: identity\r\n\r\n"[..]);
        assert!(ctx.decode_head(&mut buf).is_err());
    }

    #[test]
    fn conflicting_framing_headers() {
        let mut ctx = Context::<16>::new();
        let mut buf =
            BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\nTransfer-Encoding: chunked\r\n\r\n"[..]);
        assert!(ctx.decode_head(&mut buf).is_err());
    }

    #[test]
    fn keep_alive_by_version() {
        let (ctx, ..) = decode(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        assert!(!ctx.is_connection_closed());

        let (ctx, ..) = decode(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        assert!(ctx.is_connection_closed());

        let (ctx, ..) = decode(b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n");
        assert!(ctx.is_connection_closed());

        let (ctx, ..) = decode(b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\nConnection: keep-alive\r\n\r\n");
        assert!(!ctx.is_connection_closed());
    }

    #[test]
    fn no_framing_header_is_close_delimited() {
        let (ctx, _, decoder, _) = decode(b"HTTP/1.1 200 OK\r\n\r\n");
        assert!(decoder.is_close_delimited());
        assert!(ctx.is_connection_closed());

        // status codes that can not carry a body stay at eof.
        let (ctx, _, decoder, _) = decode(b"HTTP/1.1 204 No Content\r\n\r\n");
        assert!(decoder.is_eof());
        assert!(!ctx.is_connection_closed());
    }

    #[test]
    fn malformed_status_line() {
        let mut ctx = Context::<16>::new();
        let mut buf = BytesMut::from(&b"HTP/1.1 200 OK\r\n\r\n"[..]);
        assert!(ctx.decode_head(&mut buf).is_err());
    }
}
