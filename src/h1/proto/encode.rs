use bytes::BytesMut;
use http::{
    Method, Request, Version,
    header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING},
};

use crate::body::{BodySize, RequestBody};

use super::{
    codec::TransferCoding,
    context::Context,
    error::{Parse, ProtoError},
};

impl<const MAX_HEADERS: usize> Context<MAX_HEADERS> {
    /// encode request head into the write buffer and return the transfer
    /// coding for the request body.
    pub(super) fn encode_head(&mut self, buf: &mut BytesMut, req: &Request<RequestBody>) -> Result<TransferCoding, ProtoError> {
        // encode line of "Method PathQuery Version"
        let method = req.method().as_str().as_bytes();
        let path_and_query = req.uri().path_and_query().map(|u| u.as_str()).unwrap_or("/").as_bytes();
        let version: &[u8] = match req.version() {
            Version::HTTP_10 => b" HTTP/1.0",
            Version::HTTP_11 => b" HTTP/1.1",
            _ => return Err(ProtoError::Parse(Parse::HeaderName)),
        };

        buf.reserve(method.len() + 1 + path_and_query.len() + 11);

        buf.extend_from_slice(method);
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(path_and_query);
        buf.extend_from_slice(version);
        buf.extend_from_slice(b"\r\n");

        let mut encoder = TransferCoding::eof();

        for (name, value) in req.headers() {
            if *name == CONTENT_LENGTH {
                let len = value
                    .to_str()
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .ok_or(ProtoError::Parse(Parse::HeaderValue))?;
                encoder.try_set(TransferCoding::length(len))?;
            } else if *name == TRANSFER_ENCODING {
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

                encoder.try_set(TransferCoding::encode_chunked())?;
            } else if *name == CONNECTION && value.as_bytes().eq_ignore_ascii_case(b"close") {
                self.set_close();
            }

            buf.extend_from_slice(name.as_str().as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        // no explicit framing header. derive one from the body itself.
        if encoder.is_eof() {
            match BodySize::from(req.body()) {
                BodySize::None => {}
                BodySize::Sized(len) => {
                    let mut itoa_buf = itoa::Buffer::new();
                    buf.extend_from_slice(b"content-length: ");
                    buf.extend_from_slice(itoa_buf.format(len).as_bytes());
                    buf.extend_from_slice(b"\r\n");
                    encoder = TransferCoding::length(len as u64);
                }
                BodySize::Stream => {
                    buf.extend_from_slice(b"transfer-encoding: chunked\r\n");
                    encoder = TransferCoding::encode_chunked();
                }
            }
        }

        buf.extend_from_slice(b"\r\n");

        // responses to HEAD never carry a body regardless of framing headers.
        if *req.method() == Method::HEAD {
            self.set_head_method();
        }

        Ok(encoder)
    }
}
