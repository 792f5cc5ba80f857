use core::{future::poll_fn, mem, pin::Pin};

use std::io;

use bytes::BytesMut;
use futures_core::stream::Stream;
use http::{Request, Response, header::HOST};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{body::RequestBody, error::Error};

use super::{codec::TransferCoding, context::Context};

const MAX_HEADERS: usize = 64;

/// Run one request/response exchange over the stream. The request body is
/// fully drained before the response head is awaited. Returns the decoded
/// head, buffered read-ahead bytes, the body decoder and whether the
/// connection must be closed after the body is consumed.
pub(crate) async fn send<S>(
    stream: &mut S,
    req: &mut Request<RequestBody>,
) -> Result<(Response<()>, BytesMut, TransferCoding, bool), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);

    if !req.headers().contains_key(HOST) {
        if let Some(host) = req.uri().host() {
            buf.reserve(host.len() + 5);
            buf.extend_from_slice(host.as_bytes());

            if let Some(port) = req.uri().port() {
                let port = port.as_str();
                match port {
                    "80" | "443" => {}
                    _ => {
                        buf.extend_from_slice(b":");
                        buf.extend_from_slice(port.as_bytes());
                    }
                }
            }

            let val = http::HeaderValue::from_maybe_shared(buf.split().freeze()).unwrap();
            req.headers_mut().insert(HOST, val);
        }
    }

    let mut ctx = Context::<MAX_HEADERS>::new();

    // encode request head and return transfer encoding for request body.
    let encoder = ctx.encode_head(&mut buf, req)?;

    stream.write_all_buf(&mut buf).await?;

    // the body is taken out of the request. replay across retries and
    // redirect hops is the caller's concern.
    let mut body = mem::take(req.body_mut());

    if let Err(e) = send_body(stream, encoder, &mut body, &mut buf).await {
        // an error indicates the connection should be closed.
        ctx.set_close();
        // clear the buffer as there could be unfinished request data inside.
        buf.clear();

        // io errors are ignored here, as the server may want to explain why the
        // request body could not be written. if this is a connection error it
        // surfaces again when reading the response. other errors are propagated
        // as something is wrong locally and the server may still be waiting for
        // the request body, so reading a response would hang forever.
        match e {
            Error::Connection(_) => {}
            e => return Err(e),
        }
    }

    // read response head and get body decoder.
    loop {
        if let Some((res, mut decoder)) = try_read_response(stream, &mut buf, &mut ctx).await? {
            let is_close = ctx.is_connection_closed();

            if ctx.is_head_method() {
                decoder = TransferCoding::eof();
            }

            return Ok((res, buf, decoder, is_close));
        }
    }
}

async fn send_body<S>(
    stream: &mut S,
    mut encoder: TransferCoding,
    body: &mut RequestBody,
    buf: &mut BytesMut,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if !encoder.is_eof() {
        let mut body = Pin::new(body);

        // poll request body and encode. write before pulling the next chunk so
        // large bodies stream through the buffer instead of accumulating.
        while let Some(bytes) = poll_fn(|cx| body.as_mut().poll_next(cx)).await {
            let bytes = bytes.map_err(Error::Body)?;
            encoder.encode(bytes, buf);
            stream.write_all_buf(buf).await?;
        }

        // body is finished. encode eof and clean up.
        encoder.encode_eof(buf);

        stream.write_all_buf(buf).await?;
    }

    stream.flush().await?;

    Ok(())
}

async fn try_read_response<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    ctx: &mut Context<MAX_HEADERS>,
) -> Result<Option<(Response<()>, TransferCoding)>, Error>
where
    S: AsyncRead + Unpin,
{
    let n = stream.read_buf(buf).await?;

    if n == 0 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    ctx.decode_head(buf).map_err(Into::into)
}

#[cfg(test)]
mod test {
    use http::Method;
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn exchange_roundtrip() {
        let (mut client, mut server) = duplex(1024);

        let server = tokio::spawn(async move {
            let mut read = Vec::new();
            loop {
                let mut chunk = [0u8; 1024];
                let n = server.read(&mut chunk).await.unwrap();
                read.extend_from_slice(&chunk[..n]);
                if read.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            server
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nhi")
                .await
                .unwrap();
            read
        });

        let mut req = Request::builder()
            .method(Method::GET)
            .uri("http://foo.bar/996")
            .body(RequestBody::None)
            .unwrap();

        let (res, mut buf, mut decoder, is_close) = send(&mut client, &mut req).await.unwrap();

        assert_eq!(res.status(), http::StatusCode::OK);
        assert!(!is_close);

        let written = server.await.unwrap();
        let written = core::str::from_utf8(&written).unwrap();
        assert!(written.starts_with("GET /996 HTTP/1.1\r\n"));
        assert!(written.contains("host: foo.bar\r\n"));

        match decoder.decode(&mut buf) {
            super::super::codec::ChunkResult::Ok(bytes) => assert_eq!(bytes.as_ref(), b"hi"),
            _ => panic!("expected body chunk"),
        }
    }

    #[tokio::test]
    async fn streamed_request_body_is_chunked() {
        let (mut client, mut server) = duplex(4096);

        let server = tokio::spawn(async move {
            let mut read = Vec::new();
            loop {
                let mut chunk = [0u8; 1024];
                let n = server.read(&mut chunk).await.unwrap();
                read.extend_from_slice(&chunk[..n]);
                if read.windows(5).any(|w| w == b"0\r\n\r\n") {
                    break;
                }
            }
            server
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
            read
        });

        let body = futures::stream::iter([Ok::<_, crate::body::BodyError>(bytes::Bytes::from_static(b"mooring"))]);

        let mut req = Request::builder()
            .method(Method::POST)
            .uri("http://foo.bar/")
            .body(RequestBody::stream(body))
            .unwrap();

        let (res, _, decoder, _) = send(&mut client, &mut req).await.unwrap();
        assert_eq!(res.status(), http::StatusCode::OK);
        assert!(decoder.is_eof());

        let written = server.await.unwrap();
        let written = core::str::from_utf8(&written).unwrap();
        assert!(written.contains("transfer-encoding: chunked\r\n"));
        assert!(written.contains("7\r\nmooring\r\n0\r\n\r\n"));
    }
}
