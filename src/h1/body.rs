use core::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use std::io;

use bytes::{Bytes, BytesMut};
use futures_core::stream::Stream;
use tokio::io::{AsyncRead, ReadBuf};

use crate::{body::BodyError, connection::ConnectionWithKey};

use super::proto::codec::{ChunkResult, TransferCoding};

// read window appended to the buffer per poll.
const READ_CHUNK: usize = 4096;

/// Streaming response body owning the leased connection for its lifetime.
///
/// The connection goes back to the pool only when the body is decoded to
/// completion on a keep-alive exchange. Dropping the body early leaves
/// trailing bytes on the wire, so the lease keeps its default and the
/// transport is closed instead.
pub struct ResponseBody {
    conn: ConnectionWithKey,
    buf: BytesMut,
    decoder: TransferCoding,
    reuse: bool,
}

impl ResponseBody {
    pub(crate) fn new(conn: ConnectionWithKey, buf: BytesMut, decoder: TransferCoding, reuse: bool) -> Self {
        Self {
            conn,
            buf,
            decoder,
            reuse,
        }
    }

    fn poll_read_more(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let len = self.buf.len();
        self.buf.resize(len + READ_CHUNK, 0);

        let mut buf = ReadBuf::new(&mut self.buf[len..]);

        match Pin::new(&mut *self.conn).poll_read(cx, &mut buf) {
            Poll::Ready(Ok(())) => {
                let n = buf.filled().len();
                self.buf.truncate(len + n);
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(e)) => {
                self.buf.truncate(len);
                Poll::Ready(Err(e))
            }
            Poll::Pending => {
                self.buf.truncate(len);
                Poll::Pending
            }
        }
    }
}

impl Stream for ResponseBody {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match this.decoder.decode(&mut this.buf) {
                ChunkResult::Ok(bytes) => return Poll::Ready(Some(Ok(bytes))),
                ChunkResult::Eof => {
                    // body fully drained. the connection is clean for reuse
                    // unless the exchange voted close.
                    if this.reuse {
                        this.conn.set_reuse_on_drop();
                    }
                    return Poll::Ready(None);
                }
                ChunkResult::Err(e) => return Poll::Ready(Some(Err(Box::new(crate::error::Error::from(e))))),
                ChunkResult::InsufficientData => match ready!(this.poll_read_more(cx)) {
                    Ok(0) => {
                        if this.decoder.is_close_delimited() {
                            // peer closing the stream terminates a body with no
                            // framing. the connection is spent either way.
                            this.decoder = TransferCoding::eof();
                            return Poll::Ready(None);
                        }
                        let e = io::Error::from(io::ErrorKind::UnexpectedEof);
                        return Poll::Ready(Some(Err(e.into())));
                    }
                    Ok(_) => {}
                    Err(e) => return Poll::Ready(Some(Err(e.into()))),
                },
            }
        }
    }
}
