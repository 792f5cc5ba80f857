/// Context is exchange specific struct containing states for processing.
/// `MAX_HEADERS` bounds the header count accepted when decoding a response
/// head.
pub(crate) struct Context<const MAX_HEADERS: usize> {
    ctype: ConnectionType,
    head_method: bool,
}

/// Connection reuse verdict accumulated over the exchange.
#[derive(Clone, Copy, PartialEq)]
pub(super) enum ConnectionType {
    // no verdict yet. resolved when the response head is decoded.
    Init,
    KeepAlive,
    Close,
    // request side asked for close, or the request body failed mid write.
    // a response header can not override it.
    CloseForce,
}

impl<const MAX_HEADERS: usize> Context<MAX_HEADERS> {
    pub(crate) const fn new() -> Self {
        Self {
            ctype: ConnectionType::Init,
            head_method: false,
        }
    }

    pub(crate) fn set_head_method(&mut self) {
        self.head_method = true;
    }

    pub(crate) const fn is_head_method(&self) -> bool {
        self.head_method
    }

    pub(crate) fn set_close(&mut self) {
        self.ctype = ConnectionType::CloseForce;
    }

    pub(super) fn set_ctype(&mut self, ctype: ConnectionType) {
        if self.ctype != ConnectionType::CloseForce {
            self.ctype = ctype;
        }
    }

    /// Return true if the connection must not be reused after this exchange.
    pub(crate) const fn is_connection_closed(&self) -> bool {
        matches!(self.ctype, ConnectionType::Close | ConnectionType::CloseForce)
    }
}
