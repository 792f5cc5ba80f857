use core::ops::Deref;

use crate::error::InvalidUri;

/// request uri branched by transport security requirement of its scheme.
pub(crate) enum Uri<'a> {
    Tcp(&'a http::Uri),
    Tls(&'a http::Uri),
}

impl<'a> Uri<'a> {
    pub(crate) fn try_parse(uri: &'a http::Uri) -> Result<Self, InvalidUri> {
        if uri.host().is_none() {
            return Err(InvalidUri::MissingHost);
        }

        match uri.scheme_str() {
            Some("http" | "ws") => Ok(Uri::Tcp(uri)),
            Some("https" | "wss") => Ok(Uri::Tls(uri)),
            Some(_) => Err(InvalidUri::UnknownScheme),
            None => Err(InvalidUri::MissingScheme),
        }
    }

    pub(crate) fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl Deref for Uri<'_> {
    type Target = http::Uri;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Tcp(uri) | Self::Tls(uri) => uri,
        }
    }
}
