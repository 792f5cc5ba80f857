use core::{fmt, iter, net::SocketAddr};

use std::collections::vec_deque::{self, VecDeque};

use crate::connection::ConnectionKey;

// Get port from well-known URL schemes.
pub(crate) fn scheme_to_port(scheme: Option<&str>) -> Option<u16> {
    match scheme {
        Some("http" | "ws") => Some(80),
        Some("https" | "wss") => Some(443),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub(crate) enum Addrs {
    #[default]
    None,
    One(SocketAddr),
    Multi(VecDeque<SocketAddr>),
}

impl From<Option<SocketAddr>> for Addrs {
    fn from(addr: Option<SocketAddr>) -> Self {
        match addr {
            Some(addr) => Self::One(addr),
            None => Self::None,
        }
    }
}

/// Connection info passed to resolver and transport setup. Owns its host so
/// the request it originated from stays freely borrowable.
pub(crate) struct Connect {
    hostname: Box<str>,
    port: u16,
    addr: Addrs,
}

impl Connect {
    pub(crate) fn new(key: &ConnectionKey) -> Self {
        Self {
            hostname: key.host.clone(),
            port: key.port,
            addr: Addrs::None,
        }
    }

    /// Set list of resolved addresses.
    pub(crate) fn set_addrs<I>(&mut self, addrs: I)
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        let mut addrs = VecDeque::from_iter(addrs);
        self.addr = if addrs.len() < 2 {
            Addrs::from(addrs.pop_front())
        } else {
            Addrs::Multi(addrs)
        };
    }

    pub(crate) fn hostname(&self) -> &str {
        &self.hostname
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Get resolved request addresses.
    pub(crate) fn addrs(&self) -> AddrsIter<'_> {
        match self.addr {
            Addrs::None => AddrsIter::None,
            Addrs::One(addr) => AddrsIter::One(addr),
            Addrs::Multi(ref addrs) => AddrsIter::Multi(addrs.iter()),
        }
    }
}

impl fmt::Display for Connect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname(), self.port())
    }
}

/// Iterator over addresses resolved for a [`Connect`] request.
#[derive(Clone)]
pub(crate) enum AddrsIter<'a> {
    None,
    One(SocketAddr),
    Multi(vec_deque::Iter<'a, SocketAddr>),
}

impl Iterator for AddrsIter<'_> {
    type Item = SocketAddr;

    fn next(&mut self) -> Option<Self::Item> {
        match *self {
            Self::None => None,
            Self::One(addr) => {
                *self = Self::None;
                Some(addr)
            }
            Self::Multi(ref mut iter) => iter.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match *self {
            Self::None => (0, Some(0)),
            Self::One(_) => (1, Some(1)),
            Self::Multi(ref iter) => iter.size_hint(),
        }
    }
}

impl fmt::Debug for AddrsIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

impl iter::ExactSizeIterator for AddrsIter<'_> {}

impl iter::FusedIterator for AddrsIter<'_> {}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use crate::uri::Uri;

    use super::*;

    fn connect(uri: &str) -> Connect {
        let uri = uri.parse().unwrap();
        let uri = Uri::try_parse(&uri).unwrap();
        Connect::new(&ConnectionKey::from(&uri))
    }

    #[test]
    fn test_port_from_scheme() {
        assert_eq!(connect("http://example.com/").port(), 80);
        assert_eq!(connect("https://example.com:8443/").port(), 8443);
    }

    #[test]
    fn test_addr_iter_multi() {
        let localhost = SocketAddr::from((IpAddr::from(Ipv4Addr::LOCALHOST), 8080));
        let unspecified = SocketAddr::from((IpAddr::from(Ipv4Addr::UNSPECIFIED), 8080));

        let mut c = connect("http://example.com/");
        c.set_addrs([localhost, unspecified]);

        let mut iter = c.addrs();
        assert_eq!(iter.next(), Some(localhost));
        assert_eq!(iter.next(), Some(unspecified));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_addr_iter_single() {
        let localhost = SocketAddr::from((IpAddr::from(Ipv4Addr::LOCALHOST), 8080));

        let mut iter = AddrsIter::One(localhost);
        assert_eq!(iter.next(), Some(localhost));
        assert_eq!(iter.next(), None);

        let mut iter = AddrsIter::None;
        assert_eq!(iter.next(), None);
    }
}
