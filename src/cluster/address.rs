//! Ordering of node addresses for election tie-breaks.

use std::cmp::Ordering;
use std::net::{IpAddr, SocketAddr};

/// Compare two node addresses.
///
/// Socket addresses and bare IP addresses compare numerically (IP first,
/// then port).  Anything else, including a mix of parseable and
/// unparseable addresses, falls back to byte-wise string order.
pub fn compare_addresses(a: &str, b: &str) -> Ordering {
    if let (Ok(a), Ok(b)) = (a.parse::<SocketAddr>(), b.parse::<SocketAddr>()) {
        return a.ip().cmp(&b.ip()).then(a.port().cmp(&b.port()));
    }
    if let (Ok(a), Ok(b)) = (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
        return a.cmp(&b);
    }
    a.cmp(b)
}
