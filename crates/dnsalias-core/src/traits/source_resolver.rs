// # Source Resolver Trait
//
// Resolves source names to IPv4 addresses for the processor.
//
// ## Implementations
//
// - `resolver::HickorySourceResolver`: system configuration or an
//   explicit nameserver, via hickory-resolver
// - Test doubles in `tests/common`

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// One resolved address with the TTL it was served with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// IPv4 address
    pub address: Ipv4Addr,
    /// Remaining TTL in seconds
    pub ttl: u32,
}

/// Source of A record answers
///
/// "No records" and NXDOMAIN are successful empty answers; only failures
/// to get an answer at all are errors.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Resolve the A records of `name`
    ///
    /// # Parameters
    ///
    /// - `name`: Fully qualified name, with or without the trailing dot
    /// - `nameserver`: Nameserver to ask, `None` for the system resolver
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<ResolvedAddress>)`: The answer, possibly empty
    /// - `Err(Error)`: If no answer could be obtained
    async fn resolve_a(
        &self,
        name: &str,
        nameserver: Option<&str>,
    ) -> Result<Vec<ResolvedAddress>, crate::Error>;
}
