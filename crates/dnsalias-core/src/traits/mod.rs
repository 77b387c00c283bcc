//! Core traits for the DNS alias system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DnsProvider`]: Hands out managed zones
//! - [`DnsZone`]: Reads and writes records in one zone
//! - [`SourceResolver`]: Resolves source names to addresses

pub mod dns_provider;
pub mod source_resolver;

pub use dns_provider::{DnsProvider, DnsProviderFactory, DnsRecord, DnsZone, RecordType};
pub use source_resolver::{ResolvedAddress, SourceResolver};
