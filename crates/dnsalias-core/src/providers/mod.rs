//! Built-in DNS providers
//!
//! - [`MemoryDnsProvider`]: in-process zones
//! - [`OptionDnsProvider`]: routes zones to nested providers

pub mod memory;
pub mod option;

pub use memory::{MemoryDnsProvider, MemoryProviderFactory, MemoryZone};
pub use option::{OptionDnsProvider, OptionProviderFactory};
