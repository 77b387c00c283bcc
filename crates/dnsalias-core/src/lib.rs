// # dnsalias-core
//
// Core library for the DNS alias replication daemon.
//
// ## Architecture Overview
//
// This library replicates resolved DNS answers from source names onto
// records in a managed zone:
// - **SourceResolver**: Trait for resolving source names to addresses
// - **DnsProvider / DnsZone**: Traits for reading and writing managed records
// - **AliasProcessor**: One alias, resolved and written when it changes
// - **Scheduler**: Adaptive priority-queue scheduler with live reconfiguration
// - **SingleRunExecutor**: One parallel pass over a configuration
// - **ProviderRegistry**: Plugin-based registry for DNS providers
// - **AlertSink**: Pluggable destinations for alerts
//
// ## Design Principles
//
// 1. **TTL-Driven**: Each alias is rechecked when its source answer expires
// 2. **Identity-Preserving Reloads**: Unchanged configuration keeps its state
// 3. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library

pub mod alert;
pub mod alias;
pub mod config;
pub mod error;
pub mod processor;
pub mod providers;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod secrets;
pub mod single_run;
pub mod traits;

// Re-export core types for convenience
pub use alert::{Alert, AlertCategory, AlertSink};
pub use alias::Alias;
pub use config::{ConfigDocument, SchedulerSettings};
pub use error::{Error, Result};
pub use processor::AliasProcessor;
pub use registry::ProviderRegistry;
pub use scheduler::{AliasStatus, ConfigureSummary, Scheduler};
pub use secrets::{EnvSecretProvider, SecretProvider, StaticSecretProvider};
pub use single_run::{SingleRunExecutor, SingleRunReport};
pub use traits::{DnsProvider, DnsZone, SourceResolver};
