//! Live table entries

use crate::processor::AliasProcessor;
use crate::traits::DnsProvider;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;

/// A configured provider instance
pub(crate) struct ProviderEntry {
    pub(crate) name: String,
    pub(crate) fingerprint: String,
    pub(crate) provider: Arc<dyn DnsProvider>,
    // Only meaningful while `configure` holds the provider table lock,
    // and on replaced entries, which stay marked.
    pending_delete: AtomicBool,
}

impl ProviderEntry {
    pub(crate) fn new(name: String, fingerprint: String, provider: Arc<dyn DnsProvider>) -> Self {
        Self {
            name,
            fingerprint,
            provider,
            pending_delete: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_pending_delete(&self) -> bool {
        self.pending_delete.load(Ordering::Acquire)
    }

    pub(crate) fn set_pending_delete(&self, value: bool) {
        self.pending_delete.store(value, Ordering::Release);
    }
}

pub(crate) struct EntryFlags {
    pub(crate) active: bool,
    pub(crate) pending_delete: bool,
    pub(crate) next_run: Instant,
}

pub(crate) struct EntryTask {
    pub(crate) processor: AliasProcessor,
    pub(crate) consecutive_failures: u32,
}

/// Scheduling wrapper around one alias
///
/// `flags` is held while the entry is re-queued, so a deactivation
/// either happens before the re-queue (and prevents it) or after it (and
/// the dispatcher discards the entry).
pub(crate) struct AliasEntry {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) fingerprint: String,
    pub(crate) provider: Arc<ProviderEntry>,
    pub(crate) flags: Mutex<EntryFlags>,
    pub(crate) task: tokio::sync::Mutex<EntryTask>,
}

impl AliasEntry {
    pub(crate) fn new(
        id: u64,
        name: String,
        fingerprint: String,
        provider: Arc<ProviderEntry>,
        processor: AliasProcessor,
        next_run: Instant,
    ) -> Self {
        Self {
            id,
            name,
            fingerprint,
            provider,
            flags: Mutex::new(EntryFlags {
                active: true,
                pending_delete: false,
                next_run,
            }),
            task: tokio::sync::Mutex::new(EntryTask {
                processor,
                consecutive_failures: 0,
            }),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.flags.lock().active
    }

    pub(crate) fn deactivate(&self) {
        self.flags.lock().active = false;
    }
}
