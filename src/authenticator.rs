use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::CredentialStore;
use crate::detect::{NsLookup, ProviderResolver};
use crate::dns::ClientFactory;
use crate::error::MixedDnsResult;

/// TTL for created validation records, in seconds.
pub const RECORD_TTL: u32 = 60;

/// DNS-01 authenticator for mixed DNS environments.
///
/// Owns the per-run state: the credential store (immutable after load), the
/// domain → providers registry and the per-identifier client cache. One
/// instance serves one certificate-issuance run; domains are processed
/// sequentially.
///
/// # Known limitation
///
/// [`cleanup`](Self::cleanup) is a no-op: validation records are **never
/// removed**. Stale `_acme-challenge` TXT records accumulate until the
/// operator deletes them.
pub struct Authenticator {
    store: CredentialStore,
    resolver: ProviderResolver,
    factory: ClientFactory,
}

impl Authenticator {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            resolver: ProviderResolver::new(),
            factory: ClientFactory::new(),
        }
    }

    /// Use a custom NS-lookup capability instead of the system resolver.
    pub fn with_lookup(store: CredentialStore, lookup: Arc<dyn NsLookup>) -> Self {
        Self {
            store,
            resolver: ProviderResolver::with_lookup(lookup),
            factory: ClientFactory::new(),
        }
    }

    pub fn from_file(path: &Path) -> MixedDnsResult<Self> {
        Ok(Self::new(CredentialStore::load(path)?))
    }

    pub fn credential_store(&self) -> &CredentialStore {
        &self.store
    }

    /// Determine which providers serve `domain`.
    pub async fn resolve_providers(&mut self, domain: &str) -> MixedDnsResult<Vec<String>> {
        self.resolver.resolve(&self.store, domain).await
    }

    /// Fulfill the challenge: create the TXT validation record with every
    /// provider detected for `domain`. Any failure aborts immediately; there
    /// is no partial success.
    pub async fn perform(
        &mut self,
        domain: &str,
        validation_name: &str,
        validation: &str,
    ) -> MixedDnsResult<()> {
        let providers = self.resolver.resolve(&self.store, domain).await?;

        for id in providers {
            let client = self.factory.get_client(&self.store, &id)?;
            let record_id = client
                .add_txt_record(domain, validation_name, validation, RECORD_TTL)
                .await?;
            info!(
                "created TXT record {} via {} [{}] ({})",
                validation_name,
                client.provider_name(),
                id,
                record_id
            );
        }

        Ok(())
    }

    /// No-op. Validation records are never removed; see the type-level docs.
    pub async fn cleanup(
        &self,
        domain: &str,
        _validation_name: &str,
        _validation: &str,
    ) -> MixedDnsResult<()> {
        warn!(
            "cleanup for {} is a no-op: validation records are not removed",
            domain
        );
        Ok(())
    }
}
