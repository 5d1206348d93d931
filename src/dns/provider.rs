use async_trait::async_trait;

use crate::error::MixedDnsResult;

#[async_trait]
pub trait DnsTxtProvider: Send + Sync {
    /// Create the TXT validation record and return the provider-side id of
    /// the created record (or change).
    ///
    /// The adapter locates the hosted zone itself by matching the domain's
    /// base-domain candidates against the zones visible to the account,
    /// longest candidate first.
    async fn add_txt_record(
        &self,
        domain: &str,
        record_name: &str,
        record_value: &str,
        ttl: u32,
    ) -> MixedDnsResult<String>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}
