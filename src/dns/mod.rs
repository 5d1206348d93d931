mod cloudflare;
mod provider;
mod route53;

pub use cloudflare::{CloudflareAuth, CloudflareProvider};
pub use provider::DnsTxtProvider;
pub use route53::Route53Provider;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::CredentialStore;
use crate::error::{MixedDnsError, MixedDnsResult};

const CLOUDFLARE_TOKEN_URL: &str = "https://dash.cloudflare.com/?to=/:account/profile/api-tokens";

/// Construction strategy for a provider identifier. The identifier either
/// names a family directly or carries a `type` key in its credentials
/// section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Cloudflare,
    Route53,
}

impl ProviderKind {
    pub fn detect(id: &str, store: &CredentialStore) -> Option<Self> {
        let section_type = store
            .provider_section(id)
            .and_then(|section| section.get("type"))
            .map(String::as_str);
        if id == "cloudflare" || section_type == Some("cloudflare") {
            Some(Self::Cloudflare)
        } else if id == "route53" || section_type == Some("route53") {
            Some(Self::Route53)
        } else {
            None
        }
    }
}

/// Lazily constructs provider clients, memoizing one client per identifier
/// per run. Validation failures are not cached: a later call re-validates
/// against the store it is given.
pub struct ClientFactory {
    cache: HashMap<String, Arc<dyn DnsTxtProvider>>,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    pub fn get_client(
        &mut self,
        store: &CredentialStore,
        id: &str,
    ) -> MixedDnsResult<Arc<dyn DnsTxtProvider>> {
        if let Some(client) = self.cache.get(id) {
            return Ok(client.clone());
        }

        let client = build_client(store, id)?;
        debug!("constructed {} client for [{}]", client.provider_name(), id);
        self.cache.insert(id.to_string(), client.clone());
        Ok(client)
    }

    #[cfg(test)]
    pub(crate) fn insert_client(&mut self, id: &str, client: Arc<dyn DnsTxtProvider>) {
        self.cache.insert(id.to_string(), client);
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(store: &CredentialStore, id: &str) -> MixedDnsResult<Arc<dyn DnsTxtProvider>> {
    match ProviderKind::detect(id, store) {
        Some(ProviderKind::Cloudflare) => {
            let auth = validate_cloudflare(store, id)?;
            Ok(Arc::new(CloudflareProvider::new(auth)))
        }
        Some(ProviderKind::Route53) => {
            let section = store.provider_section(id);
            let get = |key: &str| section.and_then(|s| s.get(key)).cloned();
            Ok(Arc::new(Route53Provider::new(
                get("access_key_id"),
                get("secret_access_key"),
            )))
        }
        None => Err(MixedDnsError::Credential(format!(
            "{}: unknown provider type for section [{}]; set type = \"cloudflare\" or \
             \"route53\"",
            store.path().display(),
            id
        ))),
    }
}

/// Cloudflare accepts either a scoped API token or the legacy global
/// key/email pair, never both.
fn validate_cloudflare(store: &CredentialStore, id: &str) -> MixedDnsResult<CloudflareAuth> {
    let token = store.get(id, "api_token");
    let email = store.get(id, "api_email");
    let key = store.get(id, "api_key");

    match (token, email, key) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(MixedDnsError::Credential(format!(
            "{}: [{}] api_email and api_key are not needed when using an API Token",
            store.path().display(),
            id
        ))),
        (Some(token), None, None) => Ok(CloudflareAuth::Token(token.to_string())),
        (None, Some(email), Some(key)) => Ok(CloudflareAuth::GlobalKey {
            email: email.to_string(),
            key: key.to_string(),
        }),
        (None, Some(_), None) => Err(MixedDnsError::Credential(format!(
            "{}: [{}] api_key is required when using a Global API Key (see {})",
            store.path().display(),
            id,
            CLOUDFLARE_TOKEN_URL
        ))),
        (None, None, Some(_)) => Err(MixedDnsError::Credential(format!(
            "{}: [{}] api_email is required when using a Global API Key (should be the email \
             address associated with the Cloudflare account)",
            store.path().display(),
            id
        ))),
        (None, None, None) => Err(MixedDnsError::Credential(format!(
            "{}: [{}] either api_token (recommended), or api_email and api_key are required \
             (see {})",
            store.path().display(),
            id,
            CLOUDFLARE_TOKEN_URL
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn store(content: &str) -> CredentialStore {
        CredentialStore::parse(content, Path::new("/tmp/credentials.toml")).unwrap()
    }

    #[test]
    fn test_kind_detection() {
        let store = store(
            "[my-cf]\ntype = \"cloudflare\"\napi_token = \"t\"\n\n[my-aws]\ntype = \"route53\"\n",
        );
        assert_eq!(ProviderKind::detect("cloudflare", &store), Some(ProviderKind::Cloudflare));
        assert_eq!(ProviderKind::detect("route53", &store), Some(ProviderKind::Route53));
        assert_eq!(ProviderKind::detect("my-cf", &store), Some(ProviderKind::Cloudflare));
        assert_eq!(ProviderKind::detect("my-aws", &store), Some(ProviderKind::Route53));
        assert_eq!(ProviderKind::detect("unknown", &store), None);
    }

    #[test]
    fn test_cloudflare_token_and_key_conflict() {
        let store = store("[cloudflare]\napi_token = \"t\"\napi_email = \"e@example.com\"\n");
        let err = validate_cloudflare(&store, "cloudflare").unwrap_err();
        assert!(err.to_string().contains("not needed when using an API Token"));
    }

    #[test]
    fn test_cloudflare_email_without_key_names_missing_field() {
        let store = store("[cloudflare]\napi_email = \"e@example.com\"\n");
        let err = validate_cloudflare(&store, "cloudflare").unwrap_err();
        assert!(err.to_string().contains("api_key is required"));
    }

    #[test]
    fn test_cloudflare_key_without_email_names_missing_field() {
        let store = store("[cloudflare]\napi_key = \"k\"\n");
        let err = validate_cloudflare(&store, "cloudflare").unwrap_err();
        assert!(err.to_string().contains("api_email is required"));
    }

    #[test]
    fn test_cloudflare_no_credentials_points_at_token() {
        let store = store("");
        let err = validate_cloudflare(&store, "cloudflare").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("api_token"));
        assert!(message.contains("/tmp/credentials.toml"));
    }

    #[test]
    fn test_cloudflare_token_alone_is_valid() {
        let store = store("[cloudflare]\napi_token = \"t\"\n");
        assert!(matches!(
            validate_cloudflare(&store, "cloudflare").unwrap(),
            CloudflareAuth::Token(_)
        ));
    }

    #[test]
    fn test_route53_has_no_validation_error_path() {
        let store = store("");
        let mut factory = ClientFactory::new();
        let client = factory.get_client(&store, "route53").unwrap();
        assert_eq!(client.provider_name(), "route53");
    }

    #[test]
    fn test_unknown_identifier_is_credential_error() {
        let store = store("[mystery]\napi_token = \"t\"\n");
        let mut factory = ClientFactory::new();
        let err = match factory.get_client(&store, "mystery") {
            Ok(_) => panic!("expected an error for unknown provider type"),
            Err(e) => e,
        };
        assert!(matches!(err, MixedDnsError::Credential(_)));
        assert!(err.to_string().contains("unknown provider type"));
    }

    #[test]
    fn test_get_client_is_memoized() {
        let store = store("[cloudflare]\napi_token = \"t\"\n");
        let mut factory = ClientFactory::new();

        let first = factory.get_client(&store, "cloudflare").unwrap();
        let second = factory.get_client(&store, "cloudflare").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_validation_failures_are_not_cached() {
        let broken = store("[cloudflare]\napi_email = \"e@example.com\"\n");
        let fixed = store("[cloudflare]\napi_token = \"t\"\n");
        let mut factory = ClientFactory::new();

        assert!(factory.get_client(&broken, "cloudflare").is_err());
        // A corrected configuration succeeds within the same run.
        assert!(factory.get_client(&fixed, "cloudflare").is_ok());
    }

    #[test]
    fn test_clients_shared_across_identifiers_are_distinct() {
        let store = store(
            "[cloudflare]\napi_token = \"t\"\n\n[my-cf]\ntype = \"cloudflare\"\napi_token = \"u\"\n",
        );
        let mut factory = ClientFactory::new();

        let a = factory.get_client(&store, "cloudflare").unwrap();
        let b = factory.get_client(&store, "my-cf").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
