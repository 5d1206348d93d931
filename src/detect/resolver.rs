use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use tracing::{debug, warn};

use crate::config::CredentialStore;
use crate::detect::classifier::classify;
use crate::error::{MixedDnsError, MixedDnsResult};

/// Ordered base-domain candidates for `domain`, longest first.
///
/// `a.b.c.com` yields `a.b.c.com`, `b.c.com`, `c.com`, `com`.
pub fn base_domain_guesses(domain: &str) -> Vec<String> {
    let fragments: Vec<&str> = domain.split('.').collect();
    (0..fragments.len())
        .map(|i| fragments[i..].join("."))
        .collect()
}

/// NS-lookup capability consumed by the resolver.
///
/// An empty answer means NODATA; implementations map that to `Ok(vec![])`
/// rather than an error. Returned hostnames are dot-terminated.
#[async_trait]
pub trait NsLookup: Send + Sync {
    async fn resolve_ns(&self, name: &str) -> MixedDnsResult<Vec<String>>;
}

/// System resolver backed by hickory, using the host DNS configuration
/// when available.
pub struct SystemNsLookup {
    resolver: TokioResolver,
}

impl SystemNsLookup {
    pub fn new() -> Self {
        let resolver = match TokioResolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!(
                    "failed to load system DNS configuration, falling back to defaults: {}",
                    e
                );
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };
        Self { resolver }
    }
}

impl Default for SystemNsLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NsLookup for SystemNsLookup {
    async fn resolve_ns(&self, name: &str) -> MixedDnsResult<Vec<String>> {
        match self.resolver.ns_lookup(name).await {
            Ok(response) => Ok(response
                .iter()
                .map(|ns| dot_terminated(ns.to_string()))
                .collect()),
            Err(e) => {
                // NODATA, NXDOMAIN and transport failures all fall through
                // to the next (shorter) candidate.
                debug!("NS lookup for {} returned no answer: {}", name, e);
                Ok(Vec::new())
            }
        }
    }
}

fn dot_terminated(mut name: String) -> String {
    if !name.ends_with('.') {
        name.push('.');
    }
    name
}

/// Per-run provider detection. Owns the domain → provider-identifiers
/// registry; each domain is detected at most once per run.
pub struct ProviderResolver {
    lookup: Arc<dyn NsLookup>,
    registry: HashMap<String, Vec<String>>,
}

impl ProviderResolver {
    pub fn new() -> Self {
        Self::with_lookup(Arc::new(SystemNsLookup::new()))
    }

    pub fn with_lookup(lookup: Arc<dyn NsLookup>) -> Self {
        Self {
            lookup,
            registry: HashMap::new(),
        }
    }

    /// Determine which providers serve `domain`, walking base-domain
    /// candidates. An explicit credentials-file section for any candidate
    /// wins and no DNS lookup happens at all; otherwise the first candidate
    /// with any NS answer decides, even if every nameserver classifies as
    /// unknown.
    pub async fn resolve(
        &mut self,
        store: &CredentialStore,
        domain: &str,
    ) -> MixedDnsResult<Vec<String>> {
        if let Some(existing) = self.registry.get(domain) {
            return Ok(existing.clone());
        }

        let candidates = base_domain_guesses(domain);
        let mut providers: Vec<String> = Vec::new();

        let mut configured = false;
        for candidate in &candidates {
            let Some(section) = store.domain_override(candidate) else {
                continue;
            };
            configured = true;
            match store.provider_list(candidate) {
                Some(ids) if !ids.is_empty() => {
                    debug!("using configured providers {:?} for {}", ids, candidate);
                    for id in ids {
                        push_unique(&mut providers, id);
                    }
                }
                _ if section.contains_key("type") => {
                    // A zone section carrying its own credentials: the
                    // section name is the provider identifier.
                    debug!("using zone credentials section [{}] for {}", candidate, domain);
                    push_unique(&mut providers, candidate.clone());
                }
                _ => {
                    warn!(
                        "section [{}] in {} has neither a provider nor a type key",
                        candidate,
                        store.path().display()
                    );
                }
            }
            break;
        }

        if !configured {
            for candidate in &candidates {
                debug!("resolving {}:NS", candidate);
                match self.lookup.resolve_ns(candidate).await {
                    Ok(ns_records) if !ns_records.is_empty() => {
                        for ns in &ns_records {
                            for id in classify(ns, store) {
                                push_unique(&mut providers, id);
                            }
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("NS lookup for {} failed: {}", candidate, e);
                    }
                }
            }
        }

        if providers.is_empty() {
            return Err(MixedDnsError::Resolution {
                domain: domain.to_string(),
            });
        }

        self.registry.insert(domain.to_string(), providers.clone());
        Ok(providers)
    }

    /// Providers already detected for `domain`, if any.
    pub fn providers_for(&self, domain: &str) -> Option<&[String]> {
        self.registry.get(domain).map(Vec::as_slice)
    }
}

impl Default for ProviderResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn push_unique(providers: &mut Vec<String>, id: String) {
    if !providers.contains(&id) {
        providers.push(id);
    }
}

/// In-memory lookup with call recording, shared by the resolver and
/// authenticator tests.
#[cfg(test)]
pub(crate) struct MockLookup {
    answers: HashMap<String, Vec<String>>,
    failures: std::collections::HashSet<String>,
    calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockLookup {
    pub(crate) fn new() -> Self {
        Self {
            answers: HashMap::new(),
            failures: std::collections::HashSet::new(),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn answer(mut self, name: &str, ns_records: &[&str]) -> Self {
        self.answers.insert(
            name.to_string(),
            ns_records.iter().map(ToString::to_string).collect(),
        );
        self
    }

    pub(crate) fn failure(mut self, name: &str) -> Self {
        self.failures.insert(name.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl NsLookup for MockLookup {
    async fn resolve_ns(&self, name: &str) -> MixedDnsResult<Vec<String>> {
        self.calls.lock().unwrap().push(name.to_string());
        if self.failures.contains(name) {
            return Err(MixedDnsError::Config(format!("simulated failure for {}", name)));
        }
        Ok(self.answers.get(name).cloned().unwrap_or_default())
    }
}
