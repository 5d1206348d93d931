use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::CredentialStore;

static ROUTE53_NS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ns-\d+\.awsdns-\d+\.(?:com|net|org|co\.uk)\.$").expect("valid NS pattern")
});

/// Map a nameserver hostname (dot-terminated) to the provider identifiers
/// it indicates. Empty result means the nameserver is unknown; that never
/// fails a resolution on its own.
///
/// Checked in priority order: an exact-match override section in the
/// credentials file beats the built-in patterns, so one NS record can map
/// to several providers or to one that has no recognizable signature.
pub fn classify(ns: &str, store: &CredentialStore) -> Vec<String> {
    let section = if store.has_section(ns) {
        Some(ns)
    } else {
        let trimmed = ns.trim_end_matches('.');
        store.has_section(trimmed).then_some(trimmed)
    };

    if let Some(section) = section {
        match store.provider_list(section) {
            Some(providers) if !providers.is_empty() => return providers,
            _ => {
                warn!("no provider configured for NS {}, skipping", ns);
                return Vec::new();
            }
        }
    }

    if ns.ends_with(".ns.cloudflare.com.") {
        return vec!["cloudflare".to_string()];
    }

    if ROUTE53_NS.is_match(ns) {
        return vec!["route53".to_string()];
    }

    debug!("unknown provider for NS {}", ns);
    Vec::new()
}
