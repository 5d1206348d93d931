use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::provider::DnsTxtProvider;
use crate::detect::base_domain_guesses;
use crate::error::{MixedDnsError, MixedDnsResult};

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub enum CloudflareAuth {
    /// Scoped API token (`Authorization: Bearer`).
    Token(String),
    /// Legacy global key tied to the account email.
    GlobalKey { email: String, key: String },
}

pub struct CloudflareProvider {
    client: Client,
    auth: CloudflareAuth,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CloudflareZone {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ZoneListResponse {
    success: bool,
    #[serde(default)]
    result: Option<Vec<CloudflareZone>>,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    success: bool,
    #[serde(default)]
    result: Option<CreatedRecord>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

impl CloudflareProvider {
    pub fn new(auth: CloudflareAuth) -> Self {
        Self::with_base_url(auth, CLOUDFLARE_API_BASE)
    }

    pub fn with_base_url(auth: CloudflareAuth, base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            auth,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            CloudflareAuth::Token(token) => request.bearer_auth(token),
            CloudflareAuth::GlobalKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    async fn get_zones(&self, url: &str) -> MixedDnsResult<Option<Vec<CloudflareZone>>> {
        let response = self.authorize(self.client.get(url)).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!("zone listing {} rejected ({}): {}", url, status, body);
            return Ok(None);
        }

        let parsed: ZoneListResponse = response.json().await?;
        if !parsed.success {
            return Ok(None);
        }
        Ok(parsed.result)
    }

    /// List the zones visible to the authenticated account.
    ///
    /// Tokens are often scoped to single zones and reject the unscoped
    /// listing; in that case each base-domain candidate is queried by name.
    async fn list_zones(&self, candidates: &[String]) -> MixedDnsResult<Vec<CloudflareZone>> {
        let url = format!("{}/zones?per_page=50", self.base_url);
        if let Some(zones) = self.get_zones(&url).await? {
            return Ok(zones);
        }

        let mut zones = Vec::new();
        for candidate in candidates {
            let url = format!("{}/zones?name={}&per_page=1", self.base_url, candidate);
            if let Some(found) = self.get_zones(&url).await? {
                zones.extend(found);
            }
        }
        Ok(zones)
    }

    fn match_zone<'z>(
        candidates: &[String],
        zones: &'z [CloudflareZone],
    ) -> Option<&'z CloudflareZone> {
        let mut matches: Vec<&CloudflareZone> = Vec::new();
        for candidate in candidates {
            matches.extend(zones.iter().filter(|z| &z.name == candidate));
        }
        if matches.len() > 1 {
            warn!(
                "multiple zones match ({}); using longest match {}",
                matches
                    .iter()
                    .map(|z| z.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                matches[0].name
            );
        }
        matches.first().copied()
    }
}

#[async_trait]
impl DnsTxtProvider for CloudflareProvider {
    async fn add_txt_record(
        &self,
        domain: &str,
        record_name: &str,
        record_value: &str,
        ttl: u32,
    ) -> MixedDnsResult<String> {
        let candidates = base_domain_guesses(domain);
        let zones = self.list_zones(&candidates).await?;

        let zone = Self::match_zone(&candidates, &zones).ok_or_else(|| {
            MixedDnsError::provider_api(
                "cloudflare",
                format!("no hosted zone found for {}", domain),
            )
        })?;
        debug!("using zone {} ({}) for {}", zone.name, zone.id, domain);

        let url = format!("{}/zones/{}/dns_records", self.base_url, zone.id);
        let body = json!({
            "type": "TXT",
            "name": record_name,
            "content": record_value,
            "ttl": ttl,
        });

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MixedDnsError::provider_api(
                "cloudflare",
                format!("record creation failed ({}): {}", status, body),
            ));
        }

        let parsed: CreateRecordResponse = response.json().await?;
        if !parsed.success {
            let detail = parsed
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(MixedDnsError::provider_api(
                "cloudflare",
                format!("record creation failed: {}", detail),
            ));
        }

        parsed
            .result
            .map(|r| r.id)
            .ok_or_else(|| MixedDnsError::provider_api("cloudflare", "missing record id in response"))
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn zone_list(zones: &[(&str, &str)]) -> serde_json::Value {
        json!({
            "success": true,
            "result": zones
                .iter()
                .map(|(id, name)| json!({"id": id, "name": name}))
                .collect::<Vec<_>>(),
        })
    }

    #[tokio::test]
    async fn test_add_txt_record_with_token_auth() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(header("Authorization", "Bearer cf-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_list(&[
                ("zone-1", "example.com"),
            ])))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/zones/zone-1/dns_records"))
            .and(header("Authorization", "Bearer cf-token"))
            .and(body_partial_json(json!({
                "type": "TXT",
                "name": "_acme-challenge.www.example.com",
                "content": "validation-value",
                "ttl": 60,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"id": "rec-123"},
                "errors": [],
            })))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::with_base_url(
            CloudflareAuth::Token("cf-token".to_string()),
            &server.uri(),
        );

        let record_id = provider
            .add_txt_record(
                "www.example.com",
                "_acme-challenge.www.example.com",
                "validation-value",
                60,
            )
            .await
            .unwrap();
        assert_eq!(record_id, "rec-123");
    }

    #[tokio::test]
    async fn test_global_key_auth_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(header("X-Auth-Email", "user@example.com"))
            .and(header("X-Auth-Key", "global-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_list(&[
                ("zone-1", "example.com"),
            ])))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/zones/zone-1/dns_records"))
            .and(header("X-Auth-Email", "user@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"id": "rec-9"},
                "errors": [],
            })))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::with_base_url(
            CloudflareAuth::GlobalKey {
                email: "user@example.com".to_string(),
                key: "global-key".to_string(),
            },
            &server.uri(),
        );

        let record_id = provider
            .add_txt_record("example.com", "_acme-challenge.example.com", "v", 60)
            .await
            .unwrap();
        assert_eq!(record_id, "rec-9");
    }

    #[tokio::test]
    async fn test_longest_zone_match_wins() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_list(&[
                ("zone-parent", "example.com"),
                ("zone-sub", "sub.example.com"),
            ])))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/zones/zone-sub/dns_records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"id": "rec-sub"},
                "errors": [],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = CloudflareProvider::with_base_url(
            CloudflareAuth::Token("t".to_string()),
            &server.uri(),
        );

        let record_id = provider
            .add_txt_record("www.sub.example.com", "_acme-challenge.www.sub.example.com", "v", 60)
            .await
            .unwrap();
        assert_eq!(record_id, "rec-sub");
    }

    #[tokio::test]
    async fn test_per_name_fallback_when_listing_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param_is_missing("name"))
            .respond_with(ResponseTemplate::new(403).set_body_string("listing forbidden"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", "example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_list(&[
                ("zone-1", "example.com"),
            ])))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", "www.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": [],
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .and(query_param("name", "com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": [],
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/zones/zone-1/dns_records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"id": "rec-1"},
                "errors": [],
            })))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::with_base_url(
            CloudflareAuth::Token("t".to_string()),
            &server.uri(),
        );

        let record_id = provider
            .add_txt_record("www.example.com", "_acme-challenge.www.example.com", "v", 60)
            .await
            .unwrap();
        assert_eq!(record_id, "rec-1");
    }

    #[tokio::test]
    async fn test_no_matching_zone_is_provider_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_list(&[
                ("zone-1", "other.org"),
            ])))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::with_base_url(
            CloudflareAuth::Token("t".to_string()),
            &server.uri(),
        );

        let err = provider
            .add_txt_record("www.example.com", "_acme-challenge.www.example.com", "v", 60)
            .await
            .unwrap_err();
        assert!(matches!(err, MixedDnsError::ProviderApi { provider: "cloudflare", .. }));
        assert!(err.to_string().contains("no hosted zone"));
    }

    #[tokio::test]
    async fn test_api_rejection_surfaces_error_detail() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_list(&[
                ("zone-1", "example.com"),
            ])))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/zones/zone-1/dns_records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "result": null,
                "errors": [{"code": 81057, "message": "record already exists"}],
            })))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::with_base_url(
            CloudflareAuth::Token("t".to_string()),
            &server.uri(),
        );

        let err = provider
            .add_txt_record("example.com", "_acme-challenge.example.com", "v", 60)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("record already exists"));
    }
}
