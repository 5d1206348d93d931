use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::provider::DnsTxtProvider;
use crate::detect::base_domain_guesses;
use crate::error::{MixedDnsError, MixedDnsResult};

const ROUTE53_API_BASE: &str = "https://route53.amazonaws.com";
const ROUTE53_REGION: &str = "us-east-1";
const ROUTE53_SERVICE: &str = "route53";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static HOSTED_ZONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<HostedZone>(.*?)</HostedZone>").expect("valid pattern"));
static ZONE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Id>/hostedzone/([^<]+)</Id>").expect("valid pattern"));
static ZONE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Name>([^<]+)</Name>").expect("valid pattern"));
static PRIVATE_ZONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<PrivateZone>\s*true\s*</PrivateZone>").expect("valid pattern"));
static IS_TRUNCATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<IsTruncated>\s*true\s*</IsTruncated>").expect("valid pattern"));
static NEXT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<NextMarker>([^<]+)</NextMarker>").expect("valid pattern"));
static CHANGE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Id>\s*(/change/[^<\s]+)\s*</Id>").expect("valid pattern"));

#[derive(Debug)]
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

/// Explicit credentials from the section win; otherwise fall back to the
/// ambient AWS environment variables.
fn resolve_credentials<F>(configured: Option<(&str, &str)>, env: F) -> MixedDnsResult<AwsCredentials>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some((id, key)) = configured {
        return Ok(AwsCredentials {
            access_key_id: id.to_string(),
            secret_access_key: key.to_string(),
            session_token: None,
        });
    }

    match (env("AWS_ACCESS_KEY_ID"), env("AWS_SECRET_ACCESS_KEY")) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token: env("AWS_SESSION_TOKEN"),
        }),
        _ => Err(MixedDnsError::provider_api(
            "route53",
            "no AWS credentials available; set access_key_id and secret_access_key in the \
             credentials file or export AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY",
        )),
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

struct Signature {
    amz_date: String,
    authorization: String,
}

/// AWS SigV4 over the request's host, date and payload.
fn sign(
    creds: &AwsCredentials,
    method: &str,
    host: &str,
    path: &str,
    query: &str,
    payload: &str,
    now: DateTime<Utc>,
) -> Signature {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut canonical_headers = format!("host:{host}\nx-amz-date:{amz_date}\n");
    let mut signed_headers = String::from("host;x-amz-date");
    if let Some(token) = &creds.session_token {
        canonical_headers.push_str(&format!("x-amz-security-token:{token}\n"));
        signed_headers.push_str(";x-amz-security-token");
    }

    let hashed_payload = hex::encode(Sha256::digest(payload.as_bytes()));
    let canonical_request =
        format!("{method}\n{path}\n{query}\n{canonical_headers}\n{signed_headers}\n{hashed_payload}");

    let credential_scope = format!("{date}/{ROUTE53_REGION}/{ROUTE53_SERVICE}/aws4_request");
    let hashed_canonical_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign =
        format!("AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{hashed_canonical_request}");

    let secret_date = hmac_sha256(
        format!("AWS4{}", creds.secret_access_key).as_bytes(),
        date.as_bytes(),
    );
    let secret_region = hmac_sha256(&secret_date, ROUTE53_REGION.as_bytes());
    let secret_service = hmac_sha256(&secret_region, ROUTE53_SERVICE.as_bytes());
    let secret_signing = hmac_sha256(&secret_service, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&secret_signing, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, \
         Signature={signature}",
        creds.access_key_id
    );

    Signature {
        amz_date,
        authorization,
    }
}

#[derive(Debug, Clone)]
struct HostedZone {
    id: String,
    name: String,
}

fn parse_hosted_zones(xml: &str) -> Vec<HostedZone> {
    let mut zones = Vec::new();
    for block in HOSTED_ZONE.captures_iter(xml) {
        let block = &block[1];
        if PRIVATE_ZONE.is_match(block) {
            continue;
        }
        let (Some(id), Some(name)) = (ZONE_ID.captures(block), ZONE_NAME.captures(block)) else {
            continue;
        };
        zones.push(HostedZone {
            id: id[1].to_string(),
            name: name[1].to_string(),
        });
    }
    zones
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn change_batch_body(record_name: &str, record_value: &str, ttl: u32) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ChangeResourceRecordSetsRequest xmlns="https://route53.amazonaws.com/doc/2013-04-01/">
  <ChangeBatch>
    <Comment>mixeddns certificate validation</Comment>
    <Changes>
      <Change>
        <Action>CREATE</Action>
        <ResourceRecordSet>
          <Name>{}</Name>
          <Type>TXT</Type>
          <TTL>{}</TTL>
          <ResourceRecords>
            <ResourceRecord>
              <Value>&quot;{}&quot;</Value>
            </ResourceRecord>
          </ResourceRecords>
        </ResourceRecordSet>
      </Change>
    </Changes>
  </ChangeBatch>
</ChangeResourceRecordSetsRequest>
"#,
        xml_escape(record_name),
        ttl,
        xml_escape(record_value)
    )
}

pub struct Route53Provider {
    client: Client,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    base_url: String,
}

impl Route53Provider {
    pub fn new(access_key_id: Option<String>, secret_access_key: Option<String>) -> Self {
        Self::with_base_url(access_key_id, secret_access_key, ROUTE53_API_BASE)
    }

    pub fn with_base_url(
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        base_url: &str,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            access_key_id,
            secret_access_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn credentials(&self) -> MixedDnsResult<AwsCredentials> {
        let configured = match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(key)) => Some((id.as_str(), key.as_str())),
            _ => None,
        };
        resolve_credentials(configured, |name| std::env::var(name).ok())
    }

    async fn signed_request(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<String>,
    ) -> MixedDnsResult<String> {
        let creds = self.credentials()?;

        let url = format!("{}{}", self.base_url, path_and_query);
        let parsed = reqwest::Url::parse(&url)
            .map_err(|e| MixedDnsError::provider_api("route53", format!("invalid URL {url}: {e}")))?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => {
                return Err(MixedDnsError::provider_api(
                    "route53",
                    format!("invalid URL {url}: missing host"),
                ))
            }
        };
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, query),
            None => (path_and_query, ""),
        };

        let payload = body.as_deref().unwrap_or("");
        let signature = sign(
            &creds,
            method.as_str(),
            &host,
            path,
            query,
            payload,
            Utc::now(),
        );

        let mut request = self
            .client
            .request(method, &url)
            .header("X-Amz-Date", &signature.amz_date)
            .header("Authorization", &signature.authorization);
        if let Some(token) = &creds.session_token {
            request = request.header("X-Amz-Security-Token", token);
        }
        if let Some(body) = body {
            request = request.header("Content-Type", "text/xml").body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(MixedDnsError::provider_api(
                "route53",
                format!("request failed ({status}): {text}"),
            ));
        }
        Ok(text)
    }

    async fn list_hosted_zones(&self) -> MixedDnsResult<Vec<HostedZone>> {
        let mut zones = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let path_and_query = match &marker {
                Some(marker) => format!("/2013-04-01/hostedzone?marker={marker}"),
                None => "/2013-04-01/hostedzone".to_string(),
            };
            let response = self.signed_request(Method::GET, &path_and_query, None).await?;
            zones.extend(parse_hosted_zones(&response));

            if !IS_TRUNCATED.is_match(&response) {
                break;
            }
            marker = NEXT_MARKER.captures(&response).map(|c| c[1].to_string());
            if marker.is_none() {
                break;
            }
        }

        Ok(zones)
    }

    fn match_zone<'z>(candidates: &[String], zones: &'z [HostedZone]) -> Option<&'z HostedZone> {
        let mut matches: Vec<&HostedZone> = Vec::new();
        for candidate in candidates {
            matches.extend(zones.iter().filter(|z| &z.name == candidate));
        }
        if matches.len() > 1 {
            warn!(
                "multiple hosted zones match ({}); using longest match {}",
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
impl DnsTxtProvider for Route53Provider {
    async fn add_txt_record(
        &self,
        domain: &str,
        record_name: &str,
        record_value: &str,
        ttl: u32,
    ) -> MixedDnsResult<String> {
        // Hosted zone names are dot-terminated.
        let candidates: Vec<String> = base_domain_guesses(domain)
            .into_iter()
            .map(|c| format!("{c}."))
            .collect();

        let zones = self.list_hosted_zones().await?;
        let zone = Self::match_zone(&candidates, &zones).ok_or_else(|| {
            MixedDnsError::provider_api("route53", format!("no hosted zone found for {}", domain))
        })?;
        debug!("using hosted zone {} ({}) for {}", zone.name, zone.id, domain);

        let body = change_batch_body(record_name, record_value, ttl);
        let response = self
            .signed_request(
                Method::POST,
                &format!("/2013-04-01/hostedzone/{}/rrset", zone.id),
                Some(body),
            )
            .await?;

        CHANGE_ID
            .captures(&response)
            .map(|c| c[1].to_string())
            .ok_or_else(|| {
                MixedDnsError::provider_api("route53", "missing change id in response")
            })
    }

    fn provider_name(&self) -> &'static str {
        "route53"
    }
}
