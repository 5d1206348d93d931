pub type MixedDnsResult<T> = Result<T, MixedDnsError>;

#[derive(Debug, thiserror::Error)]
pub enum MixedDnsError {
    /// No provider could be determined for a domain after exhausting every
    /// base-domain candidate.
    #[error("no nameservers or provider configuration found for {domain}")]
    Resolution { domain: String },

    /// Credentials for a matched provider are missing or self-contradictory.
    #[error("{0}")]
    Credential(String),

    /// The provider API rejected a request, or no hosted zone matched.
    #[error("{provider}: {message}")]
    ProviderApi { provider: &'static str, message: String },

    /// The credentials file could not be read or parsed.
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl MixedDnsError {
    pub fn provider_api(provider: &'static str, message: impl Into<String>) -> Self {
        Self::ProviderApi {
            provider,
            message: message.into(),
        }
    }
}
