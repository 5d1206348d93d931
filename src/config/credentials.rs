use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{MixedDnsError, MixedDnsResult};

/// One named section of the credentials file: flat string key/value pairs.
pub type Section = BTreeMap<String, String>;

/// Parsed credentials file, immutable after load.
///
/// Sections are top-level TOML tables. A section name is either a provider
/// identifier (`[cloudflare]`, `[route53]`, or a user-chosen name with a
/// `type` key), a literal domain name (`["example.com"]`, a per-zone
/// override), or a nameserver hostname (`["ns1.example.org."]`, a
/// classification override).
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    sections: BTreeMap<String, Section>,
}

impl CredentialStore {
    pub fn load(path: &Path) -> MixedDnsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MixedDnsError::Config(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> MixedDnsResult<Self> {
        let table: toml::Table = toml::from_str(content).map_err(|e| {
            MixedDnsError::Config(format!(
                "failed to parse credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut sections = BTreeMap::new();
        for (name, value) in table {
            let toml::Value::Table(entries) = value else {
                return Err(MixedDnsError::Config(format!(
                    "{}: top-level key '{}' is not a section",
                    path.display(),
                    name
                )));
            };

            let mut section = Section::new();
            for (key, value) in entries {
                let toml::Value::String(value) = value else {
                    return Err(MixedDnsError::Config(format!(
                        "{}: [{}] {} must be a string",
                        path.display(),
                        name,
                        key
                    )));
                };
                section.insert(key, value);
            }
            sections.insert(name, section);
        }

        Ok(Self {
            path: path.to_path_buf(),
            sections,
        })
    }

    /// Location the store was loaded from, for user-facing error messages.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    /// Look up a per-zone override section for a base-domain candidate.
    ///
    /// Same underlying data as [`provider_section`](Self::provider_section),
    /// separate accessor so the two roles a section name can play stay
    /// distinguishable at the call site.
    pub fn domain_override(&self, domain: &str) -> Option<&Section> {
        self.sections.get(domain)
    }

    /// Look up the credentials section for a provider identifier.
    pub fn provider_section(&self, id: &str) -> Option<&Section> {
        self.sections.get(id)
    }

    /// Split a section's `provider` value into trimmed identifiers, in
    /// listed order. `None` if the section has no `provider` key; an empty
    /// vec if the key holds nothing but separators.
    pub fn provider_list(&self, section: &str) -> Option<Vec<String>> {
        let value = self.get(section, "provider")?;
        Some(
            value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("credentials.toml")
    }

    pub fn config_dir() -> PathBuf {
        #[cfg(unix)]
        {
            PathBuf::from("/etc/mixeddns")
        }
        #[cfg(windows)]
        {
            PathBuf::from(r"C:\ProgramData\mixeddns")
        }
    }
}
