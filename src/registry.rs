//! Capability registry: the static catalog of routable providers.
//!
//! The catalog is a JSON array of `{id, endpoint, description}` objects
//! (`name`/`url` are accepted as aliases), optionally wrapped as
//! `{"servers": [...]}`. It is validated once and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

use crate::error::{AgentError, Result};

/// One routable provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(alias = "url")]
    pub endpoint: Url,
    pub description: String,
}

impl ProviderDescriptor {
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the endpoint is not an absolute
    /// URI.
    pub fn new(
        id: impl Into<String>,
        endpoint: &str,
        description: impl Into<String>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AgentError::Config(format!("invalid endpoint '{endpoint}': {e}")))?;
        Ok(Self {
            id: id.into(),
            endpoint,
            description: description.into(),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Catalog {
    List(Vec<ProviderDescriptor>),
    Wrapped { servers: Vec<ProviderDescriptor> },
}

#[derive(Clone, Debug, Default)]
pub struct CapabilityRegistry {
    providers: Vec<ProviderDescriptor>,
}

impl CapabilityRegistry {
    /// Build a registry from descriptors, validating each one.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] on an empty field, a non-HTTP endpoint
    /// or a duplicate id.
    pub fn new(providers: Vec<ProviderDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for (index, provider) in providers.iter().enumerate() {
            validate(index, provider)?;
            if !seen.insert(provider.id.as_str()) {
                return Err(AgentError::Config(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
        }
        log::debug!("capability registry loaded providers={}", providers.len());
        Ok(Self { providers })
    }

    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the catalog is malformed or fails
    /// validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(json)
            .map_err(|e| AgentError::Config(format!("malformed registry: {e}")))?;
        let providers = match catalog {
            Catalog::List(providers) | Catalog::Wrapped { servers: providers } => providers,
        };
        Self::new(providers)
    }

    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the file cannot be read or its
    /// contents are invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("cannot read registry {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn lookup_all(&self) -> &[ProviderDescriptor] {
        &self.providers
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.providers.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn validate(index: usize, provider: &ProviderDescriptor) -> Result<()> {
    if provider.id.trim().is_empty() {
        return Err(AgentError::Config(format!("provider #{index} has an empty id")));
    }
    if provider.description.trim().is_empty() {
        return Err(AgentError::Config(format!(
            "provider '{}' has an empty description",
            provider.id
        )));
    }
    if !matches!(provider.endpoint.scheme(), "http" | "https") || provider.endpoint.host().is_none()
    {
        return Err(AgentError::Config(format!(
            "provider '{}' endpoint '{}' is not an http(s) URI",
            provider.id, provider.endpoint
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {"name": "MathServer", "url": "http://127.0.0.1:8000/sse", "description": "Arithmetic: add, subtract, multiply, divide"},
        {"id": "WeatherServer", "endpoint": "http://127.0.0.1:8001/sse", "description": "Weather forecasts"}
    ]"#;

    #[test]
    fn test_loads_catalog_with_aliases() -> anyhow::Result<()> {
        let registry = CapabilityRegistry::from_json(CATALOG)?;

        let ids: Vec<_> = registry.lookup_all().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["MathServer", "WeatherServer"]);
        let math = registry.get("MathServer").map(|p| p.endpoint.as_str());
        assert_eq!(math, Some("http://127.0.0.1:8000/sse"));
        Ok(())
    }

    #[test]
    fn test_wrapped_catalog() -> anyhow::Result<()> {
        let registry = CapabilityRegistry::from_json(
            r#"{"servers": [{"name": "A", "url": "https://a.example/sse", "description": "a"}]}"#,
        )?;
        assert_eq!(registry.len(), 1);
        Ok(())
    }

    #[test]
    fn test_empty_catalog_is_valid() -> anyhow::Result<()> {
        let registry = CapabilityRegistry::from_json("[]")?;
        assert!(registry.is_empty());
        Ok(())
    }

    #[test]
    fn test_malformed_catalog_is_config_error() {
        let err = CapabilityRegistry::from_json("{not json").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_missing_field_is_config_error() {
        let err = CapabilityRegistry::from_json(r#"[{"name": "A", "url": "http://a/sse"}]"#)
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_relative_endpoint_is_config_error() {
        let err = CapabilityRegistry::from_json(
            r#"[{"name": "A", "url": "/sse", "description": "a"}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_non_http_endpoint_is_config_error() {
        let err = CapabilityRegistry::from_json(
            r#"[{"name": "A", "url": "mailto:ops@example.com", "description": "a"}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("http(s)")));
    }

    #[test]
    fn test_duplicate_id_is_config_error() {
        let err = CapabilityRegistry::from_json(
            r#"[
                {"name": "A", "url": "http://a/sse", "description": "a"},
                {"name": "A", "url": "http://b/sse", "description": "b"}
            ]"#,
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_empty_description_is_config_error() {
        let err = CapabilityRegistry::new(vec![ProviderDescriptor {
            id: "A".into(),
            endpoint: Url::parse("http://a/sse").unwrap(),
            description: "  ".into(),
        }])
        .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = CapabilityRegistry::from_path("/nonexistent/servers.json").unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("cannot read")));
    }
}
