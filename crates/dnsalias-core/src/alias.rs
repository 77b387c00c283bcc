//! Immutable description of one source to destination mapping

use crate::config::AliasConfig;
use crate::error::{Error, Result};
use std::fmt;

/// Name used for the zone apex
pub const APEX: &str = "@";

/// One alias: source names are resolved and the union of their
/// addresses is written to `destination_name` in `destination_zone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    source_names: Vec<String>,
    source_servers: Option<Vec<String>>,
    destination_zone: String,
    destination_name: String,
}

impl Alias {
    /// Build an alias from explicit parts
    ///
    /// An empty destination name is normalized to [`APEX`]. Duplicate
    /// source names are dropped, keeping the first occurrence.
    pub fn new(
        source_names: Vec<String>,
        source_servers: Option<Vec<String>>,
        destination_zone: impl Into<String>,
        destination_name: impl Into<String>,
    ) -> Result<Self> {
        let mut names: Vec<String> = Vec::with_capacity(source_names.len());
        for name in source_names {
            if name.is_empty() {
                return Err(Error::config("Source names cannot be empty"));
            }
            if !names.contains(&name) {
                names.push(name);
            }
        }
        if names.is_empty() {
            return Err(Error::config("Missing required value: source.names"));
        }

        let destination_zone = destination_zone.into();
        if destination_zone.is_empty() {
            return Err(Error::config("Missing required value: destination.zone"));
        }

        let mut destination_name = destination_name.into();
        if destination_name.is_empty() {
            destination_name = APEX.to_string();
        }

        Ok(Self {
            source_names: names,
            source_servers,
            destination_zone,
            destination_name,
        })
    }

    /// Build an alias from its configuration fragment
    ///
    /// Without an explicit `destination.zone`, the name is split on its
    /// first dot: `portal.intranet.contoso.com` becomes name `portal` in
    /// zone `intranet.contoso.com`.
    pub fn from_config(config: &AliasConfig) -> Result<Self> {
        let (zone, name) = match &config.destination.zone {
            Some(zone) => (zone.clone(), config.destination.name.clone()),
            None => {
                let full = &config.destination.name;
                let (name, zone) = full
                    .split_once('.')
                    .ok_or_else(|| Error::config("Missing required value: destination.zone"))?;
                (zone.to_string(), name.to_string())
            }
        };

        Self::new(
            config.source.source_names()?,
            config.source.source_servers(),
            zone,
            name,
        )
    }

    /// Source names, in configured order
    pub fn source_names(&self) -> &[String] {
        &self.source_names
    }

    /// Explicit nameservers, `None` for the system resolver
    pub fn source_servers(&self) -> Option<&[String]> {
        self.source_servers.as_deref()
    }

    /// Destination zone apex
    pub fn destination_zone(&self) -> &str {
        &self.destination_zone
    }

    /// Destination name relative to the zone, [`APEX`] for the apex
    pub fn destination_name(&self) -> &str {
        &self.destination_name
    }

    /// Whether the destination is the zone apex
    pub fn is_apex(&self) -> bool {
        self.destination_name == APEX
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "alias([{}]->({},{}))",
            self.source_names.join(","),
            self.destination_name,
            self.destination_zone
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<Alias> {
        Alias::from_config(&AliasConfig::from_value(&value)?)
    }

    #[test]
    fn test_zone_inferred_from_first_dot() {
        let alias = parse(json!({
            "provider": "cf",
            "source": { "name": "a.example.com" },
            "destination": { "name": "portal.intranet.contoso.com" }
        }))
        .unwrap();

        assert_eq!(alias.destination_name(), "portal");
        assert_eq!(alias.destination_zone(), "intranet.contoso.com");
        assert_eq!(alias.source_servers(), None);
    }

    #[test]
    fn test_name_without_dot_needs_zone() {
        let err = parse(json!({
            "provider": "cf",
            "source": { "name": "a.example.com" },
            "destination": { "name": "portal" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("destination.zone"));
    }

    #[test]
    fn test_apex_normalization() {
        let alias = parse(json!({
            "provider": "cf",
            "source": { "names": ["a.example.com", "b.example.com", "a.example.com"] },
            "destination": { "name": "", "zone": "dest.com" }
        }))
        .unwrap();

        assert!(alias.is_apex());
        assert_eq!(alias.destination_name(), "@");
        assert_eq!(alias.source_names(), ["a.example.com", "b.example.com"]);
        assert_eq!(alias.to_string(), "alias([a.example.com,b.example.com]->(@,dest.com))");
    }

    #[test]
    fn test_single_server() {
        let alias = parse(json!({
            "provider": "cf",
            "source": { "name": "a.example.com", "server": "10.0.0.53" },
            "destination": { "name": "@", "zone": "dest.com" }
        }))
        .unwrap();

        assert!(alias.is_apex());
        assert_eq!(alias.source_servers(), Some(&["10.0.0.53".to_string()][..]));
    }
}
