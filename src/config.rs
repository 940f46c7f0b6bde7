// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Engine configuration.
//!
//! An [`EngineConfig`] is captured in every [`Cluster`](crate::Cluster) snapshot, so all
//! operations that use the same snapshot agree on placement and windowing settings. It can be
//! built in code, read from a JSON document (feature `json`) or overlaid with environment
//! variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `TESSERA_ALLOW_OVERSUBSCRIPTION` | [`allow_oversubscription`](EngineConfig::allow_oversubscription) |
//! | `TESSERA_MAX_IN_FLIGHT_STEPS` | [`max_in_flight_steps`](EngineConfig::max_in_flight_steps) |
//! | `TESSERA_LOCALITY_CURVE` | [`locality_curve`](EngineConfig::locality_curve) |
use crate::{Error, Result, curve::Curve};

pub const ENV_ALLOW_OVERSUBSCRIPTION: &str = "TESSERA_ALLOW_OVERSUBSCRIPTION";
pub const ENV_MAX_IN_FLIGHT_STEPS: &str = "TESSERA_MAX_IN_FLIGHT_STEPS";
pub const ENV_LOCALITY_CURVE: &str = "TESSERA_LOCALITY_CURVE";

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct EngineConfig {
    /// Allow creating arrays with fewer partitions than compute nodes.
    ///
    /// Some nodes then host no partition at all. Useful for small test arrays, wasteful
    /// otherwise.
    pub allow_oversubscription: bool,

    /// How many time steps an iterative algorithm may have in flight before it has to wait for
    /// the oldest one to complete. See [`StepGate`](crate::StepGate).
    pub max_in_flight_steps: usize,

    /// Traversal order used to place partitions on compute nodes.
    pub locality_curve: Curve,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allow_oversubscription: false,
            max_in_flight_steps: 8,
            locality_curve: Curve::Hilbert,
        }
    }
}

impl EngineConfig {
    /// The configuration used by small, single-process test setups.
    pub fn for_testing() -> Self {
        Self {
            allow_oversubscription: true,
            ..Self::default()
        }
    }

    #[cfg(feature = "json")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }

    /// Reads the configuration from the process environment, on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overrides fields for which `lookup` returns a value.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(ENV_ALLOW_OVERSUBSCRIPTION) {
            self.allow_oversubscription = parse_bool(ENV_ALLOW_OVERSUBSCRIPTION, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_IN_FLIGHT_STEPS) {
            self.max_in_flight_steps = value.trim().parse().map_err(|err| {
                Error::Config(format!("{ENV_MAX_IN_FLIGHT_STEPS}={value:?}: {err}"))
            })?;
        }
        if let Some(value) = lookup(ENV_LOCALITY_CURVE) {
            self.locality_curve = match value.trim().to_ascii_lowercase().as_str() {
                "hilbert" => Curve::Hilbert,
                "linear" => Curve::Linear,
                _ => {
                    return Err(Error::Config(format!(
                        "{ENV_LOCALITY_CURVE}={value:?}: expected `hilbert` or `linear`"
                    )));
                }
            };
        }
        self.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.max_in_flight_steps == 0 {
            return Err(Error::Config(
                "max_in_flight_steps must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!("{key}={value:?}: expected a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(!config.allow_oversubscription);
        assert_eq!(config.max_in_flight_steps, 8);
        assert_eq!(config.locality_curve, Curve::Hilbert);
    }

    #[test]
    fn overlay_from_environment() {
        let config = EngineConfig::default()
            .overlay(env(&[
                (ENV_ALLOW_OVERSUBSCRIPTION, "yes"),
                (ENV_MAX_IN_FLIGHT_STEPS, " 3 "),
                (ENV_LOCALITY_CURVE, "Linear"),
            ]))
            .unwrap();
        assert!(config.allow_oversubscription);
        assert_eq!(config.max_in_flight_steps, 3);
        assert_eq!(config.locality_curve, Curve::Linear);
    }

    #[test]
    fn overlay_rejects_garbage() {
        let err = EngineConfig::default()
            .overlay(env(&[(ENV_ALLOW_OVERSUBSCRIPTION, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = EngineConfig::default()
            .overlay(env(&[(ENV_MAX_IN_FLIGHT_STEPS, "0")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(feature = "json")]
    #[test]
    fn from_json() {
        let config =
            EngineConfig::from_json_str(r#"{"allow_oversubscription": true, "locality_curve": "linear"}"#)
                .unwrap();
        assert!(config.allow_oversubscription);
        assert_eq!(config.max_in_flight_steps, 8);
        assert_eq!(config.locality_curve, Curve::Linear);

        assert!(EngineConfig::from_json_str(r#"{"max_in_flight": 3}"#).is_err());
    }
}
