// Copyright 2024 The Ray Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Ray configuration.
//!
//! The subset of Ray's system config read by the GCS resource report path.
//! Values come from:
//! - Base64-encoded JSON config string from the Python launcher
//! - Environment variable overrides: `RAY_<snake_case_name>`

use std::time::Duration;

use crate::status::{RayError, RayResult};

/// Ray configuration parameters relevant to resource reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RayConfig {
    /// Period at which the GCS broadcasts resource usage batches to raylets.
    pub raylet_report_resources_period_milliseconds: u64,
}

impl Default for RayConfig {
    fn default() -> Self {
        Self {
            raylet_report_resources_period_milliseconds: 100,
        }
    }
}

impl RayConfig {
    /// Parse from base64-encoded JSON (as sent by Python launcher).
    pub fn from_base64_json(b64: &str) -> RayResult<Self> {
        let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)
            .map_err(|e| RayError::invalid_argument(format!("base64 decode error: {e}")))?;
        let json_str = String::from_utf8(decoded)
            .map_err(|e| RayError::invalid_argument(format!("UTF-8 decode error: {e}")))?;
        Self::from_json(&json_str)
    }

    /// Parse from a JSON object, then apply environment overrides.
    /// Unknown keys and values of the wrong type are ignored.
    pub fn from_json(json: &str) -> RayResult<Self> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| RayError::invalid_argument(format!("JSON parse error: {e}")))?;

        let mut config = Self::default();

        macro_rules! set_field {
            ($field:ident, u64) => {
                if let Some(v) = map.get(stringify!($field)).and_then(|v| v.as_u64()) {
                    config.$field = v;
                }
            };
        }

        set_field!(raylet_report_resources_period_milliseconds, u64);

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides of the form `RAY_<name>`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        macro_rules! env_override {
            ($field:ident, $ty:ty) => {
                let env_key = concat!("RAY_", stringify!($field));
                if let Some(val) = lookup(env_key) {
                    match val.parse::<$ty>() {
                        Ok(v) => self.$field = v,
                        Err(_) => tracing::warn!(env_key, value = %val, "Ignoring unparsable config override"),
                    }
                }
            };
        }

        env_override!(raylet_report_resources_period_milliseconds, u64);
    }

    /// The resource report broadcast period as a `Duration`.
    pub fn resource_broadcast_period(&self) -> Duration {
        Duration::from_millis(self.raylet_report_resources_period_milliseconds)
    }
}
