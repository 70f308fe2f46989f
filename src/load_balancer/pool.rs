//! Origin pool and backend selection.
//!
//! # Responsibilities
//! - Own the configured origins (read-only after startup)
//! - Apply the load balancing policy to pick one origin per request

use std::sync::Arc;

use crate::config::{BackendConfig, ConfigError};
use crate::load_balancer::{origin::Origin, round_robin::RoundRobin, LoadBalancer};

/// Picks the origin for each reverse-proxied request.
///
/// Only [`BackendSelector::next`] is exposed; the policy state stays inside.
#[derive(Debug)]
pub struct BackendSelector {
    origins: Vec<Arc<Origin>>,
    policy: Box<dyn LoadBalancer>,
}

impl BackendSelector {
    /// Create a round-robin selector over a non-empty pool.
    pub fn new(origins: Vec<Origin>) -> Result<Self, ConfigError> {
        if origins.is_empty() {
            return Err(ConfigError::InvalidOrigin {
                address: String::new(),
                reason: "origin pool must not be empty".into(),
            });
        }
        Ok(Self {
            origins: origins.into_iter().map(Arc::new).collect(),
            policy: Box::new(RoundRobin::new()),
        })
    }

    /// Build the pool from backend configuration, in configured order.
    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, ConfigError> {
        let origins = configs
            .iter()
            .map(|config| {
                let origin = Origin::parse(&config.address).map_err(|e| ConfigError::InvalidOrigin {
                    address: config.address.clone(),
                    reason: e.to_string(),
                })?;
                Ok(match &config.name {
                    Some(name) => origin.with_name(name.clone()),
                    None => origin,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Self::new(origins)
    }

    /// Select the origin for the next request.
    pub fn next(&self) -> Arc<Origin> {
        match self.policy.next_server(&self.origins) {
            Some(origin) => origin,
            // The pool is non-empty by construction.
            None => self.origins[0].clone(),
        }
    }

    /// All origins, in configured order.
    pub fn origins(&self) -> &[Arc<Origin>] {
        &self.origins
    }
}
