//! rigging.toml schema and built-in network profiles.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::executor::retry::RetryPolicy;
use crate::types::Address;

/// Timing, batching and retry behavior for one network identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Network identity (e.g. "local", "testnet")
    pub name: String,

    /// Numeric chain/network identifier
    pub chain_id: u64,

    /// JSON-RPC gateway that signs and relays operations
    #[serde(default)]
    pub gateway: Option<Url>,

    /// Submitting identity
    #[serde(default)]
    pub sender: Option<Address>,

    /// Pause after every operation so sequence numbers stay ordered
    #[serde(rename = "operation_delay_ms", with = "millis")]
    pub operation_delay: Duration,

    /// Pause between deployment batches
    #[serde(rename = "settle_delay_ms", with = "millis")]
    pub settle_delay: Duration,

    /// Liveness bound for a single confirmation
    #[serde(rename = "confirmation_timeout_ms", with = "millis")]
    pub confirmation_timeout: Duration,

    /// Interval between confirmation polls
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Maximum deployments per batch; `None` means a single batch
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Public networks where other identities compete for ordering
    #[serde(default)]
    pub contended: bool,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl NetworkProfile {
    /// Private single-node network: no pacing, no retries.
    pub fn local() -> Self {
        Self {
            name: "local".to_string(),
            chain_id: 31337,
            gateway: Url::parse("http://127.0.0.1:8545").ok(),
            sender: None,
            operation_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            confirmation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            batch_size: None,
            contended: false,
            retry: RetryPolicy::none(),
        }
    }

    /// Shared development network with light pacing.
    pub fn devnet() -> Self {
        Self {
            name: "devnet".to_string(),
            chain_id: 1337,
            gateway: None,
            operation_delay: Duration::from_millis(500),
            settle_delay: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            batch_size: Some(10),
            ..Self::local()
        }
    }

    pub fn testnet() -> Self {
        Self {
            name: "testnet".to_string(),
            chain_id: 11155111,
            gateway: None,
            operation_delay: Duration::from_secs(2),
            settle_delay: Duration::from_secs(10),
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            batch_size: Some(5),
            contended: true,
            retry: RetryPolicy::once(Duration::from_secs(5)),
            ..Self::local()
        }
    }

    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".to_string(),
            chain_id: 1,
            gateway: None,
            operation_delay: Duration::from_secs(3),
            settle_delay: Duration::from_secs(15),
            confirmation_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(3),
            batch_size: Some(3),
            contended: true,
            retry: RetryPolicy::once(Duration::from_secs(10)),
            ..Self::local()
        }
    }

    /// Retry policy deployments actually run with: none off contended networks.
    pub fn effective_retry(&self) -> RetryPolicy {
        if self.contended {
            self.retry
        } else {
            RetryPolicy::none()
        }
    }

    pub fn builtins() -> Vec<Self> {
        vec![Self::local(), Self::devnet(), Self::testnet(), Self::mainnet()]
    }

    /// Apply an override table on top of this profile.
    pub fn merged(mut self, name: &str, ov: &ProfileOverride) -> Self {
        self.name = name.to_string();
        if let Some(chain_id) = ov.chain_id {
            self.chain_id = chain_id;
        }
        if let Some(gateway) = &ov.gateway {
            self.gateway = Some(gateway.clone());
        }
        if let Some(sender) = &ov.sender {
            self.sender = Some(sender.clone());
        }
        if let Some(ms) = ov.operation_delay_ms {
            self.operation_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = ov.settle_delay_ms {
            self.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = ov.confirmation_timeout_ms {
            self.confirmation_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = ov.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(size) = ov.batch_size {
            // 0 in the file means "unbounded"
            self.batch_size = (size > 0).then_some(size);
        }
        if let Some(contended) = ov.contended {
            self.contended = contended;
        }
        if let Some(retries) = ov.max_retries {
            self.retry.max_retries = retries;
        }
        if let Some(ms) = ov.retry_backoff_ms {
            self.retry.network_backoff = Duration::from_millis(ms);
        }
        self
    }
}

/// Partial profile as written in rigging.toml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverride {
    /// Profile to start from; defaults to the built-in of the same name, then "local"
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub gateway: Option<Url>,
    #[serde(default)]
    pub sender: Option<Address>,
    #[serde(default)]
    pub operation_delay_ms: Option<u64>,
    #[serde(default)]
    pub settle_delay_ms: Option<u64>,
    #[serde(default)]
    pub confirmation_timeout_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub contended: Option<bool>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
}

/// Top-level rigging.toml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileOverride>,
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
