//! Relay/traversal endpoint configuration for peer connections
//!
//! Supplies the STUN/TURN entries a client needs before it can negotiate a
//! media path. Operators can override the built-in defaults by writing a
//! JSON list into the store; nothing here is call-scoped.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{IceServerConfig, SignalingConfig};
use crate::store::EphemeralStore;

const STUN_SERVERS_KEY: &str = "webrtc:stun_servers";
const TURN_SERVERS_KEY: &str = "webrtc:turn_servers";

/// Structural validation of a signaling configuration: at least one entry,
/// each with at least one URL, every URL on a stun/turn/turns scheme.
pub fn validate_config(config: &SignalingConfig) -> bool {
    if config.ice_servers.is_empty() {
        warn!("Signaling config has no ICE servers");
        return false;
    }
    for server in &config.ice_servers {
        if server.urls.is_empty() {
            warn!("ICE server entry has no URLs");
            return false;
        }
        for url in &server.urls {
            if !is_valid_ice_url(url) {
                warn!(url, "Invalid ICE server URL");
                return false;
            }
        }
    }
    true
}

fn is_valid_ice_url(url: &str) -> bool {
    url.starts_with("stun:") || url.starts_with("turn:") || url.starts_with("turns:")
}

fn default_stun_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig::stun("stun:stun.l.google.com:19302"),
        IceServerConfig::stun("stun:stun1.l.google.com:19302"),
        IceServerConfig::stun("stun:stun2.l.google.com:19302"),
    ]
}

/// Provides the relay/traversal endpoint set handed to clients
pub struct SignalingConfigService {
    store: Arc<dyn EphemeralStore>,
}

impl SignalingConfigService {
    pub fn new(store: Arc<dyn EphemeralStore>) -> Self {
        Self { store }
    }

    /// Full configuration: STUN entries followed by any TURN entries.
    pub async fn get_configuration(&self) -> Result<SignalingConfig> {
        let mut ice_servers = self.stun_servers().await?;
        ice_servers.extend(self.turn_servers().await?);

        debug!(entries = ice_servers.len(), "Signaling configuration assembled");
        Ok(SignalingConfig { ice_servers })
    }

    /// STUN entries: store override when present, built-in defaults otherwise.
    pub async fn stun_servers(&self) -> Result<Vec<IceServerConfig>> {
        match self.read_servers(STUN_SERVERS_KEY).await? {
            Some(servers) => Ok(servers),
            None => Ok(default_stun_servers()),
        }
    }

    /// TURN entries: store override when present, empty otherwise.
    pub async fn turn_servers(&self) -> Result<Vec<IceServerConfig>> {
        Ok(self.read_servers(TURN_SERVERS_KEY).await?.unwrap_or_default())
    }

    async fn read_servers(&self, key: &str) -> Result<Option<Vec<IceServerConfig>>> {
        match self.store.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn create_service() -> (Arc<MemoryStore>, SignalingConfigService) {
        let store = Arc::new(MemoryStore::new());
        let service = SignalingConfigService::new(store.clone());
        (store, service)
    }

    #[test]
    fn test_validate_rejects_empty_config() {
        assert!(!validate_config(&SignalingConfig { ice_servers: vec![] }));
    }

    #[test]
    fn test_validate_rejects_entry_without_urls() {
        let config = SignalingConfig {
            ice_servers: vec![IceServerConfig {
                urls: vec![],
                username: None,
                credential: None,
            }],
        };
        assert!(!validate_config(&config));
    }

    #[test]
    fn test_validate_rejects_wrong_scheme() {
        let config = SignalingConfig {
            ice_servers: vec![IceServerConfig::stun("http://x")],
        };
        assert!(!validate_config(&config));
    }

    #[test]
    fn test_validate_accepts_stun_turn_turns() {
        let config = SignalingConfig {
            ice_servers: vec![
                IceServerConfig::stun("stun:stun.example.com:3478"),
                IceServerConfig {
                    urls: vec![
                        "turn:turn.example.com:3478".to_string(),
                        "turns:turn.example.com:5349".to_string(),
                    ],
                    username: Some("user".to_string()),
                    credential: Some("pass".to_string()),
                },
            ],
        };
        assert!(validate_config(&config));
    }

    #[tokio::test]
    async fn test_defaults_are_valid_stun_servers() {
        let (_, service) = create_service();

        let config = service.get_configuration().await.unwrap();
        assert_eq!(config.ice_servers.len(), 3);
        assert!(validate_config(&config));
        assert!(config.ice_servers[0].urls[0].starts_with("stun:"));
    }

    #[tokio::test]
    async fn test_store_override_replaces_defaults() {
        let (store, service) = create_service();

        let override_servers = vec![IceServerConfig::stun("stun:stun.internal:3478")];
        store
            .set(
                STUN_SERVERS_KEY,
                &serde_json::to_string(&override_servers).unwrap(),
                None,
            )
            .await
            .unwrap();

        let turn_servers = vec![IceServerConfig {
            urls: vec!["turn:turn.internal:3478".to_string()],
            username: Some("user".to_string()),
            credential: Some("secret".to_string()),
        }];
        store
            .set(
                TURN_SERVERS_KEY,
                &serde_json::to_string(&turn_servers).unwrap(),
                None,
            )
            .await
            .unwrap();

        let config = service.get_configuration().await.unwrap();
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_servers[0].urls[0], "stun:stun.internal:3478");
        assert_eq!(config.ice_servers[1].username.as_deref(), Some("user"));
        assert!(validate_config(&config));
    }
}
