//! Default storage configuration as exchanged with the backend.
//!
//! Only the fields the orchestrator touches are typed; everything else is
//! carried through untouched in the flattened `extra` maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default)]
    pub cold: ColdConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filecoin: Option<FilecoinConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Deal parameters for the Filecoin cold tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilecoinConfig {
    #[serde(default)]
    pub deal_min_duration: i64,
    #[serde(default)]
    pub max_price: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({
            "hot": {"enabled": true, "ipfs": {"addTimeout": 30}},
            "cold": {
                "enabled": true,
                "filecoin": {"replicationFactor": 1, "dealMinDuration": 518400, "maxPrice": 0}
            },
            "repairable": false
        });
        let config: StorageConfig = serde_json::from_value(raw.clone()).unwrap();
        let filecoin = config.cold.filecoin.as_ref().unwrap();
        assert_eq!(filecoin.deal_min_duration, 518400);
        assert_eq!(filecoin.extra["replicationFactor"], 1);

        assert_eq!(serde_json::to_value(&config).unwrap(), raw);
    }

    #[test]
    fn test_missing_filecoin_section() {
        let config: StorageConfig = serde_json::from_value(json!({"cold": {"enabled": false}})).unwrap();
        assert!(config.cold.filecoin.is_none());
    }
}
