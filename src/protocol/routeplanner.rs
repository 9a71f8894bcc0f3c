use serde::{Deserialize, Serialize};

/// Body of `/routeplanner/status`. Both fields are null when no planner is configured.
#[derive(Debug, Serialize, Clone, Default)]
pub struct RoutePlannerStatus {
  pub class: Option<String>,
  pub details: Option<RoutePlannerDetails>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlannerDetails {
  pub ip_block: IpBlock,
  pub failing_addresses: Vec<FailingAddress>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ip_index: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub current_address: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct IpBlock {
  #[serde(rename = "type")]
  pub block_type: String,
  pub size: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailingAddress {
  pub address: String,
  pub failing_timestamp: u64,
  pub failing_time: String,
}

#[derive(Debug, Deserialize)]
pub struct FreeAddressRequest {
  pub address: String,
}
