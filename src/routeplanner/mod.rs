use std::{
    collections::{HashMap, HashSet},
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use ipnet::IpNet;
use parking_lot::Mutex;
use rand::Rng;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, warn};

use crate::{
    common::types::now_ms,
    configs::RoutePlannerConfig,
    protocol::routeplanner::{FailingAddress, IpBlock, RoutePlannerDetails, RoutePlannerStatus},
};

/// How long an address stays excluded after failing.
pub const FAILING_EXPIRY_MS: u64 = 7 * 24 * 60 * 60 * 1000;

pub trait RoutePlanner: Send + Sync {
    fn status(&self) -> RoutePlannerStatus;
    fn free_address(&self, address: IpAddr);
    fn free_all_addresses(&self);
    fn mark_failed(&self, address: IpAddr);
    /// The address the next outbound request should bind to.
    fn next_address(&self) -> Option<IpAddr>;
}

#[derive(Debug, thiserror::Error)]
#[error("invalid ip block '{0}'")]
pub struct InvalidBlock(String);

/// Spreads requests over every address of the configured blocks, skipping failing ones.
pub struct BalancingIpRoutePlanner {
    blocks: Vec<IpNet>,
    excluded: HashSet<IpAddr>,
    failing: Mutex<HashMap<IpAddr, u64>>,
    cursor: Mutex<Cursor>,
}

struct Cursor {
    block: usize,
    indices: Vec<u128>,
}

impl BalancingIpRoutePlanner {
    pub fn new(cidrs: &[String], excluded: &[String]) -> Result<Self, InvalidBlock> {
        let blocks = cidrs
            .iter()
            .map(|cidr| parse_block(cidr))
            .collect::<Result<Vec<_>, _>>()?;
        if blocks.is_empty() {
            return Err(InvalidBlock("<empty>".into()));
        }

        let excluded = excluded
            .iter()
            .filter_map(|raw| match IpAddr::from_str(raw) {
                Ok(ip) => Some(ip),
                Err(_) => {
                    warn!("Ignoring invalid excluded address '{}'", raw);
                    None
                }
            })
            .collect();

        Ok(Self {
            cursor: Mutex::new(Cursor {
                block: 0,
                indices: vec![0; blocks.len()],
            }),
            blocks,
            excluded,
            failing: Mutex::new(HashMap::new()),
        })
    }

    /// Builds the configured planner, or `None` when disabled or misconfigured.
    pub fn from_config(config: &RoutePlannerConfig) -> Option<Self> {
        if !config.enabled || config.cidrs.is_empty() {
            return None;
        }
        match Self::new(&config.cidrs, &config.excluded_ips) {
            Ok(planner) => Some(planner),
            Err(e) => {
                warn!("Route planner disabled: {}", e);
                None
            }
        }
    }

    fn next_candidate(&self) -> IpAddr {
        let mut cursor = self.cursor.lock();
        let block_idx = cursor.block % self.blocks.len();
        let block = self.blocks[block_idx];

        let host_bits = block.max_prefix_len() - block.prefix_len();
        let step = if host_bits > 7 {
            rand::thread_rng().gen_range(10..20)
        } else {
            1
        };
        cursor.indices[block_idx] = cursor.indices[block_idx].wrapping_add(step);
        let index = cursor.indices[block_idx];
        cursor.block = (block_idx + 1) % self.blocks.len();

        address_at(&block, index)
    }

    fn is_failing(&self, ip: &IpAddr, now: u64) -> bool {
        let mut failing = self.failing.lock();
        match failing.get(ip) {
            Some(&since) if now > since + FAILING_EXPIRY_MS => {
                failing.remove(ip);
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}

fn parse_block(raw: &str) -> Result<IpNet, InvalidBlock> {
    IpNet::from_str(raw)
        .or_else(|_| IpAddr::from_str(raw).map(IpNet::from))
        .map(|net| net.trunc())
        .map_err(|_| InvalidBlock(raw.to_string()))
}

fn address_at(block: &IpNet, index: u128) -> IpAddr {
    let host_bits = (block.max_prefix_len() - block.prefix_len()) as u32;
    let mask = 1u128.checked_shl(host_bits).map_or(u128::MAX, |n| n - 1);
    let offset = index & mask;
    match block {
        IpNet::V4(net) => IpAddr::V4(Ipv4Addr::from(
            u32::from(net.network()).wrapping_add(offset as u32),
        )),
        IpNet::V6(net) => IpAddr::V6(Ipv6Addr::from(
            u128::from(net.network()).wrapping_add(offset),
        )),
    }
}

fn block_size(block: &IpNet) -> String {
    let host_bits = (block.max_prefix_len() - block.prefix_len()) as u32;
    match 1u128.checked_shl(host_bits) {
        Some(n) if host_bits < 128 => n.to_string(),
        _ => format!("2^{host_bits}"),
    }
}

fn format_failing_time(timestamp_ms: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(timestamp_ms as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default()
}

impl RoutePlanner for BalancingIpRoutePlanner {
    fn status(&self) -> RoutePlannerStatus {
        let mut failing_addresses: Vec<FailingAddress> = self
            .failing
            .lock()
            .iter()
            .map(|(addr, ts)| FailingAddress {
                address: addr.to_string(),
                failing_timestamp: *ts,
                failing_time: format_failing_time(*ts),
            })
            .collect();
        failing_addresses.sort_by_key(|f| f.failing_timestamp);

        let first = self.blocks[0];
        let ip_block = IpBlock {
            block_type: match first {
                IpNet::V4(_) => "Inet4Address".into(),
                IpNet::V6(_) => "Inet6Address".into(),
            },
            size: block_size(&first),
        };

        if self.blocks.len() == 1 {
            let index = self.cursor.lock().indices[0];
            RoutePlannerStatus {
                class: Some("RotatingIpRoutePlanner".into()),
                details: Some(RoutePlannerDetails {
                    ip_block,
                    failing_addresses,
                    ip_index: Some(index.to_string()),
                    current_address: Some(address_at(&first, index).to_string()),
                }),
            }
        } else {
            RoutePlannerStatus {
                class: Some("BalancingIpRoutePlanner".into()),
                details: Some(RoutePlannerDetails {
                    ip_block,
                    failing_addresses,
                    ip_index: None,
                    current_address: None,
                }),
            }
        }
    }

    fn free_address(&self, address: IpAddr) {
        self.failing.lock().remove(&address);
    }

    fn free_all_addresses(&self) {
        self.failing.lock().clear();
    }

    fn mark_failed(&self, address: IpAddr) {
        debug!("Marking {} as failing", address);
        self.failing.lock().insert(address, now_ms());
    }

    fn next_address(&self) -> Option<IpAddr> {
        let now = now_ms();
        for _ in 0..100 {
            let ip = self.next_candidate();
            if !self.excluded.contains(&ip) && !self.is_failing(&ip, now) {
                return Some(ip);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(cidrs: &[&str], excluded: &[&str]) -> BalancingIpRoutePlanner {
        let cidrs: Vec<String> = cidrs.iter().map(|s| s.to_string()).collect();
        let excluded: Vec<String> = excluded.iter().map(|s| s.to_string()).collect();
        BalancingIpRoutePlanner::new(&cidrs, &excluded).unwrap()
    }

    #[test]
    fn addresses_stay_inside_the_block() {
        let planner = planner(&["10.0.0.0/29"], &[]);
        let block: IpNet = "10.0.0.0/29".parse().unwrap();
        for _ in 0..32 {
            let ip = planner.next_address().unwrap();
            assert!(block.contains(&ip), "{ip} escaped the block");
        }
    }

    #[test]
    fn failing_and_excluded_addresses_are_skipped() {
        let planner = planner(&["10.0.0.0/30"], &["10.0.0.1"]);
        planner.mark_failed("10.0.0.2".parse().unwrap());
        for _ in 0..16 {
            let ip = planner.next_address().unwrap();
            assert_ne!(ip, "10.0.0.1".parse::<IpAddr>().unwrap());
            assert_ne!(ip, "10.0.0.2".parse::<IpAddr>().unwrap());
        }
    }

    #[test]
    fn freeing_clears_failures() {
        let planner = planner(&["10.0.0.0/30"], &[]);
        planner.mark_failed("10.0.0.1".parse().unwrap());
        planner.mark_failed("10.0.0.2".parse().unwrap());
        assert_eq!(planner.status().details.unwrap().failing_addresses.len(), 2);

        planner.free_address("10.0.0.1".parse().unwrap());
        assert_eq!(planner.status().details.unwrap().failing_addresses.len(), 1);

        planner.free_all_addresses();
        assert!(planner.status().details.unwrap().failing_addresses.is_empty());
    }

    #[test]
    fn expired_failures_are_forgotten() {
        let planner = planner(&["10.0.0.0/30"], &[]);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        planner.failing.lock().insert(ip, 1_000);
        assert!(planner.is_failing(&ip, 1_000 + FAILING_EXPIRY_MS));
        assert!(!planner.is_failing(&ip, 1_001 + FAILING_EXPIRY_MS));
    }

    #[test]
    fn status_describes_the_block() {
        let status = planner(&["2001:db8::/64"], &[]).status();
        assert_eq!(status.class.as_deref(), Some("RotatingIpRoutePlanner"));
        let details = status.details.unwrap();
        assert_eq!(details.ip_block.block_type, "Inet6Address");
        assert_eq!(details.ip_block.size, "18446744073709551616");

        let status = planner(&["10.0.0.0/24", "10.0.1.0/24"], &[]).status();
        assert_eq!(status.class.as_deref(), Some("BalancingIpRoutePlanner"));
    }

    #[test]
    fn bad_blocks_are_rejected() {
        assert!(BalancingIpRoutePlanner::new(&["nope".into()], &[]).is_err());
        assert!(BalancingIpRoutePlanner::new(&[], &[]).is_err());
        assert!(BalancingIpRoutePlanner::new(&["10.0.0.7".into()], &[]).is_ok());
    }
}
