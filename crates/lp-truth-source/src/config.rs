// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Run configuration: tracked pools, target block and query tuning.

use std::{collections::HashSet, path::PathBuf, time::Duration};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use url::Url;

use crate::error::TruthSourceError;

/// Default values for optional configuration fields
pub mod defaults {
    use crate::LOG_QUERY_CHUNK_SIZE;

    pub const fn max_concurrent_queries() -> usize {
        16
    }

    pub const fn log_query_chunk_size() -> u64 {
        LOG_QUERY_CHUNK_SIZE
    }

    pub const fn subgraph_timeout_secs() -> u64 {
        30
    }
}

/// Which side of the pair holds the reward token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardToken {
    /// Reward token is `token0`, its reserve is `reserve0`
    #[default]
    Token0,
    /// Reward token is `token1`, its reserve is `reserve1`
    Token1,
}

/// A tracked liquidity pool. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    /// Human readable pool name used in logs and reports, e.g. `KEEPETH`
    pub name: String,
    /// Pair contract, also the pool-token ERC-20
    pub pair_address: Address,
    /// LP rewards contract pool tokens are staked into
    pub rewards_address: Address,
    /// First block scanned for `Transfer` events
    pub creation_block: u64,
    /// Audit file for this pool's derived holdings
    pub output_path: PathBuf,
    /// Pair side holding the reward token
    #[serde(default)]
    pub reward_token: RewardToken,
}

/// Where pair reserve snapshots come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReserveSourceConfig {
    /// Read `getReserves()` and `totalSupply()` from the pair contract at the latest block
    #[default]
    PairContract,
    /// Query a Uniswap V2 subgraph
    Subgraph {
        /// GraphQL endpoint
        subgraph_url: Url,
        /// HTTP timeout in seconds
        #[serde(default = "defaults::subgraph_timeout_secs")]
        timeout_secs: u64,
    },
}

impl ReserveSourceConfig {
    /// HTTP timeout for off-chain sources
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            ReserveSourceConfig::PairContract => None,
            ReserveSourceConfig::Subgraph { timeout_secs, .. } => {
                Some(Duration::from_secs(*timeout_secs))
            }
        }
    }
}

/// Top level truth source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruthSourceConfig {
    /// Historical block at which staker balances are evaluated
    #[serde(default)]
    pub target_block: Option<u64>,
    /// Upper bound on in-flight per-staker balance queries
    #[serde(default = "defaults::max_concurrent_queries")]
    pub max_concurrent_queries: usize,
    /// Block range of a single `eth_getLogs` request
    #[serde(default = "defaults::log_query_chunk_size")]
    pub log_query_chunk_size: u64,
    /// Optional file receiving the aggregate holding map
    #[serde(default)]
    pub aggregate_output_path: Option<PathBuf>,
    /// Reserve snapshot source
    #[serde(default)]
    pub reserve_source: ReserveSourceConfig,
    /// Tracked pools
    pub pools: Vec<PoolDescriptor>,
}

impl TruthSourceConfig {
    /// Load the config from a TOML file
    pub async fn load(path: &std::path::Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .await
            .context(format!("Failed to read config file from {path:?}"))?;
        toml::from_str(&data).context(format!("Failed to parse toml file from {path:?}"))
    }

    /// Override the target block, e.g. from the command line
    pub fn with_target_block(mut self, target_block: u64) -> Self {
        self.target_block = Some(target_block);
        self
    }

    /// Resolved target block
    pub fn target_block(&self) -> Result<u64, TruthSourceError> {
        self.target_block
            .ok_or_else(|| TruthSourceError::Config("target block is not set".to_string()))
    }

    /// Check the config for inconsistencies before any query is issued
    pub fn validate(&self) -> Result<(), TruthSourceError> {
        let target_block = self.target_block()?;

        if self.pools.is_empty() {
            return Err(TruthSourceError::Config("no pools configured".to_string()));
        }
        if self.max_concurrent_queries == 0 {
            return Err(TruthSourceError::Config(
                "max_concurrent_queries must be greater than zero".to_string(),
            ));
        }
        if self.log_query_chunk_size == 0 {
            return Err(TruthSourceError::Config(
                "log_query_chunk_size must be greater than zero".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut paths = HashSet::new();
        for pool in &self.pools {
            if !names.insert(pool.name.as_str()) {
                return Err(TruthSourceError::Config(format!("duplicate pool name {}", pool.name)));
            }
            if !paths.insert(&pool.output_path) {
                return Err(TruthSourceError::Config(format!(
                    "duplicate output path {:?} for pool {}",
                    pool.output_path, pool.name
                )));
            }
            if pool.creation_block > target_block {
                return Err(TruthSourceError::Config(format!(
                    "pool {} creation block {} is after target block {}",
                    pool.name, pool.creation_block, target_block
                )));
            }
        }
        if let Some(aggregate) = &self.aggregate_output_path {
            if paths.contains(aggregate) {
                return Err(TruthSourceError::Config(format!(
                    "aggregate output path {aggregate:?} collides with a pool output path"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG_TEMPL: &str = r#"
target_block = 12000000
aggregate_output_path = "./tmp/keep-in-lp-token-balances.json"

[[pools]]
name = "KEEPETH"
pair_address = "0xE6F19dAb7d43317344282F803f8E8d240708174a"
rewards_address = "0x0000000000000000000000000000000000000a11"
creation_block = 10100034
output_path = "./tmp/keep-in-lp-keepeth-token-balances.json"

[[pools]]
name = "KEEPTBTC"
pair_address = "0x38c8ffee49f286f25d25bad919ff7552e5daf081"
rewards_address = "0x0000000000000000000000000000000000000b22"
creation_block = 11452642
output_path = "./tmp/keep-in-lp-keeptbtc-token-balances.json"
reward_token = "token1"
"#;

    #[tokio::test]
    async fn load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CONFIG_TEMPL.as_bytes()).unwrap();

        let config = TruthSourceConfig::load(file.path()).await.unwrap();
        config.validate().unwrap();

        assert_eq!(config.target_block, Some(12000000));
        assert_eq!(config.max_concurrent_queries, defaults::max_concurrent_queries());
        assert_eq!(config.log_query_chunk_size, defaults::log_query_chunk_size());
        assert_eq!(config.reserve_source, ReserveSourceConfig::PairContract);
        assert_eq!(config.pools.len(), 2);

        // Mixed case in the file parses to the same address as lower case.
        assert_eq!(
            config.pools[0].pair_address,
            address!("0xe6f19dab7d43317344282f803f8e8d240708174a")
        );
        assert_eq!(config.pools[0].reward_token, RewardToken::Token0);
        assert_eq!(config.pools[1].reward_token, RewardToken::Token1);
    }

    #[test]
    fn parse_subgraph_source() {
        let config: TruthSourceConfig = toml::from_str(&format!(
            "{CONFIG_TEMPL}\n[reserve_source]\nkind = \"subgraph\"\nsubgraph_url = \"http://localhost:8000/subgraphs/uniswap-v2\"\n"
        ))
        .unwrap();

        match &config.reserve_source {
            ReserveSourceConfig::Subgraph { subgraph_url, timeout_secs } => {
                assert_eq!(subgraph_url.as_str(), "http://localhost:8000/subgraphs/uniswap-v2");
                assert_eq!(*timeout_secs, defaults::subgraph_timeout_secs());
            }
            other => panic!("unexpected reserve source {other:?}"),
        }
        assert_eq!(config.reserve_source.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn target_block_override() {
        let config: TruthSourceConfig = toml::from_str(CONFIG_TEMPL).unwrap();
        let config = config.with_target_block(12345678);
        assert_eq!(config.target_block().unwrap(), 12345678);
    }

    #[test]
    fn rejects_invalid_configs() {
        let base: TruthSourceConfig = toml::from_str(CONFIG_TEMPL).unwrap();

        let mut missing_target = base.clone();
        missing_target.target_block = None;
        assert!(matches!(missing_target.validate(), Err(TruthSourceError::Config(_))));

        let mut no_pools = base.clone();
        no_pools.pools.clear();
        assert!(no_pools.validate().is_err());

        let mut duplicate_name = base.clone();
        duplicate_name.pools[1].name = "KEEPETH".to_string();
        assert!(duplicate_name.validate().is_err());

        let mut duplicate_path = base.clone();
        duplicate_path.pools[1].output_path = duplicate_path.pools[0].output_path.clone();
        assert!(duplicate_path.validate().is_err());

        let mut too_early = base.clone();
        too_early.target_block = Some(10_000_000);
        assert!(too_early.validate().is_err());

        let mut zero_concurrency = base.clone();
        zero_concurrency.max_concurrent_queries = 0;
        assert!(zero_concurrency.validate().is_err());

        let mut zero_chunk = base.clone();
        zero_chunk.log_query_chunk_size = 0;
        assert!(zero_chunk.validate().is_err());

        let mut aggregate_collision = base;
        aggregate_collision.aggregate_output_path = Some(aggregate_collision.pools[0].output_path.clone());
        assert!(aggregate_collision.validate().is_err());
    }
}
