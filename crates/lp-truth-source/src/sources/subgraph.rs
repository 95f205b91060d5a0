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

use std::time::Duration;

use alloy::primitives::{utils::parse_units, Address, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{PairReserveSnapshot, ReserveSource};
use crate::{
    config::{PoolDescriptor, RewardToken},
    error::SourceError,
};

/// Decimals of the pool token and of the reward token as reported by the subgraph.
pub const SUBGRAPH_TOKEN_DECIMALS: u8 = 18;

const PAIR_QUERY: &str = "query pair($id: ID!) { pair(id: $id) { totalSupply reserve0 reserve1 } }";

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<PairData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct PairData {
    pair: Option<SubgraphPair>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubgraphPair {
    total_supply: String,
    reserve0: String,
    reserve1: String,
}

/// Reads reserves from a Uniswap V2 subgraph.
///
/// The subgraph reports amounts as decimal token units; they are converted to
/// base units with [SUBGRAPH_TOKEN_DECIMALS] decimals.
pub struct SubgraphReserveSource {
    client: Client,
    url: Url,
}

impl SubgraphReserveSource {
    /// Create a new subgraph source
    pub fn new(url: Url, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    async fn fetch_pair(&self, pair_address: Address) -> Result<SubgraphPair, SourceError> {
        // Subgraph entity IDs are lower-case addresses.
        let body = serde_json::json!({
            "query": PAIR_QUERY,
            "variables": { "id": format!("{pair_address:#x}") },
        });

        let response =
            self.client.post(self.url.clone()).json(&body).send().await?.error_for_status()?;
        let response: GraphQlResponse = response.json().await?;

        if let Some(err) = response.errors.first() {
            return Err(SourceError::InvalidResponse(format!(
                "subgraph error for pair {pair_address}: {}",
                err.message
            )));
        }

        response.data.and_then(|data| data.pair).ok_or_else(|| {
            SourceError::InvalidResponse(format!("pair {pair_address} not found in subgraph"))
        })
    }
}

#[async_trait]
impl ReserveSource for SubgraphReserveSource {
    async fn pair_reserves(&self, pool: &PoolDescriptor) -> Result<PairReserveSnapshot, SourceError> {
        let pair = self.fetch_pair(pool.pair_address).await?;

        let reserve = match pool.reward_token {
            RewardToken::Token0 => &pair.reserve0,
            RewardToken::Token1 => &pair.reserve1,
        };

        Ok(PairReserveSnapshot {
            total_supply: decimal_to_base_units(&pair.total_supply, SUBGRAPH_TOKEN_DECIMALS)?,
            reserve: decimal_to_base_units(reserve, SUBGRAPH_TOKEN_DECIMALS)?,
        })
    }

    fn name(&self) -> String {
        format!("SubgraphReserveSource({})", self.url)
    }
}

/// Convert a non-negative decimal amount such as `"1234.5"` into base units.
///
/// Fractional digits beyond `decimals` are truncated.
pub fn decimal_to_base_units(amount: &str, decimals: u8) -> Result<U256, SourceError> {
    let amount = amount.trim();
    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
    let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || !is_digits(whole) || !is_digits(fraction) {
        return Err(SourceError::InvalidResponse(format!("invalid token amount {amount:?}")));
    }

    // Only ASCII digits remain, so byte slicing stays on char boundaries.
    let normalized = if fraction.len() > decimals as usize {
        format!("{whole}.{}", &fraction[..decimals as usize])
    } else {
        amount.to_string()
    };

    parse_units(&normalized, decimals).map(|units| units.get_absolute()).map_err(|err| {
        SourceError::InvalidResponse(format!("invalid token amount {amount:?}: {err}"))
    })
}
