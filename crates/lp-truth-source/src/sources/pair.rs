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

use alloy::{primitives::U256, providers::Provider};
use async_trait::async_trait;

use super::{PairReserveSnapshot, ReserveSource};
use crate::{
    config::{PoolDescriptor, RewardToken},
    contracts::IUniswapV2Pair,
    error::SourceError,
};

/// Reads reserves straight from the Uniswap V2 pair contract at the latest block.
#[derive(Clone, Debug)]
pub struct PairContractReserveSource<P> {
    provider: P,
}

impl<P> PairContractReserveSource<P> {
    /// Create a new pair contract reserve source
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: Provider> ReserveSource for PairContractReserveSource<P> {
    async fn pair_reserves(&self, pool: &PoolDescriptor) -> Result<PairReserveSnapshot, SourceError> {
        let pair = IUniswapV2Pair::new(pool.pair_address, &self.provider);

        let reserves = pair.getReserves().call().await?;
        let total_supply = pair.totalSupply().call().await?;

        let reserve = match pool.reward_token {
            RewardToken::Token0 => U256::from(reserves.reserve0),
            RewardToken::Token1 => U256::from(reserves.reserve1),
        };

        Ok(PairReserveSnapshot { total_supply, reserve })
    }

    fn name(&self) -> String {
        "PairContractReserveSource".to_string()
    }
}
