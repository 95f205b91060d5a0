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

//! External query capabilities consumed by the pipeline.
//!
//! The pipeline only talks to the chain and to price data through these
//! traits, so tests can substitute in-memory implementations.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::{config::PoolDescriptor, error::SourceError};

mod chain;
mod pair;
mod subgraph;

pub use chain::ChainSource;
pub use pair::PairContractReserveSource;
pub use subgraph::{decimal_to_base_units, SubgraphReserveSource};

/// A decoded pool-token `Transfer` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRecord {
    /// Sender
    pub from: Address,
    /// Recipient
    pub to: Address,
    /// Amount of pool tokens moved
    pub value: U256,
    /// Block the event was emitted in
    pub block_number: Option<u64>,
}

/// Pool-token supply and reward-token reserve of a pair, as of now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairReserveSnapshot {
    /// Total pool-token supply of the pair
    pub total_supply: U256,
    /// Reward-token reserve held by the pair
    pub reserve: U256,
}

/// Source of historical chain events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// All `Transfer` events of `token` in `from_block..=to_block`.
    ///
    /// Returns the complete set for the range or fails.
    async fn transfers(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferRecord>, SourceError>;
}

/// Historical point queries on ERC-20 style contracts.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// `balanceOf(holder)` on `contract` as of `block`.
    async fn balance_of(
        &self,
        contract: Address,
        holder: Address,
        block: u64,
    ) -> Result<U256, SourceError>;

    /// `totalSupply()` on `contract` as of `block`.
    async fn total_supply(&self, contract: Address, block: u64) -> Result<U256, SourceError>;
}

/// Current-time pair reserve data.
#[async_trait]
pub trait ReserveSource: Send + Sync {
    /// Snapshot of the pair backing `pool`.
    async fn pair_reserves(&self, pool: &PoolDescriptor) -> Result<PairReserveSnapshot, SourceError>;

    /// Name used in logs
    fn name(&self) -> String;
}
