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

//! In-memory sources for tests.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Mutex,
};

use alloy::primitives::{keccak256, Address, U256};
use async_trait::async_trait;

use crate::{
    config::{PoolDescriptor, RewardToken},
    error::SourceError,
    sources::{BalanceSource, EventSource, PairReserveSnapshot, ReserveSource, TransferRecord},
};

/// Pool named `name` whose pair address is derived from the name, created at block 100.
pub fn pool(name: &str, rewards_address: Address) -> PoolDescriptor {
    PoolDescriptor {
        name: name.to_string(),
        pair_address: Address::from_word(keccak256(name.as_bytes())),
        rewards_address,
        creation_block: 100,
        output_path: PathBuf::from(format!("{}.json", name.to_lowercase())),
        reward_token: RewardToken::Token0,
    }
}

/// Transfer of `value` pool tokens from `from` to `to`.
pub fn transfer(from: Address, to: Address, value: u64) -> TransferRecord {
    TransferRecord { from, to, value: U256::from(value), block_number: None }
}

/// Fake chain serving transfer events, balances and total supplies from memory.
///
/// Balances not explicitly set are zero. Total supplies not explicitly set fail.
#[derive(Default)]
pub struct FakeChain {
    transfers: HashMap<Address, Vec<TransferRecord>>,
    balances: HashMap<(Address, Address), U256>,
    total_supplies: HashMap<Address, U256>,
    fail_events: bool,
    failing_holders: Vec<Address>,
    requested_ranges: Mutex<Vec<(u64, u64)>>,
    balance_query_blocks: Mutex<Vec<u64>>,
    total_supply_query_blocks: Mutex<Vec<u64>>,
}

impl FakeChain {
    pub fn with_transfers(mut self, token: Address, transfers: Vec<TransferRecord>) -> Self {
        self.transfers.entry(token).or_default().extend(transfers);
        self
    }

    pub fn with_balance(self, contract: Address, holder: Address, balance: u64) -> Self {
        self.with_balance_units(contract, holder, U256::from(balance))
    }

    pub fn with_balance_units(mut self, contract: Address, holder: Address, balance: U256) -> Self {
        self.balances.insert((contract, holder), balance);
        self
    }

    pub fn with_total_supply(self, contract: Address, total_supply: u64) -> Self {
        self.with_total_supply_units(contract, U256::from(total_supply))
    }

    pub fn with_total_supply_units(mut self, contract: Address, total_supply: U256) -> Self {
        self.total_supplies.insert(contract, total_supply);
        self
    }

    pub fn failing_events(mut self) -> Self {
        self.fail_events = true;
        self
    }

    pub fn failing_balance_of(mut self, holder: Address) -> Self {
        self.failing_holders.push(holder);
        self
    }

    /// Block ranges requested from the event source so far
    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.requested_ranges.lock().unwrap().clone()
    }

    /// Blocks of all balance queries so far
    pub fn balance_query_blocks(&self) -> Vec<u64> {
        self.balance_query_blocks.lock().unwrap().clone()
    }

    /// Blocks of all total supply queries so far
    pub fn total_supply_query_blocks(&self) -> Vec<u64> {
        self.total_supply_query_blocks.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSource for FakeChain {
    async fn transfers(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferRecord>, SourceError> {
        self.requested_ranges.lock().unwrap().push((from_block, to_block));
        if self.fail_events {
            return Err(SourceError::InvalidResponse("eth_getLogs rate limited".to_string()));
        }
        Ok(self.transfers.get(&token).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl BalanceSource for FakeChain {
    async fn balance_of(
        &self,
        contract: Address,
        holder: Address,
        block: u64,
    ) -> Result<U256, SourceError> {
        self.balance_query_blocks.lock().unwrap().push(block);
        // Yield so concurrent queries interleave.
        tokio::task::yield_now().await;
        if self.failing_holders.contains(&holder) {
            return Err(SourceError::InvalidResponse(format!("balanceOf({holder}) failed")));
        }
        Ok(self.balances.get(&(contract, holder)).copied().unwrap_or_default())
    }

    async fn total_supply(&self, contract: Address, block: u64) -> Result<U256, SourceError> {
        self.total_supply_query_blocks.lock().unwrap().push(block);
        self.total_supplies.get(&contract).copied().ok_or_else(|| {
            SourceError::InvalidResponse(format!("totalSupply() on {contract} failed"))
        })
    }
}

/// Fake reserve source. Pairs without a snapshot fail.
#[derive(Default)]
pub struct FakeReserves {
    snapshots: HashMap<Address, PairReserveSnapshot>,
}

impl FakeReserves {
    pub fn with_snapshot(mut self, pair: Address, total_supply: u64, reserve: u64) -> Self {
        self.snapshots.insert(
            pair,
            PairReserveSnapshot {
                total_supply: U256::from(total_supply),
                reserve: U256::from(reserve),
            },
        );
        self
    }
}

#[async_trait]
impl ReserveSource for FakeReserves {
    async fn pair_reserves(&self, pool: &PoolDescriptor) -> Result<PairReserveSnapshot, SourceError> {
        self.snapshots.get(&pool.pair_address).copied().ok_or_else(|| {
            SourceError::InvalidResponse(format!("pair {} not found", pool.pair_address))
        })
    }

    fn name(&self) -> String {
        "FakeReserves".to_string()
    }
}
