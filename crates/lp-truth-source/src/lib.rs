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

//! Off-chain truth source reconstructing reward-token holdings of liquidity
//! pool stakers.
//!
//! For every tracked pool the pipeline finds all historic stakers from
//! pool-token `Transfer` events into the LP rewards contract, reads their
//! staked balances at a target block, converts those balances into the
//! reward token held by the pair and aggregates the results across pools.

use alloy::{
    providers::Provider,
    rpc::types::{BlockNumberOrTag, Filter, Log},
    transports::TransportError,
};

pub mod balances;
pub mod config;
pub mod contracts;
pub mod error;
pub mod holdings;
pub mod output;
pub mod pipeline;
pub mod sources;
pub mod stakers;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use balances::{get_staker_balances, StakerBalances};
pub use config::{PoolDescriptor, ReserveSourceConfig, RewardToken, TruthSourceConfig};
pub use error::{
    HoldingError, IntegrityMismatch, PersistenceError, SourceError, Stage, TruthSourceError,
};
pub use holdings::{
    aggregate, compute_holdings, derive_holdings, holding_for_balance, merge_holdings,
    DerivedHoldings, HoldingMap,
};
pub use output::{read_holdings, write_holdings};
pub use pipeline::{PoolOutcome, PoolReport, RunReport, TruthSource};
pub use sources::{
    BalanceSource, ChainSource, EventSource, PairContractReserveSource, PairReserveSnapshot,
    ReserveSource, SubgraphReserveSource, TransferRecord,
};
pub use stakers::{collect_stakers, find_stakers};

/// Default chunk size for log queries to avoid rate limiting
pub const LOG_QUERY_CHUNK_SIZE: u64 = 5000;

/// Query logs in chunks of `chunk_size` blocks to avoid rate limiting
pub async fn query_logs_chunked<P: Provider>(
    provider: &P,
    filter: Filter,
    from_block: u64,
    to_block: u64,
    chunk_size: u64,
) -> Result<Vec<Log>, TransportError> {
    let chunk_size = chunk_size.max(1);
    let mut all_logs = Vec::new();
    let mut current_from = from_block;

    while current_from <= to_block {
        let current_to = current_from.saturating_add(chunk_size - 1).min(to_block);

        let chunk_filter = filter
            .clone()
            .from_block(BlockNumberOrTag::Number(current_from))
            .to_block(BlockNumberOrTag::Number(current_to));

        let logs = provider.get_logs(&chunk_filter).await?;
        tracing::debug!("Fetched {} logs for blocks {}..={}", logs.len(), current_from, current_to);
        all_logs.extend(logs);

        if current_to == u64::MAX {
            break;
        }
        current_from = current_to + 1;
    }

    Ok(all_logs)
}
