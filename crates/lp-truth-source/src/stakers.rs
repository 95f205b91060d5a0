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

//! Historic staker discovery from pool-token transfers.

use std::collections::BTreeSet;

use alloy::primitives::Address;

use crate::{
    config::PoolDescriptor,
    error::{Stage, TruthSourceError},
    sources::{EventSource, TransferRecord},
};

/// Distinct senders of transfers into `rewards_address`.
pub fn collect_stakers(transfers: &[TransferRecord], rewards_address: Address) -> BTreeSet<Address> {
    transfers.iter().filter(|t| t.to == rewards_address).map(|t| t.from).collect()
}

/// Finds all historic stakers of a pool based on pool-token `Transfer` events
/// into the pool's rewards contract between its creation block and `target_block`.
pub async fn find_stakers(
    events: &dyn EventSource,
    pool: &PoolDescriptor,
    target_block: u64,
) -> Result<BTreeSet<Address>, TruthSourceError> {
    tracing::info!(
        "Looking for Transfer events to {} from {} pair {} between blocks {} and {}",
        pool.rewards_address,
        pool.name,
        pool.pair_address,
        pool.creation_block,
        target_block
    );

    let transfers = events
        .transfers(pool.pair_address, pool.creation_block, target_block)
        .await
        .map_err(|source| TruthSourceError::QuerySourceUnavailable {
            pool: pool.name.clone(),
            stage: Stage::FindStakers,
            blocks: Some((pool.creation_block, target_block)),
            source,
        })?;
    tracing::info!("Found {} {} pool token transfer events", transfers.len(), pool.name);

    let stakers = collect_stakers(&transfers, pool.rewards_address);
    tracing::info!("Found {} unique historic {} stakers", stakers.len(), pool.name);

    Ok(stakers)
}
