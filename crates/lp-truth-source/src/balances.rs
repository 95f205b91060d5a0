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

//! Historical staker balances in the LP rewards contract.

use std::collections::{BTreeMap, BTreeSet};

use alloy::primitives::{Address, U256};
use futures::{stream, StreamExt, TryStreamExt};

use crate::{
    config::PoolDescriptor,
    error::{IntegrityMismatch, Stage, TruthSourceError},
    sources::BalanceSource,
};

/// Pool-token balances of stakers in a rewards contract at the target block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakerBalances {
    /// Non-zero balances by staker
    pub balances: BTreeMap<Address, U256>,
    /// Sum of `balances`
    pub expected_total_supply: U256,
    /// `totalSupply()` of the rewards contract at the target block
    pub actual_total_supply: U256,
    /// Set when the two totals differ
    pub mismatch: Option<IntegrityMismatch>,
}

/// Retrieves rewards contract balances of `stakers` at `target_block`.
///
/// At most `max_concurrent` balance queries are in flight; any failed query
/// aborts the whole pool, as does a balance sum exceeding 256 bits. A sum
/// that differs from the rewards contract total supply is reported through
/// [StakerBalances::mismatch], not as an error.
pub async fn get_staker_balances(
    source: &dyn BalanceSource,
    stakers: &BTreeSet<Address>,
    pool: &PoolDescriptor,
    target_block: u64,
    max_concurrent: usize,
) -> Result<StakerBalances, TruthSourceError> {
    let query_err = |stage: Stage| {
        let pool = pool.name.clone();
        move |source| TruthSourceError::QuerySourceUnavailable {
            pool,
            stage,
            blocks: Some((target_block, target_block)),
            source,
        }
    };

    tracing::debug!(
        "Querying {} {} staker balances at block {} ({} in flight)",
        stakers.len(),
        pool.name,
        target_block,
        max_concurrent
    );

    // `buffered` keeps results in staker order.
    let results: Vec<(Address, U256)> = stream::iter(stakers.iter().copied())
        .map(|staker| async move {
            source
                .balance_of(pool.rewards_address, staker, target_block)
                .await
                .map(|balance| (staker, balance))
        })
        .buffered(max_concurrent.max(1))
        .try_collect()
        .await
        .map_err(query_err(Stage::GetBalances))?;

    let mut balances = BTreeMap::new();
    let mut expected_total_supply = U256::ZERO;
    for (staker, balance) in results {
        if balance.is_zero() {
            continue;
        }
        tracing::debug!("{} staker {} LP balance {}", pool.name, staker, balance);
        expected_total_supply = expected_total_supply.checked_add(balance).ok_or_else(|| {
            TruthSourceError::ArithmeticOverflow {
                pool: pool.name.clone(),
                stage: Stage::GetBalances,
                staker,
            }
        })?;
        balances.insert(staker, balance);
    }

    let actual_total_supply = source
        .total_supply(pool.rewards_address, target_block)
        .await
        .map_err(query_err(Stage::TotalSupply))?;

    let mismatch = (expected_total_supply != actual_total_supply).then(|| IntegrityMismatch {
        pool: pool.name.clone(),
        expected: expected_total_supply,
        actual: actual_total_supply,
    });
    if let Some(mismatch) = &mismatch {
        tracing::warn!("{mismatch}");
    }

    tracing::info!(
        "Total supply of {} LP token held by {} stakers: {}",
        pool.name,
        balances.len(),
        expected_total_supply
    );

    Ok(StakerBalances { balances, expected_total_supply, actual_total_supply, mismatch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{pool, FakeChain};
    use alloy::primitives::address;
    use tracing_test::traced_test;

    const A: Address = address!("0x00000000000000000000000000000000000000aa");
    const B: Address = address!("0x00000000000000000000000000000000000000bb");
    const C: Address = address!("0x00000000000000000000000000000000000000cc");
    const REWARDS: Address = address!("0x0000000000000000000000000000000000000a11");

    #[tokio::test]
    async fn balances_match_total_supply() {
        let pool = pool("KEEPETH", REWARDS);
        let chain = FakeChain::default()
            .with_balance(REWARDS, A, 100)
            .with_balance(REWARDS, B, 50)
            .with_total_supply(REWARDS, 150);

        let result =
            get_staker_balances(&chain, &BTreeSet::from([A, B]), &pool, 200, 4).await.unwrap();

        assert_eq!(result.balances, BTreeMap::from([(A, U256::from(100)), (B, U256::from(50))]));
        assert_eq!(result.expected_total_supply, U256::from(150));
        assert_eq!(result.actual_total_supply, U256::from(150));
        assert!(result.mismatch.is_none());
        // Every query is made at the target block.
        assert_eq!(chain.balance_query_blocks(), vec![200, 200]);
        assert_eq!(chain.total_supply_query_blocks(), vec![200]);
    }

    #[tokio::test]
    async fn overflowing_balance_sum_aborts_pool() {
        let pool = pool("KEEPETH", REWARDS);
        let chain = FakeChain::default()
            .with_balance_units(REWARDS, A, U256::MAX)
            .with_balance(REWARDS, B, 2)
            .with_total_supply(REWARDS, 1);

        let err =
            get_staker_balances(&chain, &BTreeSet::from([A, B]), &pool, 200, 2).await.unwrap_err();

        assert!(matches!(
            &err,
            TruthSourceError::ArithmeticOverflow { pool, stage: Stage::GetBalances, staker }
                if pool == "KEEPETH" && *staker == B
        ));
        // Nothing is cross-checked against a wrapped sum.
        assert!(chain.total_supply_query_blocks().is_empty());
    }

    #[tokio::test]
    async fn excludes_zero_balances() {
        let pool = pool("KEEPETH", REWARDS);
        let chain = FakeChain::default()
            .with_balance(REWARDS, A, 100)
            .with_total_supply(REWARDS, 100);

        // C fully withdrew and has no balance.
        let result =
            get_staker_balances(&chain, &BTreeSet::from([A, C]), &pool, 200, 1).await.unwrap();

        assert_eq!(result.balances.len(), 1);
        assert!(!result.balances.contains_key(&C));
        assert!(result.mismatch.is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn reports_mismatch_without_failing() {
        let pool = pool("KEEPETH", REWARDS);
        let chain = FakeChain::default()
            .with_balance(REWARDS, A, 100)
            .with_balance(REWARDS, B, 50)
            .with_total_supply(REWARDS, 175);

        let result =
            get_staker_balances(&chain, &BTreeSet::from([A, B]), &pool, 200, 2).await.unwrap();

        assert_eq!(result.balances.len(), 2);
        assert_eq!(
            result.mismatch,
            Some(IntegrityMismatch {
                pool: "KEEPETH".to_string(),
                expected: U256::from(150),
                actual: U256::from(175),
            })
        );
        assert!(logs_contain("does not match the total supply 175"));
    }

    #[tokio::test]
    async fn failed_balance_query_aborts_pool() {
        let pool = pool("KEEPETH", REWARDS);
        let chain = FakeChain::default()
            .with_balance(REWARDS, A, 100)
            .with_total_supply(REWARDS, 100)
            .failing_balance_of(B);

        let err = get_staker_balances(&chain, &BTreeSet::from([A, B]), &pool, 200, 2)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::GetBalances));
    }

    #[tokio::test]
    async fn failed_total_supply_query_aborts_pool() {
        let pool = pool("KEEPETH", REWARDS);
        let chain = FakeChain::default().with_balance(REWARDS, A, 100);

        let err =
            get_staker_balances(&chain, &BTreeSet::from([A]), &pool, 200, 2).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::TotalSupply));
    }

    #[tokio::test]
    async fn many_stakers_with_small_concurrency() {
        let pool = pool("KEEPETH", REWARDS);
        let mut chain = FakeChain::default();
        let mut stakers = BTreeSet::new();
        for i in 1..=50u64 {
            let staker = Address::with_last_byte(i as u8);
            stakers.insert(staker);
            chain = chain.with_balance(REWARDS, staker, i);
        }
        chain = chain.with_total_supply(REWARDS, (1..=50u64).sum());

        let result = get_staker_balances(&chain, &stakers, &pool, 200, 3).await.unwrap();

        assert_eq!(result.balances.len(), 50);
        for (staker, balance) in &result.balances {
            assert_eq!(U256::from(staker.0[19]), *balance);
        }
        assert!(result.mismatch.is_none());
    }
}
