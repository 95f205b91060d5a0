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

//! Per-run orchestration over all configured pools.

use std::sync::Arc;

use alloy::primitives::U256;
use futures::future::join_all;

use crate::{
    balances::{get_staker_balances, StakerBalances},
    config::{PoolDescriptor, TruthSourceConfig},
    error::{IntegrityMismatch, TruthSourceError},
    holdings::{derive_holdings, merge_holdings, HoldingMap},
    output::write_holdings,
    sources::{BalanceSource, EventSource, PairReserveSnapshot, ReserveSource},
    stakers::find_stakers,
};

/// Successful run of one pool.
#[derive(Debug)]
pub struct PoolReport {
    /// Number of distinct historic stakers found in transfer events
    pub historic_stakers: usize,
    /// Balances at the target block
    pub balances: StakerBalances,
    /// Reserve snapshot used for the conversion
    pub snapshot: PairReserveSnapshot,
    /// Reward-token holdings by staker
    pub holdings: HoldingMap,
    /// Set when the pool's audit file could not be written
    pub persist_error: Option<TruthSourceError>,
}

/// Outcome of one pool's pipeline.
#[derive(Debug)]
pub struct PoolOutcome {
    /// Pool name
    pub pool: String,
    /// Report, or the error that aborted the pool
    pub result: Result<PoolReport, TruthSourceError>,
}

/// Result of a full run over all pools.
#[derive(Debug)]
pub struct RunReport {
    /// Block balances were evaluated at
    pub target_block: u64,
    /// One outcome per configured pool, in configuration order
    pub outcomes: Vec<PoolOutcome>,
    /// Sum of holdings over all pools that succeeded
    pub aggregate: HoldingMap,
    /// Set when the aggregate file could not be written
    pub aggregate_persist_error: Option<TruthSourceError>,
}

impl RunReport {
    /// Pools that failed, with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&str, &TruthSourceError)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err().map(|err| (outcome.pool.as_str(), err)))
    }

    /// Integrity mismatches reported by successful pools
    pub fn mismatches(&self) -> impl Iterator<Item = &IntegrityMismatch> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .filter_map(|report| report.balances.mismatch.as_ref())
    }

    /// Total reward-token amount in the aggregate, `None` if it exceeds 256 bits
    pub fn aggregate_total(&self) -> Option<U256> {
        self.aggregate.values().try_fold(U256::ZERO, |acc, amount| acc.checked_add(*amount))
    }

    /// The aggregate is trustworthy only if every pool succeeded, no
    /// integrity mismatch was seen and every audit file was written.
    pub fn is_trustworthy(&self) -> bool {
        self.outcomes.iter().all(|outcome| {
            matches!(&outcome.result, Ok(report)
                if report.balances.mismatch.is_none() && report.persist_error.is_none())
        }) && self.aggregate_persist_error.is_none()
    }
}

/// Reconstructs reward-token holdings of LP stakers across all configured pools.
pub struct TruthSource {
    config: TruthSourceConfig,
    target_block: u64,
    events: Arc<dyn EventSource>,
    balances: Arc<dyn BalanceSource>,
    reserves: Arc<dyn ReserveSource>,
}

impl TruthSource {
    /// Create a new truth source. Fails if the config does not validate.
    pub fn new(
        config: TruthSourceConfig,
        events: Arc<dyn EventSource>,
        balances: Arc<dyn BalanceSource>,
        reserves: Arc<dyn ReserveSource>,
    ) -> Result<Self, TruthSourceError> {
        config.validate()?;
        let target_block = config.target_block()?;
        Ok(Self { config, target_block, events, balances, reserves })
    }

    /// The validated configuration
    pub fn config(&self) -> &TruthSourceConfig {
        &self.config
    }

    /// Runs find stakers, get balances and derive holdings for a single pool.
    pub async fn run_pool(&self, pool: &PoolDescriptor) -> Result<PoolReport, TruthSourceError> {
        let stakers = find_stakers(self.events.as_ref(), pool, self.target_block).await?;
        let balances = get_staker_balances(
            self.balances.as_ref(),
            &stakers,
            pool,
            self.target_block,
            self.config.max_concurrent_queries,
        )
        .await?;
        let derived = derive_holdings(self.reserves.as_ref(), &balances.balances, pool).await?;

        Ok(PoolReport {
            historic_stakers: stakers.len(),
            balances,
            snapshot: derived.snapshot,
            holdings: derived.holdings,
            persist_error: derived.persist_error,
        })
    }

    /// Runs every pool concurrently and aggregates the results.
    ///
    /// A failing pool does not stop the others; its error is kept in the
    /// report and its holdings are left out of the aggregate. A pool whose
    /// holdings would overflow the aggregate fails the same way.
    pub async fn run(&self) -> RunReport {
        tracing::info!(
            "Reconstructing LP staker holdings for {} pools at block {}",
            self.config.pools.len(),
            self.target_block
        );

        let results = join_all(self.config.pools.iter().map(|pool| self.run_pool(pool))).await;

        let mut aggregate = HoldingMap::new();
        let mut outcomes = Vec::with_capacity(results.len());
        for (pool, result) in self.config.pools.iter().zip(results) {
            let result = result.and_then(|report| {
                merge_holdings(&mut aggregate, &pool.name, &report.holdings).map(|()| report)
            });
            if let Err(err) = &result {
                tracing::error!("Pool {} failed: {err}", pool.name);
            }
            outcomes.push(PoolOutcome { pool: pool.name.clone(), result });
        }

        let aggregate_persist_error = match &self.config.aggregate_output_path {
            Some(path) => write_holdings(path, &aggregate).await.err(),
            None => None,
        };
        if let Some(err) = &aggregate_persist_error {
            tracing::error!("{err}");
        }

        let report = RunReport { target_block: self.target_block, outcomes, aggregate, aggregate_persist_error };
        tracing::info!(
            "Aggregated {} holders with {} reward tokens ({} failed pools, {} mismatches)",
            report.aggregate.len(),
            report
                .aggregate_total()
                .map_or_else(|| "more than 2^256".to_string(), |total| total.to_string()),
            report.failures().count(),
            report.mismatches().count()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::Stage,
        output::read_holdings,
        test_utils::{pool, transfer, FakeChain, FakeReserves},
    };
    use alloy::primitives::{address, Address};

    const A: Address = address!("0x00000000000000000000000000000000000000aa");
    const B: Address = address!("0x00000000000000000000000000000000000000bb");
    const REWARDS: Address = address!("0x0000000000000000000000000000000000000a11");

    fn config(dir: &std::path::Path, pools: Vec<PoolDescriptor>) -> TruthSourceConfig {
        TruthSourceConfig {
            target_block: Some(200),
            max_concurrent_queries: 4,
            log_query_chunk_size: crate::LOG_QUERY_CHUNK_SIZE,
            aggregate_output_path: Some(dir.join("aggregate.json")),
            reserve_source: Default::default(),
            pools,
        }
    }

    #[tokio::test]
    async fn single_pool_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut keepeth = pool("KEEPETH", REWARDS);
        keepeth.output_path = dir.path().join("keepeth.json");

        let chain = Arc::new(
            FakeChain::default()
                .with_transfers(
                    keepeth.pair_address,
                    vec![transfer(A, REWARDS, 100), transfer(B, REWARDS, 50), transfer(A, REWARDS, 1)],
                )
                .with_balance(REWARDS, A, 100)
                .with_balance(REWARDS, B, 50)
                .with_total_supply(REWARDS, 150),
        );
        let reserves = Arc::new(FakeReserves::default().with_snapshot(keepeth.pair_address, 1000, 500));

        let source =
            TruthSource::new(config(dir.path(), vec![keepeth.clone()]), chain.clone(), chain, reserves)
                .unwrap();
        let report = source.run().await;

        assert!(report.is_trustworthy());
        assert_eq!(report.aggregate, HoldingMap::from([(A, U256::from(50)), (B, U256::from(25))]));
        let pool_report = report.outcomes[0].result.as_ref().unwrap();
        assert_eq!(pool_report.historic_stakers, 2);
        assert_eq!(read_holdings(&keepeth.output_path).await.unwrap(), report.aggregate);
        assert_eq!(read_holdings(&dir.path().join("aggregate.json")).await.unwrap(), report.aggregate);
    }

    #[tokio::test]
    async fn rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(FakeChain::default());
        let reserves = Arc::new(FakeReserves::default());

        let result = TruthSource::new(config(dir.path(), vec![]), chain.clone(), chain, reserves);
        assert!(matches!(result, Err(TruthSourceError::Config(_))));
    }

    #[tokio::test]
    async fn mismatch_makes_run_untrustworthy() {
        let dir = tempfile::tempdir().unwrap();
        let mut keepeth = pool("KEEPETH", REWARDS);
        keepeth.output_path = dir.path().join("keepeth.json");

        let chain = Arc::new(
            FakeChain::default()
                .with_transfers(keepeth.pair_address, vec![transfer(A, REWARDS, 100)])
                .with_balance(REWARDS, A, 100)
                .with_total_supply(REWARDS, 120),
        );
        let reserves = Arc::new(FakeReserves::default().with_snapshot(keepeth.pair_address, 1000, 500));

        let source =
            TruthSource::new(config(dir.path(), vec![keepeth]), chain.clone(), chain, reserves)
                .unwrap();
        let report = source.run().await;

        assert_eq!(report.failures().count(), 0);
        assert_eq!(report.mismatches().count(), 1);
        assert!(!report.is_trustworthy());
        assert_eq!(report.aggregate, HoldingMap::from([(A, U256::from(50))]));
    }

    #[tokio::test]
    async fn aggregate_overflow_fails_only_the_overflowing_pool() {
        let dir = tempfile::tempdir().unwrap();
        let mut keepeth = pool("KEEPETH", REWARDS);
        keepeth.output_path = dir.path().join("keepeth.json");
        let tbtc_rewards = Address::with_last_byte(0x12);
        let mut keeptbtc = pool("KEEPTBTC", tbtc_rewards);
        keeptbtc.output_path = dir.path().join("keeptbtc.json");

        // KEEPETH credits A with U256::MAX, KEEPTBTC with 1 more.
        let chain = Arc::new(
            FakeChain::default()
                .with_transfers(keepeth.pair_address, vec![transfer(A, REWARDS, 1)])
                .with_balance_units(REWARDS, A, U256::MAX)
                .with_total_supply_units(REWARDS, U256::MAX)
                .with_transfers(keeptbtc.pair_address, vec![transfer(A, tbtc_rewards, 1)])
                .with_balance(tbtc_rewards, A, 1)
                .with_total_supply(tbtc_rewards, 1),
        );
        let reserves = Arc::new(
            FakeReserves::default()
                .with_snapshot(keepeth.pair_address, 1, 1)
                .with_snapshot(keeptbtc.pair_address, 1, 1),
        );

        let source = TruthSource::new(
            config(dir.path(), vec![keepeth, keeptbtc]),
            chain.clone(),
            chain,
            reserves,
        )
        .unwrap();
        let report = source.run().await;

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "KEEPTBTC");
        assert_eq!(failures[0].1.stage(), Some(Stage::Aggregate));
        assert_eq!(report.aggregate, HoldingMap::from([(A, U256::MAX)]));
        assert_eq!(report.aggregate_total(), Some(U256::MAX));
        assert!(!report.is_trustworthy());
    }

    #[test]
    fn aggregate_total_reports_overflow() {
        let report = RunReport {
            target_block: 200,
            outcomes: vec![],
            aggregate: HoldingMap::from([(A, U256::MAX), (B, U256::from(1))]),
            aggregate_persist_error: None,
        };
        assert_eq!(report.aggregate_total(), None);
    }
}
