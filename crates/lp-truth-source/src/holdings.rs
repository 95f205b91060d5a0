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

//! Reward-token holdings implied by pool-token balances.
//!
//! A Uniswap V2 pair stores two assets; an LP token is a claim on a share of
//! both reserves. The reward token owed to a staker is therefore
//!
//! ```text
//! owed = lp_balance * reward_token_reserve / lp_total_supply
//! ```
//!
//! evaluated in integer arithmetic and truncated, so nobody is ever
//! over-credited.

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};

use crate::{
    config::PoolDescriptor,
    error::{HoldingError, Stage, TruthSourceError},
    output::write_holdings,
    sources::{PairReserveSnapshot, ReserveSource},
};

/// Reward-token amounts by staker address.
pub type HoldingMap = BTreeMap<Address, U256>;

/// `floor(balance * reserve / total_supply)`.
pub fn holding_for_balance(
    balance: U256,
    snapshot: &PairReserveSnapshot,
) -> Result<U256, HoldingError> {
    if snapshot.total_supply.is_zero() {
        return Err(HoldingError::ZeroTotalSupply);
    }
    let product = balance.checked_mul(snapshot.reserve).ok_or(HoldingError::Overflow)?;
    Ok(product / snapshot.total_supply)
}

/// Applies [holding_for_balance] to every staker of a pool.
pub fn compute_holdings(
    pool_name: &str,
    balances: &BTreeMap<Address, U256>,
    snapshot: &PairReserveSnapshot,
) -> Result<HoldingMap, TruthSourceError> {
    if snapshot.total_supply.is_zero() {
        return Err(TruthSourceError::DivisionByZero { pool: pool_name.to_string() });
    }

    balances
        .iter()
        .map(|(&staker, &balance)| match holding_for_balance(balance, snapshot) {
            Ok(holding) => Ok((staker, holding)),
            Err(HoldingError::ZeroTotalSupply) => {
                Err(TruthSourceError::DivisionByZero { pool: pool_name.to_string() })
            }
            Err(HoldingError::Overflow) => Err(TruthSourceError::ArithmeticOverflow {
                pool: pool_name.to_string(),
                stage: Stage::DeriveHoldings,
                staker,
            }),
        })
        .collect()
}

/// Result of [derive_holdings].
#[derive(Debug)]
pub struct DerivedHoldings {
    /// Reward-token holdings by staker
    pub holdings: HoldingMap,
    /// Reserve snapshot the holdings were computed from
    pub snapshot: PairReserveSnapshot,
    /// Set when the audit file could not be written
    pub persist_error: Option<TruthSourceError>,
}

/// Calculates reward-token holdings of all stakers of a pool and writes them
/// to the pool's audit file.
///
/// The reserve snapshot is taken at the current block, not at the target
/// block the balances were read at.
pub async fn derive_holdings(
    reserves: &dyn ReserveSource,
    balances: &BTreeMap<Address, U256>,
    pool: &PoolDescriptor,
) -> Result<DerivedHoldings, TruthSourceError> {
    let snapshot = reserves.pair_reserves(pool).await.map_err(|source| {
        TruthSourceError::QuerySourceUnavailable {
            pool: pool.name.clone(),
            stage: Stage::ReserveSnapshot,
            blocks: None,
            source,
        }
    })?;
    tracing::warn!(
        "{} reserve snapshot from {} is current, not historical: total supply {}, reserve {}",
        pool.name,
        reserves.name(),
        snapshot.total_supply,
        snapshot.reserve
    );

    let holdings = compute_holdings(&pool.name, balances, &snapshot)?;
    for (staker, holding) in &holdings {
        tracing::debug!(
            "Staker: {} - LP balance: {} - reward token in LP: {}",
            staker,
            balances.get(staker).copied().unwrap_or_default(),
            holding
        );
    }
    tracing::info!("Derived {} holdings for {} stakers", pool.name, holdings.len());

    let persist_error = match write_holdings(&pool.output_path, &holdings).await {
        Ok(()) => None,
        Err(err) => {
            tracing::error!("{err}");
            Some(err)
        }
    };

    Ok(DerivedHoldings { holdings, snapshot, persist_error })
}

/// Adds every entry of pool `pool_name`'s `holdings` into `acc`.
///
/// If any sum overflows, `acc` is left unchanged.
pub fn merge_holdings(
    acc: &mut HoldingMap,
    pool_name: &str,
    holdings: &HoldingMap,
) -> Result<(), TruthSourceError> {
    let sums = holdings
        .iter()
        .map(|(&staker, &amount)| {
            let current = acc.get(&staker).copied().unwrap_or_default();
            current.checked_add(amount).map(|sum| (staker, sum)).ok_or_else(|| {
                TruthSourceError::ArithmeticOverflow {
                    pool: pool_name.to_string(),
                    stage: Stage::Aggregate,
                    staker,
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    acc.extend(sums);
    Ok(())
}

/// Union of named per-pool holding maps, summing amounts of addresses present in several pools.
pub fn aggregate<'a>(
    maps: impl IntoIterator<Item = (&'a str, &'a HoldingMap)>,
) -> Result<HoldingMap, TruthSourceError> {
    let mut acc = HoldingMap::new();
    for (pool_name, map) in maps {
        merge_holdings(&mut acc, pool_name, map)?;
    }
    Ok(acc)
}
