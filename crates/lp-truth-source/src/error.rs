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

//! Error types for the LP truth source pipeline.

use std::{fmt, path::PathBuf};

use alloy::primitives::{Address, U256};
use thiserror::Error;

/// Pipeline stage at which a pool run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Scanning pool-token `Transfer` events
    FindStakers,
    /// Per-staker `balanceOf` queries on the rewards contract
    GetBalances,
    /// `totalSupply` query on the rewards contract
    TotalSupply,
    /// Pair reserve snapshot query
    ReserveSnapshot,
    /// Proportional holding computation
    DeriveHoldings,
    /// Merging pool holdings into the aggregate
    Aggregate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FindStakers => "find-stakers",
            Stage::GetBalances => "get-balances",
            Stage::TotalSupply => "total-supply",
            Stage::ReserveSnapshot => "reserve-snapshot",
            Stage::DeriveHoldings => "derive-holdings",
            Stage::Aggregate => "aggregate",
        };
        f.write_str(name)
    }
}

/// Failure of one of the external query sources.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Contract call failed
    #[error("RPC error: {0}")]
    Rpc(#[from] alloy::contract::Error),

    /// Transport level failure, e.g. for `eth_getLogs`
    #[error("Transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),

    /// HTTP error from an off-chain source
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The source answered with data that could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Failure to write or read an audit file.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed entry {key}: {reason}")]
    MalformedEntry { key: String, reason: String },
}

/// Why a single holding could not be computed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingError {
    /// The pair reported a zero pool-token supply
    #[error("pair total supply is zero")]
    ZeroTotalSupply,

    /// `balance * reserve` does not fit in 256 bits
    #[error("balance * reserve overflows 256 bits")]
    Overflow,
}

/// Errors raised by the truth source pipeline.
#[derive(Error, Debug)]
pub enum TruthSourceError {
    /// An event, balance or reserve query failed. Fatal for the pool.
    #[error("{pool}: {stage} query failed{}: {source}", describe_blocks(.blocks))]
    QuerySourceUnavailable {
        /// Pool name
        pool: String,
        /// Stage at which the query was issued
        stage: Stage,
        /// Inclusive block range of the query, `None` for current-state queries
        blocks: Option<(u64, u64)>,
        /// Underlying source error
        #[source]
        source: SourceError,
    },

    /// The reserve snapshot reported a zero pool-token supply.
    #[error("{pool}: pair total supply is zero, cannot derive holdings")]
    DivisionByZero {
        /// Pool name
        pool: String,
    },

    /// A balance sum, `balance * reserve` or an aggregate sum does not fit in 256 bits.
    #[error("{pool}: {stage} arithmetic overflowed for staker {staker}")]
    ArithmeticOverflow {
        /// Pool name
        pool: String,
        /// Stage whose computation overflowed
        stage: Stage,
        /// Staker whose amount overflowed
        staker: Address,
    },

    /// Writing an audit file failed. Does not invalidate in-memory results.
    #[error("Failed to persist holdings to {path:?}: {source}")]
    PersistenceFailure {
        /// Target file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: PersistenceError,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

fn describe_blocks(blocks: &Option<(u64, u64)>) -> String {
    match blocks {
        Some((from, to)) if from == to => format!(" at block {from}"),
        Some((from, to)) => format!(" for blocks {from}..={to}"),
        None => String::new(),
    }
}

impl TruthSourceError {
    /// The stage this error belongs to, if it was raised by a pool pipeline stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            TruthSourceError::QuerySourceUnavailable { stage, .. }
            | TruthSourceError::ArithmeticOverflow { stage, .. } => Some(*stage),
            TruthSourceError::DivisionByZero { .. } => Some(Stage::DeriveHoldings),
            TruthSourceError::PersistenceFailure { .. } | TruthSourceError::Config(_) => None,
        }
    }
}

/// Sum of staker balances differs from the rewards contract total supply.
///
/// This is a warning, not an error: it usually means staking history predates
/// the pool's configured creation block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityMismatch {
    /// Pool name
    pub pool: String,
    /// Sum of the non-zero staker balances
    pub expected: U256,
    /// `totalSupply()` reported by the rewards contract
    pub actual: U256,
}

impl fmt::Display for IntegrityMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: sum of LP staker balances {} does not match the total supply {}",
            self.pool, self.expected, self.actual
        )
    }
}
