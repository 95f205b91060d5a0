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

//! Audit files: one JSON object per holding map, mapping lower-case hex
//! addresses to decimal integer strings.

use std::{collections::BTreeMap, path::Path};

use alloy::primitives::{Address, U256};

use crate::{
    error::{PersistenceError, TruthSourceError},
    holdings::HoldingMap,
};

fn to_entries(holdings: &HoldingMap) -> BTreeMap<String, String> {
    holdings.iter().map(|(staker, amount)| (format!("{staker:#x}"), amount.to_string())).collect()
}

fn from_entries(entries: BTreeMap<String, String>) -> Result<HoldingMap, PersistenceError> {
    let mut holdings = HoldingMap::new();
    for (key, value) in entries {
        let staker: Address = key.parse().map_err(|err| PersistenceError::MalformedEntry {
            key: key.clone(),
            reason: format!("invalid address: {err}"),
        })?;
        let amount = U256::from_str_radix(&value, 10).map_err(|err| {
            PersistenceError::MalformedEntry { key: key.clone(), reason: format!("invalid amount: {err}") }
        })?;
        // Keys differing only in case collapse to one address.
        *holdings.entry(staker).or_insert(U256::ZERO) += amount;
    }
    Ok(holdings)
}

async fn write_inner(path: &Path, holdings: &HoldingMap) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let data = serde_json::to_vec_pretty(&to_entries(holdings))?;
    tokio::fs::write(path, data).await?;
    Ok(())
}

/// Write a holding map to `path`, creating parent directories as needed.
pub async fn write_holdings(path: &Path, holdings: &HoldingMap) -> Result<(), TruthSourceError> {
    write_inner(path, holdings).await.map_err(|source| TruthSourceError::PersistenceFailure {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Wrote {} holdings to {}", holdings.len(), path.display());
    Ok(())
}

/// Read a holding map previously written with [write_holdings].
pub async fn read_holdings(path: &Path) -> Result<HoldingMap, TruthSourceError> {
    let read = async {
        let data = tokio::fs::read(path).await?;
        let entries: BTreeMap<String, String> = serde_json::from_slice(&data)?;
        Ok::<_, PersistenceError>(from_entries(entries)?)
    };
    read.await.map_err(|source| TruthSourceError::PersistenceFailure {
        path: path.to_path_buf(),
        source,
    })
}
