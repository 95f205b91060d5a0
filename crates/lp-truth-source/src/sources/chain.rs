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

use alloy::{
    primitives::{Address, U256},
    providers::Provider,
    rpc::types::{BlockId, Filter},
    sol_types::SolEvent,
};
use async_trait::async_trait;

use super::{BalanceSource, EventSource, TransferRecord};
use crate::{contracts::IERC20, error::SourceError, query_logs_chunked, LOG_QUERY_CHUNK_SIZE};

/// Event and balance source backed by an alloy provider.
#[derive(Clone, Debug)]
pub struct ChainSource<P> {
    provider: P,
    chunk_size: u64,
}

impl<P> ChainSource<P> {
    /// Create a new chain source with the default log query chunk size
    pub fn new(provider: P) -> Self {
        Self { provider, chunk_size: LOG_QUERY_CHUNK_SIZE }
    }

    /// Set the block range of a single `eth_getLogs` request
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[async_trait]
impl<P: Provider> EventSource for ChainSource<P> {
    async fn transfers(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferRecord>, SourceError> {
        let filter = Filter::new().address(token).event_signature(IERC20::Transfer::SIGNATURE_HASH);
        let logs =
            query_logs_chunked(&self.provider, filter, from_block, to_block, self.chunk_size)
                .await?;

        logs.iter()
            .map(|log| {
                let decoded = log.log_decode::<IERC20::Transfer>().map_err(|err| {
                    SourceError::InvalidResponse(format!(
                        "undecodable Transfer log in tx {:?}: {err}",
                        log.transaction_hash
                    ))
                })?;
                Ok(TransferRecord {
                    from: decoded.inner.data.from,
                    to: decoded.inner.data.to,
                    value: decoded.inner.data.value,
                    block_number: log.block_number,
                })
            })
            .collect()
    }
}

#[async_trait]
impl<P: Provider> BalanceSource for ChainSource<P> {
    async fn balance_of(
        &self,
        contract: Address,
        holder: Address,
        block: u64,
    ) -> Result<U256, SourceError> {
        let token = IERC20::new(contract, &self.provider);
        Ok(token.balanceOf(holder).block(BlockId::number(block)).call().await?)
    }

    async fn total_supply(&self, contract: Address, block: u64) -> Result<U256, SourceError> {
        let token = IERC20::new(contract, &self.provider);
        Ok(token.totalSupply().block(BlockId::number(block)).call().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        primitives::{address, B256},
        providers::ProviderBuilder,
    };
    use httpmock::prelude::*;

    fn transfer_log(from: Address, to: Address, value: u64, block: u64) -> serde_json::Value {
        serde_json::json!({
            "address": "0xe6f19dab7d43317344282f803f8e8d240708174a",
            "topics": [
                format!("{:#x}", IERC20::Transfer::SIGNATURE_HASH),
                format!("{:#x}", from.into_word()),
                format!("{:#x}", to.into_word()),
            ],
            "data": format!("{:#x}", B256::from(U256::from(value))),
            "blockNumber": format!("{block:#x}"),
            "blockHash": format!("{:#x}", B256::repeat_byte(1)),
            "transactionHash": format!("{:#x}", B256::repeat_byte(2)),
            "transactionIndex": "0x0",
            "logIndex": "0x0",
            "removed": false
        })
    }

    #[tokio::test]
    async fn decodes_transfer_logs() {
        let server = MockServer::start();
        let staker = address!("0x00000000000000000000000000000000000000aa");
        let rewards = address!("0x0000000000000000000000000000000000000a11");

        let mock = server.mock(|when, then| {
            when.method(POST).path("/").body_contains("eth_getLogs");
            then.status(200).header("content-type", "application/json").json_body(
                serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": 0,
                    "result": [transfer_log(staker, rewards, 100, 10)]
                }),
            );
        });

        let provider = ProviderBuilder::new().connect_http(server.base_url().parse().unwrap());
        let source = ChainSource::new(provider).with_chunk_size(1000);

        let transfers = source
            .transfers(address!("0xe6f19dab7d43317344282f803f8e8d240708174a"), 0, 99)
            .await
            .unwrap();

        mock.assert_hits(1);
        assert_eq!(
            transfers,
            vec![TransferRecord {
                from: staker,
                to: rewards,
                value: U256::from(100),
                block_number: Some(10)
            }]
        );
    }

    #[tokio::test]
    async fn pages_large_block_ranges() {
        let server = MockServer::start();

        let mock = server.mock(|when, then| {
            when.method(POST).path("/").body_contains("eth_getLogs");
            then.status(200).header("content-type", "application/json").json_body(
                serde_json::json!({ "jsonrpc": "2.0", "id": 0, "result": [] }),
            );
        });

        let provider = ProviderBuilder::new().connect_http(server.base_url().parse().unwrap());
        let source = ChainSource::new(provider).with_chunk_size(10);

        let transfers = source.transfers(Address::ZERO, 100, 124).await.unwrap();

        assert!(transfers.is_empty());
        // 100..=109, 110..=119, 120..=124
        mock.assert_hits(3);
    }

    #[tokio::test]
    async fn balance_query_rpc_error() {
        let server = MockServer::start();

        server.mock(|when, then| {
            when.method(POST).path("/");
            then.status(200).header("content-type", "application/json").json_body(
                serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": 0,
                    "error": { "code": -32000, "message": "header not found" }
                }),
            );
        });

        let provider = ProviderBuilder::new().connect_http(server.base_url().parse().unwrap());
        let source = ChainSource::new(provider);

        let result = source.balance_of(Address::ZERO, Address::ZERO, 12000000).await;
        assert!(matches!(result, Err(SourceError::Rpc(_))));
    }
}
