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

use std::{path::PathBuf, sync::Arc};

use alloy::{
    providers::{fillers::ChainIdFiller, ProviderBuilder},
    rpc::client::RpcClient,
    transports::layers::RetryBackoffLayer,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use lp_truth_source::{
    ChainSource, PairContractReserveSource, ReserveSource, ReserveSourceConfig,
    SubgraphReserveSource, TruthSource, TruthSourceConfig,
};
use url::Url;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// URL of the Ethereum RPC endpoint. Must serve historical state at the target block.
    #[clap(short, long, env)]
    rpc_url: Url,

    /// Path of the TOML config file listing the tracked pools
    #[clap(short, long, env)]
    config_file: PathBuf,

    /// Block at which staker balances are evaluated, overrides the config file
    #[clap(long, env)]
    target_block: Option<u64>,

    /// Max number of RPC retries
    #[clap(long, default_value_t = 10)]
    rpc_retry_max: u32,

    /// Initial backoff between RPC retries, in milliseconds
    #[clap(long, default_value_t = 1000)]
    rpc_retry_backoff: u64,

    /// Compute units per second for rate limiting the RPC
    #[clap(long, default_value_t = 100)]
    rpc_retry_cu: u64,

    /// Whether to log in JSON format
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.log_json {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let mut config = TruthSourceConfig::load(&args.config_file)
        .await
        .context("Failed to load truth source config")?;
    if let Some(target_block) = args.target_block {
        config = config.with_target_block(target_block);
    }
    config.validate().context("Invalid truth source config")?;

    let provider = ProviderBuilder::new()
        .disable_recommended_fillers()
        .filler(ChainIdFiller::default())
        .connect_client(
            RpcClient::builder()
                .layer(RetryBackoffLayer::new(
                    args.rpc_retry_max,
                    args.rpc_retry_backoff,
                    args.rpc_retry_cu,
                ))
                .http(args.rpc_url.clone()),
        );

    let chain = Arc::new(
        ChainSource::new(provider.clone()).with_chunk_size(config.log_query_chunk_size),
    );
    let reserves: Arc<dyn ReserveSource> = match &config.reserve_source {
        ReserveSourceConfig::PairContract => Arc::new(PairContractReserveSource::new(provider)),
        ReserveSourceConfig::Subgraph { subgraph_url, timeout_secs } => Arc::new(
            SubgraphReserveSource::new(
                subgraph_url.clone(),
                std::time::Duration::from_secs(*timeout_secs),
            )
            .context("Failed to build subgraph client")?,
        ),
    };

    let truth_source = TruthSource::new(config, chain.clone(), chain, reserves)?;
    let report = truth_source.run().await;

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(pool) => tracing::info!(
                "{}: {} historic stakers, {} holders, staked {} of {} LP tokens",
                outcome.pool,
                pool.historic_stakers,
                pool.holdings.len(),
                pool.balances.expected_total_supply,
                pool.balances.actual_total_supply
            ),
            Err(err) => tracing::error!(
                "{}: failed at stage {}: {err:?}",
                outcome.pool,
                err.stage().map(|stage| stage.to_string()).unwrap_or_else(|| "-".to_string())
            ),
        }
    }

    let failed = report.failures().count();
    if failed > 0 {
        bail!("{failed} of {} pools failed at block {}", report.outcomes.len(), report.target_block);
    }
    if !report.is_trustworthy() {
        tracing::warn!(
            "Aggregate of {} holders is not trustworthy: see integrity and persistence warnings above",
            report.aggregate.len()
        );
    }

    Ok(())
}
