//! CLI host for the credit service pipeline: start, drive concurrent
//! traffic, print final balances, stop gracefully.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use credit_service::{
    build_dispatch, CreditService, GetCreditsRequest, GetCreditsResponse, IncrementCreditsRequest,
    IncrementCreditsResponse,
};
use dispatch_core::{DispatchConfig, DispatchError};

#[derive(Parser, Debug)]
#[command(name = "credit-service", about = "Drive the credit pipeline with synthetic traffic")]
struct Args {
    /// Number of partition backends (default: available parallelism).
    #[arg(long, env = "CREDIT_PARTITIONS")]
    partitions: Option<usize>,

    /// Bounded queue capacity per partition.
    #[arg(long, env = "CREDIT_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Increment requests to issue per customer.
    #[arg(long, default_value_t = 100)]
    requests: u32,

    /// Number of distinct customers to drive.
    #[arg(long, default_value_t = 8)]
    customers: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = DispatchConfig::default();
    if let Some(partitions) = args.partitions {
        config.partition_count = partitions;
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = capacity;
    }

    let service = Arc::new(CreditService::new());
    let dispatch = Arc::new(build_dispatch(Arc::clone(&service), &config)?);

    dispatch.start().await?;
    info!(
        partitions = config.partition_count,
        queue_capacity = config.queue_capacity,
        "pipeline started"
    );

    let drivers: Vec<_> = (1..=args.customers)
        .map(|customer| {
            let dispatch = Arc::clone(&dispatch);
            let requests = args.requests;
            tokio::spawn(async move {
                for _ in 0..requests {
                    dispatch
                        .execute_operation::<IncrementCreditsRequest, IncrementCreditsResponse>(
                            IncrementCreditsRequest { customer_id: customer, credits: 1.0 },
                        )
                        .await?;
                }
                Ok::<_, DispatchError>(())
            })
        })
        .collect();
    for driver in drivers {
        driver.await??;
    }

    for customer in 1..=args.customers {
        let response: GetCreditsResponse = dispatch
            .execute_operation(GetCreditsRequest { customer_id: customer })
            .await?;
        info!(customer, credits = response.credits, "final balance");
    }

    dispatch.stop().await?;
    info!("pipeline stopped");
    Ok(())
}
