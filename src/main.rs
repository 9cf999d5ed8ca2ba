//! Resilient executor CLI.
//!
//! # Commands
//! - `demo`: submit mock orders through a fault injector and the executor
//! - `stress`: trip the circuit under sustained 503s, wait out the cooldown, probe recovery
//! - `check-config`: load and validate a configuration file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use resilient_executor::config::{load_config, ExecutorConfig};
use resilient_executor::fault::{FaultInjector, FaultProfile};
use resilient_executor::observability::{logging, metrics};
use resilient_executor::resilience::{CallExecutor, CircuitState, ExecutorError, RetryPolicy};
use resilient_executor::ApiError;

#[derive(Parser)]
#[command(name = "resilient-executor")]
#[command(about = "Retry + circuit breaker executor with fault injection drills", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit mock orders through injected faults
    Demo {
        /// Number of orders to submit
        #[arg(short, long, default_value_t = 10)]
        orders: usize,

        /// Submit all orders at once instead of one by one
        #[arg(long)]
        concurrent: bool,
    },
    /// Measure circuit trip and recovery timing
    Stress,
    /// Validate a configuration file and print the result
    CheckConfig,
}

#[derive(Debug, Clone, Serialize)]
struct OrderAck {
    order_id: String,
    client_order_id: Uuid,
    symbol: String,
    qty: u32,
    status: String,
}

const SYMBOLS: [&str; 10] = ["AAPL", "MSFT", "NVDA", "TSLA", "AMZN", "META", "GOOGL", "SPY", "QQQ", "IWM"];

fn mock_order(symbol: &str, qty: u32) -> OrderAck {
    OrderAck {
        order_id: format!("MOCK-{}", rand::thread_rng().gen_range(10_000..100_000)),
        client_order_id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        qty,
        status: "accepted".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ExecutorConfig::default(),
    };

    if let Commands::CheckConfig = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    logging::init_logging(&config.observability)?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match cli.command {
        Commands::Demo { orders, concurrent } => run_demo(&config, orders, concurrent).await?,
        Commands::Stress => run_stress().await?,
        Commands::CheckConfig => {}
    }

    Ok(())
}

async fn run_demo(
    config: &ExecutorConfig,
    orders: usize,
    concurrent: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let executor = Arc::new(CallExecutor::from_config(config)?);
    let profile = FaultProfile::from(&config.fault);

    tracing::info!(
        orders,
        concurrent,
        failure_rate = profile.failure_rate,
        burst_at = ?profile.burst_at,
        burst_duration = profile.burst_duration,
        "Starting order demo"
    );

    let symbols: Vec<String> = (0..orders).map(|i| SYMBOLS[i % SYMBOLS.len()].to_string()).collect();
    let injector = Arc::new(FaultInjector::new(|| (), profile));
    let outcomes = submit_orders(&executor, &injector, &symbols, concurrent).await;

    for (symbol, outcome) in symbols.iter().zip(&outcomes) {
        match outcome {
            Ok(ack) => tracing::info!(symbol = %symbol, order_id = %ack.order_id, "Order accepted"),
            Err(e) => tracing::warn!(symbol = %symbol, error = %e, "Order failed"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&executor.stats())?);
    Ok(())
}

/// Submit one order per symbol. Every attempt of every order draws from the
/// same injector, so a burst window spans consecutive orders.
async fn submit_orders<F>(
    executor: &Arc<CallExecutor>,
    injector: &Arc<FaultInjector<F>>,
    symbols: &[String],
    concurrent: bool,
) -> Vec<Result<OrderAck, ExecutorError<ApiError>>>
where
    F: Fn() + Send + Sync + 'static,
{
    let submit = |symbol: &String| {
        let executor = executor.clone();
        let injector = injector.clone();
        let symbol = symbol.clone();
        async move {
            executor
                .execute(move || injector.call().map(|()| mock_order(&symbol, 10)))
                .await
        }
    };

    if concurrent {
        join_all(symbols.iter().map(submit)).await
    } else {
        let mut outcomes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            outcomes.push(submit(symbol).await);
        }
        outcomes
    }
}

async fn run_stress() -> Result<(), Box<dyn std::error::Error>> {
    let policy = RetryPolicy::builder()
        .max_attempts(5)
        .base_delay(Duration::from_millis(10))
        .cap_delay(Duration::from_millis(500))
        .failure_threshold(5)
        .circuit_open_duration(Duration::from_secs(2))
        .build()?;
    let open_duration = policy.circuit_open_duration();
    let executor = CallExecutor::new(policy);

    tracing::info!("Phase 1: sustained failures, tripping circuit");
    let overloaded = Arc::new(FaultInjector::new(|| (), FaultProfile::always(503)));
    let (mut fast_failed, mut exhausted) = (0u32, 0u32);
    for _ in 0..30 {
        let injector = overloaded.clone();
        match executor.execute(move || injector.call()).await {
            Err(ExecutorError::CircuitOpen { .. }) => fast_failed += 1,
            Err(_) => exhausted += 1,
            Ok(()) => {}
        }
    }

    if executor.circuit_state() != CircuitState::Open {
        return Err(format!("circuit should be OPEN, found {}", executor.circuit_state()).into());
    }
    let tripped_at = Instant::now();
    tracing::info!(
        trips = executor.breaker().trip_count(),
        fast_failed,
        exhausted,
        dispatched = overloaded.call_count(),
        "Circuit open"
    );

    tracing::info!("Phase 2: waiting for recovery window");
    tokio::time::sleep(open_duration + Duration::from_millis(200)).await;

    tracing::info!("Phase 3: probing recovery");
    let result = executor.execute(|| Ok::<_, ApiError>("ok")).await?;
    if result != "ok" || executor.circuit_state() != CircuitState::Closed {
        return Err("circuit did not close after a successful probe".into());
    }
    tracing::info!(
        recovery_secs = tripped_at.elapsed().as_secs_f64(),
        "Circuit closed"
    );

    println!("{}", serde_json::to_string_pretty(&executor.stats())?);
    Ok(())
}
