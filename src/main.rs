//! Risk engine driver.
//!
//! Runs the engine against a simulated prediction backend with tunable
//! latency and failure rate, then prints the metrics snapshot and health
//! report as JSON. Useful for exercising configuration files and watching
//! the breaker, cache and pool behave under load.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use risk_engine::config::{load_config, EngineConfig};
use risk_engine::engine::{
    BackendError, PredictionBackend, RiskAssessment, RiskFactor, RiskLevel, RiskPrediction,
    RiskRequest, RiskTrend,
};
use risk_engine::observability::{logging, metrics};
use risk_engine::RiskEngine;

#[derive(Parser)]
#[command(name = "risk-engine")]
#[command(about = "Resilient risk-scoring execution engine", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the effective settings
    Check,
    /// Drive the engine with simulated traffic
    Simulate {
        /// Number of single requests to send
        #[arg(short, long, default_value_t = 200)]
        requests: usize,

        /// Distinct businesses to draw requests from (controls cache hit rate)
        #[arg(short, long, default_value_t = 50)]
        businesses: usize,

        /// Items per batch call
        #[arg(long, default_value_t = 20)]
        batch_size: usize,

        /// Probability that a backend call fails
        #[arg(long, default_value_t = 0.05)]
        failure_rate: f64,

        /// Mean simulated backend latency
        #[arg(long, default_value_t = 20)]
        latency_ms: u64,
    },
}

/// Backend that scores deterministically from the request and injects
/// random latency and failures.
struct SimulatedBackend {
    failure_rate: f64,
    latency: Duration,
}

impl SimulatedBackend {
    async fn simulate_call(&self) -> Result<(), BackendError> {
        let jitter = fastrand::f64() + 0.5;
        tokio::time::sleep(self.latency.mul_f64(jitter)).await;
        if fastrand::f64() < self.failure_rate {
            return Err(BackendError::ModelUnavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    fn score(request: &RiskRequest) -> (f64, Vec<RiskFactor>) {
        let mut factors = Vec::new();
        let mut score: f64 = 20.0;

        let industry = request.industry.to_lowercase();
        if ["crypto", "gambling", "firearms"].iter().any(|i| industry.contains(i)) {
            score += 45.0;
            factors.push(RiskFactor {
                name: "industry".to_string(),
                impact: 45.0,
                description: format!("high-risk industry: {}", request.industry),
            });
        }
        match request.years_in_business {
            Some(years) if years >= 5 => {
                score -= 10.0;
                factors.push(RiskFactor {
                    name: "tenure".to_string(),
                    impact: -10.0,
                    description: format!("{} years in business", years),
                });
            }
            None => {
                score += 10.0;
                factors.push(RiskFactor {
                    name: "tenure".to_string(),
                    impact: 10.0,
                    description: "unknown business age".to_string(),
                });
            }
            _ => {}
        }

        (score.clamp(0.0, 100.0), factors)
    }
}

#[async_trait]
impl PredictionBackend for SimulatedBackend {
    async fn predict_risk(
        &self,
        model: &str,
        request: &RiskRequest,
    ) -> Result<RiskAssessment, BackendError> {
        if request.business_name.trim().is_empty() {
            return Err(BackendError::InvalidRequest("business name is empty".to_string()));
        }
        self.simulate_call().await?;

        let (risk_score, factors) = Self::score(request);
        Ok(RiskAssessment {
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            confidence: 0.85,
            factors,
            model: model.to_string(),
        })
    }

    async fn predict_future_risk(
        &self,
        model: &str,
        request: &RiskRequest,
        horizon_months: u32,
    ) -> Result<RiskPrediction, BackendError> {
        self.simulate_call().await?;

        let (current_score, _) = Self::score(request);
        let drift = horizon_months as f64 * 0.5;
        let predicted_score = (current_score + drift).clamp(0.0, 100.0);
        Ok(RiskPrediction {
            horizon_months,
            current_score,
            predicted_score,
            risk_level: RiskLevel::from_score(predicted_score),
            trend: if drift > 1.0 {
                RiskTrend::Deteriorating
            } else {
                RiskTrend::Stable
            },
            confidence: (0.9 - horizon_months as f64 * 0.01).max(0.5),
            model: model.to_string(),
        })
    }
}

fn business(i: usize) -> RiskRequest {
    const INDUSTRIES: [&str; 4] = ["Retail", "Software", "Crypto Exchange", "Logistics"];
    let mut request = RiskRequest::new(
        format!("Business {}", i),
        format!("{} Market St", i + 1),
        INDUSTRIES[i % INDUSTRIES.len()],
        "US",
    );
    request.years_in_business = (i % 3 != 0).then_some((i % 12) as u32);
    request
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    logging::init_logging(&config.observability)?;

    match cli.command {
        Commands::Check => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Simulate {
            requests,
            businesses,
            batch_size,
            failure_rate,
            latency_ms,
        } => {
            simulate(
                config,
                requests,
                businesses.max(1),
                batch_size,
                SimulatedBackend {
                    failure_rate: failure_rate.clamp(0.0, 1.0),
                    latency: Duration::from_millis(latency_ms),
                },
            )
            .await
        }
    }
}

async fn simulate(
    config: EngineConfig,
    requests: usize,
    businesses: usize,
    batch_size: usize,
    backend: SimulatedBackend,
) -> Result<(), Box<dyn std::error::Error>> {
    let metrics_address = config.observability.metrics_address.clone();
    if config.observability.metrics_enabled && !metrics_address.is_empty() {
        match metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let engine = RiskEngine::new(config, Arc::new(backend));
    let scope = CancellationToken::new();

    {
        let scope = scope.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, cancelling in-flight work");
                scope.cancel();
            }
        });
    }

    tracing::info!(requests, businesses, batch_size, "Simulation starting");

    let singles: Vec<_> = (0..requests)
        .map(|i| {
            let engine = engine.clone();
            let scope = scope.clone();
            tokio::spawn(async move {
                let request = business(i % businesses);
                if i % 10 == 0 {
                    engine.predict_risk(&scope, &request, 12).await.map(|_| ())
                } else {
                    engine.assess_risk(&scope, &request).await.map(|_| ())
                }
            })
        })
        .collect();

    let mut failures = 0usize;
    for handle in singles {
        if !matches!(handle.await, Ok(Ok(()))) {
            failures += 1;
        }
    }

    let batch: Vec<_> = (0..batch_size).map(|i| business(businesses + i)).collect();
    let batch_summary = match engine.assess_risk_batch(&scope, batch).await {
        Ok(outcome) => json!({
            "items": outcome.len(),
            "succeeded": outcome.success_count(),
            "failed": outcome.failure_count(),
            "error": outcome.error().map(|e| e.to_string()),
        }),
        Err(e) => json!({ "error": e.to_string() }),
    };

    let report = json!({
        "single_request_failures": failures,
        "batch": batch_summary,
        "metrics": engine.get_metrics(),
        "health": engine.health_check(),
        "cache": engine.get_cache_stats(),
        "circuit_breaker": engine.get_circuit_breaker_stats(),
        "pool": engine.get_pool_stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    engine.shutdown(Duration::from_secs(5)).await?;
    tracing::info!("Simulation complete");
    Ok(())
}
