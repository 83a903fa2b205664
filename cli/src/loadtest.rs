//! Concurrent load generator.
//!
//! Opens `clients` persistent connections, each sending `attempts` purchase
//! requests with a unique user id, and tallies the outcomes.

use flashsale_core::purchase::PurchaseResponse;
use flashsale_runtime::PurchaseClient;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Parameters of one load test run.
#[derive(Debug, Clone)]
pub struct LoadTestPlan {
    /// Server address
    pub addr: String,
    /// Product every client tries to buy
    pub product_id: String,
    /// Number of concurrent connections
    pub clients: usize,
    /// Sequential attempts per connection
    pub attempts: usize,
}

#[derive(Debug, Default)]
struct Counters {
    success: AtomicU64,
    sold_out: AtomicU64,
    errors: AtomicU64,
    latency_micros: AtomicU64,
}

/// Outcome tallies of a load test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTestReport {
    /// Wall-clock time of the run
    pub duration: Duration,
    /// `SUCCESS` responses
    pub success: u64,
    /// `SOLD_OUT` responses
    pub sold_out: u64,
    /// `ERROR` responses and transport failures
    pub errors: u64,
    /// Sum of per-request latencies
    pub total_latency: Duration,
}

impl LoadTestReport {
    /// Requests accounted for.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.success + self.sold_out + self.errors
    }

    /// Requests per second over the whole run.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total() as f64 / secs
    }

    /// Mean request latency.
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        match u32::try_from(self.total()) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_latency / n,
            Err(_) => Duration::from_secs_f64(
                self.total_latency.as_secs_f64() / f64::from(u32::MAX),
            ),
        }
    }

    /// Units sold beyond `expected_stock`, if any.
    #[must_use]
    pub fn oversold(&self, expected_stock: u64) -> Option<u64> {
        self.success
            .checked_sub(expected_stock)
            .filter(|over| *over > 0)
    }
}

impl fmt::Display for LoadTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Load Test Results ===")?;
        writeln!(f, "Duration:          {:?}", self.duration)?;
        writeln!(f, "Total Requests:    {}", self.total())?;
        writeln!(f, "Successful:        {}", self.success)?;
        writeln!(f, "Sold Out:          {}", self.sold_out)?;
        writeln!(f, "Errors:            {}", self.errors)?;
        writeln!(f, "Throughput:        {:.0} req/sec", self.throughput())?;
        write!(
            f,
            "Avg Latency:       {:.3} ms",
            self.average_latency().as_secs_f64() * 1000.0
        )
    }
}

/// Run the plan to completion.
///
/// Connection failures count every attempt of that client as an error.
pub async fn run(plan: &LoadTestPlan) -> LoadTestReport {
    let counters = Arc::new(Counters::default());
    let started = Instant::now();

    let mut tasks = Vec::with_capacity(plan.clients);
    for client_id in 0..plan.clients {
        let counters = Arc::clone(&counters);
        let plan = plan.clone();
        tasks.push(tokio::spawn(async move {
            run_client(client_id, &plan, &counters).await;
        }));
    }

    for result in futures::future::join_all(tasks).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Load test client task failed");
        }
    }

    LoadTestReport {
        duration: started.elapsed(),
        success: counters.success.load(Ordering::Relaxed),
        sold_out: counters.sold_out.load(Ordering::Relaxed),
        errors: counters.errors.load(Ordering::Relaxed),
        total_latency: Duration::from_micros(counters.latency_micros.load(Ordering::Relaxed)),
    }
}

async fn run_client(client_id: usize, plan: &LoadTestPlan, counters: &Counters) {
    let mut client = match PurchaseClient::connect(plan.addr.as_str()).await {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(client_id, error = %e, "Connection failed");
            counters
                .errors
                .fetch_add(plan.attempts as u64, Ordering::Relaxed);
            return;
        }
    };

    for attempt in 0..plan.attempts {
        let user_id = format!("user_{client_id}_{attempt}");
        let sent = Instant::now();
        let result = client.attempt_purchase(&plan.product_id, &user_id).await;
        let micros = u64::try_from(sent.elapsed().as_micros()).unwrap_or(u64::MAX);
        counters.latency_micros.fetch_add(micros, Ordering::Relaxed);

        let counter = match result {
            Ok(PurchaseResponse::Success { .. }) => &counters.success,
            Ok(PurchaseResponse::SoldOut) => &counters.sold_out,
            Ok(PurchaseResponse::Error { .. }) => &counters.errors,
            Err(e) => {
                tracing::debug!(client_id, error = %e, "Request failed");
                counters.errors.fetch_add(1, Ordering::Relaxed);
                // The connection is unusable after a transport error
                let remaining = (plan.attempts - attempt - 1) as u64;
                counters.errors.fetch_add(remaining, Ordering::Relaxed);
                return;
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
