use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use lazy_static::lazy_static;
use owo_colors::OwoColorize;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
    static ref RECONCILE_COUNTER: IntCounterVec = register(
        IntCounterVec::new(
            Opts::new(
                "account_quota_reconciles_total",
                "Total reconciles executed",
            ),
            &["queue"],
        )
        .expect("create reconcile counter"),
    );
    static ref SYNC_HISTOGRAM: HistogramVec = register(
        HistogramVec::new(
            HistogramOpts::new("account_quota_sync_duration_seconds", "Reconcile duration"),
            &["result"],
        )
        .expect("create sync histogram"),
    );
    static ref QUEUE_DEPTH: IntGaugeVec = register(
        IntGaugeVec::new(
            Opts::new("account_quota_queue_depth", "Work queue depth"),
            &["queue"],
        )
        .expect("create queue depth gauge"),
    );
    static ref MONITOR_COUNT: IntGauge = register(
        IntGauge::new("account_quota_monitors", "Live resource monitors")
            .expect("create monitor gauge"),
    );
}

fn register<C: prometheus::core::Collector + Clone + 'static>(collector: C) -> C {
    REGISTRY
        .register(Box::new(collector.clone()))
        .expect("register metric");
    collector
}

/// Handles to the controller's Prometheus instruments. The instruments are
/// process-wide, so a standby replica re-acquiring leadership keeps its
/// counters.
pub struct ControllerMetrics {
    /// Reconciles executed, labelled by the queue that delivered the key.
    pub reconcile_counter: IntCounterVec,

    /// Reconcile wall time, labelled by outcome.
    pub sync_histogram: HistogramVec,

    /// Current depth of each work queue.
    pub queue_depth: IntGaugeVec,

    /// Number of live resource monitors.
    pub monitor_count: IntGauge,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self {
            reconcile_counter: RECONCILE_COUNTER.clone(),
            sync_histogram: SYNC_HISTOGRAM.clone(),
            queue_depth: QUEUE_DEPTH.clone(),
            monitor_count: MONITOR_COUNT.clone(),
        }
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves `/metrics`, `/healthz` and `/readyz` until the token is cancelled.
pub async fn serve(port: u16, stop: CancellationToken) {
    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("🛑 Failed to bind metrics server to {}: {}", addr, e);
            return;
        }
    };
    println!(
        "{}{}",
        "📈 Starting metrics server • port=".green(),
        format!("{}", port).green().dimmed(),
    );
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            accepted = listener.accept() => {
                let Ok((stream, _)) = accepted else { continue };
                tokio::spawn(async move {
                    let builder = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
                    if let Err(e) = builder
                        .serve_connection(TokioIo::new(stream), service_fn(handle))
                        .await
                    {
                        eprintln!("metrics connection error: {e}");
                    }
                });
            }
        }
    }
    println!("{}", "🛑 Metrics server stopped".red());
}

async fn handle(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let response = match req.uri().path() {
        "/metrics" => {
            let mut buf = Vec::new();
            if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buf) {
                eprintln!("failed to encode metrics: {e}");
            }
            Response::new(Full::new(Bytes::from(buf)))
        }
        "/healthz" | "/readyz" => Response::new(Full::new(Bytes::from_static(b"ok"))),
        _ => Response::builder()
            .status(404)
            .body(Full::new(Bytes::new()))
            .expect("build 404 response"),
    };
    Ok(response)
}
