use owo_colors::OwoColorize;

/// Resolves when the process is asked to exit: SIGINT from a terminal or
/// SIGTERM from the kubelet.
pub async fn shutdown_signal() {
    let signal = wait_for_signal().await;
    eprintln!("{}", format!("🛑 Received {signal}, shutting down").red());
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut terminate = signal(SignalKind::terminate()).expect("install SIGTERM handler");

    tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    tokio::signal::ctrl_c()
        .await
        .expect("install Ctrl+C handler");
    "Ctrl+C"
}
