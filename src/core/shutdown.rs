use tokio::signal;

/// Resolves on Ctrl+C or SIGTERM. In-flight requests, including open
/// submit transactions, are drained by `axum::serve` afterwards.
pub(crate) async fn shutdown_signal() {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => "interrupt",
            Err(err) => {
                tracing::error!(error = %err, "Ctrl+C handler unavailable");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "terminate"
            }
            Err(err) => {
                tracing::error!(error = %err, "SIGTERM handler unavailable");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let received = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };

    tracing::info!(signal = received, "Shutting down, draining in-flight requests");
}
