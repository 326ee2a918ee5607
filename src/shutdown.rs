use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancel a token on the first SIGTERM or SIGINT.
///
/// The handlers are registered before this returns, so a signal that
/// arrives while the server is still binding is not lost. The API server
/// stops accepting connections and lets in-flight requests, including
/// running workers, finish.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let sigterm = signal(SignalKind::terminate())?;
    let sigint = signal(SignalKind::interrupt())?;

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(sigterm, sigint, token.clone()));
    Ok(token)
}

async fn cancel_on_signal(mut sigterm: Signal, mut sigint: Signal, token: CancellationToken) {
    let received = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
        // Cancelled elsewhere; nothing left to wait for.
        _ = token.cancelled() => return,
    };
    tracing::info!(signal = received, "Shutting down API server");
    token.cancel();
}
