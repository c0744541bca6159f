/// Waits for a termination request. Detached processes on Windows can't see
/// console signals, so there the cli `stop` command terminating the process
/// is the practical path; this serves unix daemons and development runs.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::select;
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).expect("Can't install SIGTERM handler");
        select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        };
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
