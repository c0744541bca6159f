use anyhow::Result;

/// The daemon samples once a second and spends the rest of the time asleep,
/// so a single-threaded runtime is all it needs.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
