//! Logging initialization

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable.
///
/// # Example
/// ```
/// tilestream::core::logging::init();
/// log::info!("Streaming started");
/// ```
pub fn init() {
    // A logger may already be installed by the host application
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();
}
