use tracing::Level;

/// Initialize logging from the `LOG_LEVEL` environment variable.
///
/// Recognized values map to the standard severity tiers; an unrecognized
/// value falls back to the most verbose tier rather than failing, so a
/// typo in a deployment never silences the logs. Unset means `info`.
pub fn init() {
    let level = match std::env::var("LOG_LEVEL") {
        Ok(value) => value.parse::<Level>().unwrap_or(Level::TRACE),
        Err(_) => Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}
