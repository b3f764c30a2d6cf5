use log::LevelFilter;

/// Initialise the global logger: timestamped lines to stderr.
/// Safe to call once; a second call reports the underlying error.
pub fn init(level: LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        // reqwest and tungstenite are chatty at debug
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("tungstenite", LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}
