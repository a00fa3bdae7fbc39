use tracing_subscriber::EnvFilter;

/// Output format of the session log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `directives`; without either, `info` is used.
/// Returns `false` if a subscriber was already installed.
pub fn init(format: LogFormat, directives: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_target(true)
        .with_line_number(true);

    match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        init(LogFormat::Text, Some("tmsession=debug"));
        assert!(!init(LogFormat::Json, None));
    }
}
