use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Level picked from an explicit name, falling back to the `-v` count.
///
/// Unrecognised names resolve to `INFO`, as does a count of zero.
pub fn select_level(verbose: u8, log_level: Option<&str>) -> Level {
    match log_level.map(str::to_ascii_uppercase) {
        Some(lvl) => match lvl.as_str() {
            "TRACE" => Level::TRACE,
            "DEBUG" => Level::DEBUG,
            "WARN" => Level::WARN,
            "ERROR" => Level::ERROR,
            _ => Level::INFO,
        },
        None => match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        },
    }
}

/// Install the global subscriber for a bridge binary.
///
/// Output goes to stderr so stdout carries only command results. `RUST_LOG`
/// overrides the selected level when set.
pub fn init_tracing(verbose: u8, log_level: Option<&str>) -> anyhow::Result<()> {
    let level = select_level(verbose, log_level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_wins_over_verbosity() {
        assert_eq!(select_level(2, Some("warn")), Level::WARN);
        assert_eq!(select_level(0, Some("Debug")), Level::DEBUG);
        assert_eq!(select_level(3, Some("loud")), Level::INFO);
    }

    #[test]
    fn verbosity_steps_up_from_info() {
        assert_eq!(select_level(0, None), Level::INFO);
        assert_eq!(select_level(1, None), Level::DEBUG);
        assert_eq!(select_level(5, None), Level::TRACE);
    }
}
