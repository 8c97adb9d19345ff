use env_logger::{Builder, Env};
use log::{info, Level};
use std::io::Write;

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1B[1;31m", // Bold Red
        Level::Warn => "\x1B[1;33m",  // Bold Yellow
        Level::Info => "\x1B[1;32m",  // Bold Green
        Level::Debug => "\x1B[1;36m", // Bold Cyan
        Level::Trace => "\x1B[1;35m", // Bold Magenta
    }
}

/// Colored logger. Defaults to `info`; `RUST_LOG` overrides it.
pub fn setup_logger() {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] {}{:<5}\x1B[0m [{}:{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            level_color(record.level()),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    });

    // A second call (tests, embedding) keeps the first logger.
    if builder.try_init().is_ok() {
        info!("Logger initialized");
    }
}

/// Quiet logger for tests.
pub fn setup_test_logger() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_level_has_a_color() {
        for level in [Level::Error, Level::Warn, Level::Info, Level::Debug, Level::Trace] {
            assert!(level_color(level).starts_with("\x1B[1;"));
        }
    }

    #[test]
    fn repeated_setup_does_not_panic() {
        setup_test_logger();
        setup_logger();
        setup_logger();
    }
}
