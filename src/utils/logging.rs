use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Initialize the logger with custom formatting
///
/// Capture and detail work happens on named threads, so the thread name is
/// part of every line.
pub fn init_logger(level: LevelFilter) {
    Builder::new()
        .format(|buf, record| {
            let thread = std::thread::current();
            writeln!(
                buf,
                "{} [{}] ({}) - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                thread.name().unwrap_or("unnamed"),
                record.args()
            )
        })
        .filter(None, level)
        .init();
}

/// Get log level from string
pub fn get_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(get_log_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(get_log_level("verbose"), LevelFilter::Info);
    }
}
