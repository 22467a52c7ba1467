use std::sync::Once;

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // The host engine forwards stderr to its own console.
        eprintln!("[{}] display: {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;
static INIT: Once = Once::new();

/// Installs the console logger. A logger already set by the host wins.
pub fn init_logger() {
    INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            let level = if cfg!(feature = "verbose_logs") {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            };
            log::set_max_level(level);
        }
    });
}
