use std::sync::Once;
use std::time::SystemTime;

use log::{Level, LevelFilter};
use nu_ansi_term::ansi::RESET;
use nu_ansi_term::{Color, Style};

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let time = humantime::format_rfc3339_nanos(SystemTime::now());
        let dim = Style::new().dimmed().prefix();

        eprintln!(
            "{dim}{time}{RESET} {}{:5}{RESET} {}{}{RESET}{dim}:{RESET} {}",
            match record.level() {
                Level::Trace => Color::Purple,
                Level::Debug => Color::Blue,
                Level::Info => Color::Green,
                Level::Warn => Color::Yellow,
                Level::Error => Color::Red,
            }
            .bold()
            .prefix(),
            record.level(),
            Style::new().bold().prefix(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

static INIT: Once = Once::new();

/// Installs the crate's logger at `level`. Idempotent: only the first call in
/// a process actually installs anything, so binaries and tests can call it
/// freely without tripping over `log`'s one-shot global logger.
pub fn init_logger(level: LevelFilter) {
    INIT.call_once(|| {
        log::set_boxed_logger(Box::new(Logger))
            .map(|()| log::set_max_level(level))
            .expect("logger already installed");
    });
}
