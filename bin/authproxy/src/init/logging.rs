//! Process logger initialisation from the logging configuration.
use std::io::Write;
use std::sync::Mutex;

use slog::Drain;
use slog::IgnoreResult;
use slog::Level;
use slog::LevelFilter;
use slog::Logger;
use slog::Never;
use slog::SendSyncRefUnwindSafeDrain;
use slog::SendSyncUnwindSafeDrain;
use slog_async::Async;
use slog_json::Json;

use authproxy_conf::LogLevel;
use authproxy_conf::LoggingConf;

/// Map the configured level onto the [`slog`] level.
pub fn level(level: LogLevel) -> Level {
    match level {
        LogLevel::Critical => Level::Critical,
        LogLevel::Error => Level::Error,
        LogLevel::Warning => Level::Warning,
        LogLevel::Info => Level::Info,
        LogLevel::Debug => Level::Debug,
        LogLevel::Trace => Level::Trace,
    }
}

/// Creates the process [`Logger`] emitting JSON lines to standard output.
pub fn configure(conf: &LoggingConf) -> Logger {
    configure_with_writer(conf, std::io::stdout())
}

/// Creates a [`Logger`] emitting JSON lines to the given writer.
pub fn configure_with_writer<W>(conf: &LoggingConf, writer: W) -> Logger
where
    W: Write + Send + 'static,
{
    let drain = Json::new(writer).add_default_keys().build();
    let drain = Mutex::new(drain).map(IgnoreResult::new);
    let drain = LevelFilter::new(drain, level(conf.level)).map(IgnoreResult::new);
    if conf.async_drain {
        into_logger(Async::new(drain).build().ignore_res())
    } else {
        into_logger(drain)
    }
}

/// Converts a [`Drain`] into a [`Logger`] setting global tags.
fn into_logger<D>(drain: D) -> Logger
where
    D: SendSyncUnwindSafeDrain<Ok = (), Err = Never>,
    D: 'static + SendSyncRefUnwindSafeDrain<Err = Never, Ok = ()>,
{
    Logger::root(drain, slog::o!("version" => env!("CARGO_PKG_VERSION")))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::Mutex;

    use authproxy_conf::LogLevel;
    use authproxy_conf::LoggingConf;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn lines(buffer: &Buffer) -> Vec<serde_json::Value> {
        let data = buffer.0.lock().unwrap().clone();
        String::from_utf8(data)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn filters_by_level() {
        let buffer = Buffer::default();
        let conf = LoggingConf {
            async_drain: false,
            level: LogLevel::Warning,
        };
        let logger = super::configure_with_writer(&conf, buffer.clone());
        slog::info!(logger, "dropped");
        slog::warn!(logger, "kept"; "key" => "value");

        let lines = lines(&buffer);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["msg"], "kept");
        assert_eq!(lines[0]["key"], "value");
        assert_eq!(lines[0]["version"], env!("CARGO_PKG_VERSION"));
    }
}
