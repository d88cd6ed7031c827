use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

/// Log destination shared by every writer the subscriber hands out. Records
/// always go to stderr; the file is attached once the CLI has been parsed.
#[derive(Clone, Default)]
struct LogSink {
    file: Arc<Mutex<Option<File>>>,
}

struct TeeWriter {
    file: Arc<Mutex<Option<File>>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogSink {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            file: self.file.clone(),
        }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = io::stderr().write(buf)?;
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                // A failing log file must not take stderr logging down with it.
                let _ = file.write_all(&buf[..written]);
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

static SINK: OnceLock<LogSink> = OnceLock::new();

/// Install the global subscriber. `log::` records are bridged into it, and
/// `RUST_LOG` overrides the default `info` filter.
pub fn init() {
    let _ = tracing_log::LogTracer::init();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let sink = SINK.get_or_init(LogSink::default).clone();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(sink)
        .try_init();
}

/// Append log output to `log_file` as well as stderr, or stop writing to a
/// file when `None`.
pub fn set_log_file(log_file: Option<&Path>) -> io::Result<()> {
    let sink = SINK.get_or_init(LogSink::default);
    let file = match log_file {
        Some(path) => Some(open_log_file(path)?),
        None => None,
    };
    let mut guard = sink
        .file
        .lock()
        .map_err(|_| io::Error::other("log sink lock poisoned"))?;
    *guard = file;
    Ok(())
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
