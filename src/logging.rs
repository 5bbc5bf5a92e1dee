use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "LABCAT_LOG";

const LOG_FILE: &str = "labcat.log";

fn filter(verbose: bool) -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
    if verbose {
      EnvFilter::new("labcat=debug,info")
    } else {
      EnvFilter::new("labcat=info")
    }
  })
}

/// `$XDG_DATA_HOME/labcat`, where the log file is written.
pub fn default_log_dir() -> Option<PathBuf> {
  dirs::data_dir().map(|d| d.join("labcat"))
}

/// Install the global subscriber: compact stderr output plus, when `log_dir`
/// is given, a plain-text file in that directory.
///
/// Keep the returned guard alive until exit so buffered file output is
/// flushed. Calling this twice leaves the first subscriber in place.
pub fn init_cli_logger(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let (file_layer, guard) = match log_dir {
    Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
      let appender = tracing_appender::rolling::never(dir, LOG_FILE);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter(true));
      (Some(layer), Some(guard))
    }
    _ => (None, None),
  };

  let stderr_layer = tracing_subscriber::fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false)
    .with_thread_ids(false)
    .with_file(false)
    .with_line_number(false)
    .compact()
    .with_filter(filter(verbose));

  let _ = tracing_subscriber::registry()
    .with(file_layer)
    .with(stderr_layer)
    .try_init();

  guard
}
