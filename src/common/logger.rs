use std::{
  fs::{self, File, OpenOptions},
  io::{self, BufRead, BufReader, Write},
  path::{Path, PathBuf},
  sync::Arc,
};

use parking_lot::Mutex;
use tracing_subscriber::{EnvFilter, fmt::{self, time::LocalTime}, prelude::*};

use crate::configs::LoggingConfig;

/// Builds the `EnvFilter` directive from the configured level and extra filters.
pub fn filter_directive(logging: Option<&LoggingConfig>) -> String {
  let level = logging.and_then(|l| l.level.as_deref()).unwrap_or("info");
  match logging.and_then(|l| l.filters.as_deref()) {
    Some(filters) if !filters.trim().is_empty() => format!("{},{}", level, filters.trim()),
    _ => level.to_string(),
  }
}

pub fn init(logging: Option<&LoggingConfig>) {
  // RUST_LOG wins over the configuration
  let env_filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new(filter_directive(logging)));

  let stdout_layer = fmt::layer()
    .with_timer(LocalTime::rfc_3339())
    .with_target(true)
    .with_line_number(true)
    .with_file(false);

  let file_layer = logging.and_then(|l| l.file.as_ref()).map(|file_config| {
    if let Some(parent) = Path::new(&file_config.path).parent() {
      if let Err(e) = fs::create_dir_all(parent) {
        eprintln!("Failed to create log directory: {}", e);
      }
    }

    fmt::layer()
      .with_writer(RollingLineWriter::new(&file_config.path, file_config.max_lines))
      .with_timer(LocalTime::rfc_3339())
      .with_target(true)
      .with_line_number(true)
      .with_file(false)
      .with_ansi(false)
  });

  tracing_subscriber::registry()
    .with(env_filter)
    .with(stdout_layer)
    .with(file_layer)
    .init();
}

/// Appends to a file and trims the oldest lines once it grows past `max_lines`.
#[derive(Clone)]
pub struct RollingLineWriter {
  path: PathBuf,
  max_lines: usize,
  written_since_trim: Arc<Mutex<usize>>,
}

impl RollingLineWriter {
  pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
    Self {
      path: path.into(),
      max_lines: max_lines.max(1),
      written_since_trim: Arc::new(Mutex::new(0)),
    }
  }

  fn trim(&self) -> io::Result<()> {
    if !self.path.exists() {
      return Ok(());
    }

    let lines: Vec<String> = BufReader::new(File::open(&self.path)?)
      .lines()
      .collect::<Result<_, _>>()?;

    if lines.len() > self.max_lines {
      let mut file = File::create(&self.path)?;
      for line in &lines[lines.len() - self.max_lines..] {
        writeln!(file, "{}", line)?;
      }
    }
    Ok(())
  }
}

impl io::Write for RollingLineWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let mut written = self.written_since_trim.lock();

    OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?
      .write_all(buf)?;

    *written += buf.iter().filter(|&&b| b == b'\n').count();

    // Trimming rewrites the file, so only do it every tenth of the cap.
    if *written >= (self.max_lines / 10).max(50) {
      if let Err(e) = self.trim() {
        eprintln!("Failed to trim log file: {}", e);
      }
      *written = 0;
    }

    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl<'a> fmt::MakeWriter<'a> for RollingLineWriter {
  type Writer = Self;

  fn make_writer(&'a self) -> Self::Writer {
    self.clone()
  }
}
