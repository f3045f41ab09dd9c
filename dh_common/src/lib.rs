pub mod nbt;
pub mod util;

use log::LevelFilter;
use std::io;

/// Initializes logger. Might do more things in the future.
pub fn init(name: &str) { init_with_level(name, LevelFilter::Info) }

pub fn init_with_level(_name: &str, level: LevelFilter) {
  init_with_level_writer(_name, level, io::stdout());
}

pub fn init_with_level_writer<W: io::Write + Send + Sync + 'static>(
  _name: &str,
  level: LevelFilter,
  writer: W,
) {
  use log::{Level, Metadata, Record};
  use parking_lot::Mutex;

  #[cfg(unix)]
  let isatty = unsafe { libc::isatty(libc::STDOUT_FILENO) } != 0;
  #[cfg(not(unix))]
  let isatty = false;

  struct Logger<W> {
    writer: Mutex<W>,
    color:  bool,
  }

  impl<W: io::Write> Logger<W> {
    fn log_inner(&self, record: &Record) -> io::Result<()> {
      let now = chrono::Local::now();

      let mut w = self.writer.lock();
      write!(w, "{} ", now.format("%Y-%m-%d %H:%M:%S%.3f"))?;
      #[cfg(debug_assertions)]
      {
        if let Some(path) = record.module_path() {
          write!(w, "{path}")?;
        }
        if let Some(line) = record.line() {
          write!(w, ":{line}")?;
        }
        write!(w, " ")?;
      }
      if self.color {
        match record.level() {
          Level::Trace => write!(w, "[\x1b[36mTRACE\x1b[0m]")?,
          Level::Debug => write!(w, "[\x1b[34mDEBUG\x1b[0m]")?,
          Level::Info => write!(w, "[\x1b[32mINFO\x1b[0m]")?,
          Level::Warn => write!(w, "[\x1b[33mWARN\x1b[0m]")?,
          Level::Error => write!(w, "[\x1b[31m\x1b[1mERROR\x1b[0m]")?,
        }
      } else {
        match record.level() {
          Level::Trace => write!(w, "[TRACE]")?,
          Level::Debug => write!(w, "[DEBUG]")?,
          Level::Info => write!(w, "[INFO]")?,
          Level::Warn => write!(w, "[WARN]")?,
          Level::Error => write!(w, "[ERROR]")?,
        }
      }
      writeln!(w, " {}", record.args())?;
      Ok(())
    }
  }

  impl<W: io::Write + Send + Sync> log::Log for Logger<W> {
    fn enabled(&self, _metadata: &Metadata) -> bool { true }

    fn log(&self, record: &Record) {
      if self.enabled(record.metadata()) {
        let _ = self.log_inner(record);
      }
    }

    fn flush(&self) {}
  }

  if log::set_boxed_logger(Box::new(Logger { writer: Mutex::new(writer), color: isatty }))
    .map(|()| log::set_max_level(level))
    .is_err()
  {
    eprintln!("logger was already initialized");
  }
}
