//! コンソールとファイルへのログ出力
//!
//! 各行は標準出力に出し、ファイルを開けていれば `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.log` にも追記する。

use anyhow::Result;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

type LogFile = Arc<Mutex<BufWriter<fs::File>>>;

#[derive(Clone, Default)]
pub struct Logger {
    file: Option<LogFile>,
}

impl Logger {
    /// コンソールのみ（テスト用、ログディレクトリに書けないとき）
    pub fn console() -> Self {
        Self { file: None }
    }

    pub fn open<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.as_ref().join(format!("{}_{}.log", prefix, ts));
        let file = fs::File::create(&path)?;
        eprintln!("Log: {}", path.display());
        Ok(Self {
            file: Some(Arc::new(Mutex::new(BufWriter::new(file)))),
        })
    }

    pub fn line(&self, msg: &str) {
        println!("{}", msg);
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{}", msg);
            }
        }
    }

    pub fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

#[macro_export]
macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {{
        $logger.line(&format!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sink_receives_lines() {
        let dir = std::env::temp_dir().join(format!("rehab_avatar_log_{}", std::process::id()));
        let logger = Logger::open(&dir, "test").unwrap();
        crate::log!(logger, "hello {}", 42);
        logger.flush();

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
        let content = fs::read_to_string(entries[0].path()).unwrap();
        assert_eq!(content, "hello 42\n");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_console_logger_has_no_file() {
        let logger = Logger::console();
        crate::log!(logger, "console only");
        assert!(logger.file.is_none());
    }
}
