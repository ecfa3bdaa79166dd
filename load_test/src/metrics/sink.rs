//! Push interface for outcome consumers

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::outcome::Outcome;

/// Receives every outcome as the aggregator records it.
///
/// Called on the worker's task, so implementations should not block for
/// long.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: &Outcome);

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes one JSON object per outcome to a file
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl OutcomeSink for JsonLinesSink {
    fn record(&self, outcome: &Outcome) {
        let mut writer = self.writer.lock();
        let written = serde_json::to_writer(&mut *writer, outcome)
            .map_err(io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = written {
            tracing::warn!("Failed to write outcome {}: {}", outcome.key(), e);
        }
    }

    fn flush(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }
}
