use std::{
    fs::File,
    io::BufWriter,
    path::Path,
    sync::mpsc::Receiver,
};

use log::{debug, error};
use serde_jsonlines::JsonLinesWriter;

use crate::{BeelineError, alerts::AlertEvent};

/// Appends every alert received on `alert_receiver` to `file` as JSON lines
/// until all senders hang up.
///
/// Returns the number of alerts written. A line that fails to write is logged
/// and skipped.
pub fn write_alerts(
    file: &Path,
    alert_receiver: Receiver<AlertEvent>,
) -> Result<usize, BeelineError> {
    let alert_file = File::create(file).map_err(|e| BeelineError::WriterError { source: e })?;
    let mut writer = JsonLinesWriter::new(BufWriter::new(alert_file));

    let mut written = 0;
    for event in &alert_receiver {
        match writer.write(&event) {
            Ok(()) => written += 1,
            Err(e) => error!("Error while writing alert to {:?}: {}", file, e),
        }
    }
    writer
        .flush()
        .map_err(|e| BeelineError::WriterError { source: e })?;
    debug!("Wrote {} alerts to {:?}", written, file);
    Ok(written)
}
