use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::Serialize;

use crate::{
    RacecraftError,
    session::SessionReport,
    telemetry::{Session, loader::session_records},
};

fn write_json_lines<T: Serialize>(
    file: &Path,
    items: impl IntoIterator<Item = T>,
) -> Result<(), RacecraftError> {
    let output_file = File::create(file).map_err(|e| RacecraftError::WriterError { source: e })?;
    let mut output_writer = BufWriter::new(output_file);
    for item in items {
        let line = serde_json::to_string(&item)
            .map_err(|e| RacecraftError::ReportSerializeError { source: e })?;
        writeln!(output_writer, "{line}").map_err(|e| RacecraftError::WriterError { source: e })?;
    }
    output_writer
        .flush()
        .map_err(|e| RacecraftError::WriterError { source: e })?;
    Ok(())
}

/// Write sessions as a JSON lines session file readable by the loader.
pub fn write_sessions(file: &Path, sessions: &[Session]) -> Result<(), RacecraftError> {
    write_json_lines(file, sessions.iter().flat_map(session_records))
}

/// Write one JSON report per line.
pub fn write_reports(file: &Path, reports: &[SessionReport]) -> Result<(), RacecraftError> {
    write_json_lines(file, reports)
}
