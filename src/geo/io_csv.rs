// Primitives for reading and writing CSV files.

use crate::geo::io_common::is_note_row;
use crate::geo::*;

use asgs_correspondence::{Table, Value};
use log::debug;
use snafu::{OptionExt, ResultExt};

fn cell_value(s: &str) -> Value {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Value::Null
    } else {
        Value::text(trimmed)
    }
}

/// Reads a CSV file whose column names are on the 1-based `header_row`.
/// Blank lines are not counted.
///
/// All the cells are read as text. Rows shorter than the header are padded
/// with nulls and longer rows are truncated.
pub fn read_csv_bytes(bytes: &[u8], header_row: usize, resource: &str) -> GeoRunResult<Table> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut records = rdr.into_records();
    // The index starts at 1 to respect most conventions in the excel world
    for _ in 1..header_row {
        _ = records.next();
    }
    let header = records
        .next()
        .context(EmptyFileSnafu { resource })?
        .context(CsvParseSnafu { resource })?;
    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let name = c.trim_start_matches('\u{feff}').trim();
            if name.is_empty() {
                format!("column_{}", i + 1)
            } else {
                name.to_string()
            }
        })
        .collect();
    let width = columns.len();
    debug!("read_csv_bytes: {}: columns {:?}", resource, columns);

    let mut table = Table::new(columns);
    let mut skipped = 0;
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + header_row + 1;
        let line = line_r.context(CsvParseSnafu { resource })?;
        let mut row: Vec<Value> = line.iter().take(width).map(cell_value).collect();
        row.resize(width, Value::Null);
        if is_note_row(&row) {
            debug!("read_csv_bytes: {}: skipping line {}: {:?}", resource, lineno, line);
            skipped += 1;
            continue;
        }
        table.push_row(row).context(CorrespondenceSnafu {})?;
    }
    debug!(
        "read_csv_bytes: {}: {} rows, {} skipped",
        resource,
        table.len(),
        skipped
    );
    Ok(table)
}

pub fn write_csv<W: std::io::Write>(table: &Table, w: W) -> GeoRunResult<()> {
    let mut wtr = csv::Writer::from_writer(w);
    wtr.write_record(table.columns()).context(CsvWriteSnafu {})?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(|v| v.to_string()))
            .context(CsvWriteSnafu {})?;
    }
    wtr.flush().context(WritingOutputSnafu { path: "CSV output" })?;
    Ok(())
}

pub fn table_to_csv_string(table: &Table) -> GeoRunResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    write_csv(table, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
