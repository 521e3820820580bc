use std::io::Cursor;

use calamine::{DataType, Range, Reader, Xls, Xlsx};

use crate::geo::io_common::{is_note_row, FileFormat};
use crate::geo::*;

use asgs_correspondence::{Table, Value};
use log::debug;
use snafu::{whatever, OptionExt, ResultExt};

fn cell_value(cell: &DataType) -> Value {
    match cell {
        DataType::Empty => Value::Null,
        DataType::String(s) if s.trim().is_empty() => Value::Null,
        DataType::String(s) => Value::text(s.trim()),
        DataType::Float(f) => Value::Number(*f),
        DataType::Int(i) => Value::Number(*i as f64),
        DataType::Bool(b) => Value::text(b.to_string()),
        DataType::DateTime(f) => Value::Number(*f),
        _ => Value::Null,
    }
}

fn header_name(idx: usize, cell: &DataType) -> String {
    match cell_value(cell).as_code() {
        Some(s) => s,
        None => format!("column_{}", idx + 1),
    }
}

/// Converts a worksheet into a table, the column names being on the 1-based
/// `header_row` of the sheet.
pub fn range_to_table(
    range: &Range<DataType>,
    header_row: usize,
    resource: &str,
) -> GeoRunResult<Table> {
    // A range starts at its first non-empty cell, not at the top of the sheet.
    let first_row = range.start().map(|(r, _)| r as usize).unwrap_or(0);
    let skip = header_row.saturating_sub(1).saturating_sub(first_row);
    let mut rows = range.rows().skip(skip);
    let header = rows.next().context(EmptyFileSnafu { resource })?;
    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, c)| header_name(i, c))
        .collect();
    debug!("range_to_table: {}: columns {:?}", resource, columns);
    let mut table = Table::new(columns);
    for row in rows {
        let values: Vec<Value> = row.iter().map(cell_value).collect();
        if is_note_row(&values) {
            continue;
        }
        table.push_row(values).context(CorrespondenceSnafu {})?;
    }
    Ok(table)
}

/// Stacks tables read from several sheets, keeping the columns of the first
/// table that every other table also has.
pub fn align_and_concat(tables: Vec<Table>, resource: &str) -> GeoRunResult<Table> {
    let mut iter = tables.into_iter();
    let first = iter.next().context(EmptyFileSnafu { resource })?;
    let rest: Vec<Table> = iter.collect();
    let common: Vec<String> = first
        .columns()
        .iter()
        .filter(|c| rest.iter().all(|t| t.has_column(c)))
        .cloned()
        .collect();
    if common.is_empty() {
        whatever!("The worksheets of {} have no column in common", resource)
    }
    if common.len() < first.columns().len() {
        debug!(
            "align_and_concat: {}: keeping the common columns {:?}",
            resource, common
        );
    }
    let names: Vec<&str> = common.iter().map(|c| c.as_str()).collect();
    let mut out = first.select(&names).context(CorrespondenceSnafu {})?;
    for t in rest {
        let aligned = t.select(&names).context(CorrespondenceSnafu {})?;
        out.append(aligned).context(CorrespondenceSnafu {})?;
    }
    Ok(out)
}

fn collect_ranges<E>(
    available: &[String],
    wanted: &[String],
    resource: &str,
    mut get: impl FnMut(&str) -> Option<Result<Range<DataType>, E>>,
) -> GeoRunResult<Vec<(String, Range<DataType>)>>
where
    calamine::Error: From<E>,
{
    let names: Vec<String> = if wanted.is_empty() {
        available.iter().take(1).cloned().collect()
    } else {
        wanted.to_vec()
    };
    debug!(
        "collect_ranges: {}: reading {:?} out of {:?}",
        resource, names, available
    );
    let mut res = Vec::new();
    for name in names {
        let range = get(name.as_str())
            .context(MissingSheetSnafu {
                sheet: name.as_str(),
                resource,
            })?
            .map_err(calamine::Error::from)
            .context(OpeningExcelSnafu { resource })?;
        res.push((name, range));
    }
    Ok(res)
}

/// Reads the given worksheets of an Excel file (the first one when none is
/// given) into a single table.
pub fn read_excel_bytes(
    bytes: Vec<u8>,
    format: FileFormat,
    sheets: &[String],
    header_row: usize,
    resource: &str,
) -> GeoRunResult<Table> {
    let ranges = match format {
        FileFormat::Xlsx => {
            let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
                .map_err(calamine::Error::from)
                .context(OpeningExcelSnafu { resource })?;
            let available = workbook.sheet_names().to_vec();
            collect_ranges(&available, sheets, resource, |name| {
                workbook.worksheet_range(name)
            })?
        }
        FileFormat::Xls => {
            let mut workbook: Xls<_> = Xls::new(Cursor::new(bytes))
                .map_err(calamine::Error::from)
                .context(OpeningExcelSnafu { resource })?;
            let available = workbook.sheet_names().to_vec();
            collect_ranges(&available, sheets, resource, |name| {
                workbook.worksheet_range(name)
            })?
        }
        other => whatever!("{} is not an Excel file ({:?})", resource, other),
    };
    let mut tables = Vec::new();
    for (name, range) in ranges.iter() {
        tables.push(range_to_table(
            range,
            header_row,
            &format!("{} <{}>", resource, name),
        )?);
    }
    align_and_concat(tables, resource)
}

/// A minimal xlsx workbook. Cells that parse as numbers are stored as
/// numbers, empty cells are left out.
#[cfg(test)]
pub(crate) fn xlsx_of(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
    use crate::geo::io_common::zip_of;

    const MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
    const RELS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
    let escape = |s: &str| {
        s.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    };

    let mut strings: Vec<String> = Vec::new();
    let mut files: Vec<(String, String)> = Vec::new();
    let mut entries = String::new();
    let mut rels = String::new();
    for (i, (name, rows)) in sheets.iter().enumerate() {
        let mut data = String::new();
        for (r, row) in rows.iter().enumerate() {
            data.push_str(&format!("<row r=\"{}\">", r + 1));
            for (c, cell) in row.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                let pos = format!("{}{}", (b'A' + c as u8) as char, r + 1);
                if cell.parse::<f64>().is_ok() {
                    data.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", pos, cell));
                } else {
                    data.push_str(&format!(
                        "<c r=\"{}\" t=\"s\"><v>{}</v></c>",
                        pos,
                        strings.len()
                    ));
                    strings.push(escape(cell));
                }
            }
            data.push_str("</row>");
        }
        files.push((
            format!("xl/worksheets/sheet{}.xml", i + 1),
            format!(
                "<worksheet xmlns=\"{}\"><sheetData>{}</sheetData></worksheet>",
                MAIN, data
            ),
        ));
        entries.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
            escape(name),
            i + 1,
            i + 1
        ));
        rels.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"{}/worksheet\" Target=\"worksheets/sheet{}.xml\"/>",
            i + 1,
            RELS,
            i + 1
        ));
    }
    let shared: String = strings
        .iter()
        .map(|s| format!("<si><t>{}</t></si>", s))
        .collect();
    files.push((
        "[Content_Types].xml".to_string(),
        "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\"><Default Extension=\"xml\" ContentType=\"application/xml\"/></Types>".to_string(),
    ));
    files.push((
        "xl/workbook.xml".to_string(),
        format!(
            "<workbook xmlns=\"{}\" xmlns:r=\"{}\"><sheets>{}</sheets></workbook>",
            MAIN, RELS, entries
        ),
    ));
    files.push((
        "xl/_rels/workbook.xml.rels".to_string(),
        format!(
            "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">{}</Relationships>",
            rels
        ),
    ));
    files.push((
        "xl/sharedStrings.xml".to_string(),
        format!(
            "<sst xmlns=\"{}\" count=\"{}\" uniqueCount=\"{}\">{}</sst>",
            MAIN,
            strings.len(),
            strings.len(),
            shared
        ),
    ));
    let files: Vec<(&str, &str)> = files
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_str()))
        .collect();
    zip_of(&files)
}
