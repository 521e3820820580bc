use crate::geo::*;

use asgs_correspondence::{TableSource, Value};
use log::{debug, info};
use snafu::{OptionExt, ResultExt};
use std::fmt::Display;
use std::fs;
use std::io::{Cursor, Read};

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum FileFormat {
    Csv,
    Xls,
    Xlsx,
    Zip,
}

impl FileFormat {
    pub fn parse(s: &str) -> Option<FileFormat> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "xls" => Some(FileFormat::Xls),
            "xlsx" => Some(FileFormat::Xlsx),
            "zip" => Some(FileFormat::Zip),
            _ => None,
        }
    }
}

/// Everything needed to turn a location into a table.
#[derive(PartialEq, Debug, Clone)]
pub struct FileSpec {
    pub url: String,
    /// File to read inside a zip archive. The first tabular file otherwise.
    pub member: Option<String>,
    /// Worksheets to read and concatenate. The first worksheet otherwise.
    pub sheets: Vec<String>,
    /// 1-based
    pub header_row: usize,
    /// Detected from the name and the content when missing.
    pub format: Option<FileFormat>,
}

impl From<&TableSource> for FileSpec {
    fn from(source: &TableSource) -> Self {
        FileSpec {
            url: source.url.clone(),
            member: source.member.clone(),
            sheets: source.sheet.iter().cloned().collect(),
            header_row: source.header_row,
            format: None,
        }
    }
}

impl Display for FileSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)?;
        if let Some(m) = &self.member {
            write!(f, " [{}]", m)?;
        }
        if !self.sheets.is_empty() {
            write!(f, " <{}>", self.sheets.join(", "))?;
        }
        Ok(())
    }
}

/// The last segment of a path or URL, without any query string.
pub fn simplify_file_name(path: &str) -> String {
    let no_query = path.split(['?', '#']).next().unwrap_or(path);
    let name = no_query.rsplit(['/', '\\']).next().unwrap_or(no_query);
    name.to_string()
}

fn is_tabular(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".csv") || lower.ends_with(".xls") || lower.ends_with(".xlsx")
}

fn is_xlsx_archive(bytes: &[u8]) -> bool {
    match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(mut archive) => {
            let found = archive.by_name("[Content_Types].xml").is_ok();
            found
        }
        Err(_) => false,
    }
}

/// Guesses the format from the extension, then from the first bytes.
pub fn detect_format(name: &str, bytes: &[u8]) -> FileFormat {
    let lower = name.to_lowercase();
    if lower.ends_with(".csv") {
        FileFormat::Csv
    } else if lower.ends_with(".xlsx") {
        FileFormat::Xlsx
    } else if lower.ends_with(".xls") {
        FileFormat::Xls
    } else if lower.ends_with(".zip") {
        FileFormat::Zip
    } else if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        FileFormat::Xls
    } else if bytes.starts_with(b"PK\x03\x04") {
        if is_xlsx_archive(bytes) {
            FileFormat::Xlsx
        } else {
            FileFormat::Zip
        }
    } else {
        FileFormat::Csv
    }
}

/// Blank rows, and the titles, footnotes and copyright lines of published
/// files: a single filled cell holding words in an otherwise empty row.
pub fn is_note_row(row: &[Value]) -> bool {
    let filled: Vec<String> = row.iter().filter_map(|v| v.as_code()).collect();
    match filled.as_slice() {
        [] => true,
        [only] => row.len() > 1 && only.contains(char::is_whitespace),
        _ => false,
    }
}

pub fn read_bytes(client: &reqwest::blocking::Client, url: &str) -> GeoRunResult<Vec<u8>> {
    if url.starts_with("http://") || url.starts_with("https://") {
        info!("Downloading {}", url);
        let response = client.get(url).send().context(DownloadSnafu { url })?;
        let response = response.error_for_status().context(DownloadSnafu { url })?;
        let bytes = response.bytes().context(DownloadSnafu { url })?;
        debug!("read_bytes: {}: {} bytes", url, bytes.len());
        Ok(bytes.to_vec())
    } else {
        let path = url.strip_prefix("file://").unwrap_or(url);
        let bytes = fs::read(path).context(ReadingFileSnafu { path })?;
        debug!("read_bytes: {}: {} bytes", path, bytes.len());
        Ok(bytes)
    }
}

/// Extracts one file from a zip archive. Returns its name and content.
pub fn zip_member(
    bytes: &[u8],
    member: Option<&str>,
    resource: &str,
) -> GeoRunResult<(String, Vec<u8>)> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).context(ReadingZipSnafu { resource })?;
    let mut names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
    names.sort();
    let name = match member {
        Some(m) => {
            let suffix = format!("/{}", m);
            names
                .iter()
                .find(|n| n.as_str() == m || n.ends_with(&suffix))
                .cloned()
                .context(MissingZipMemberSnafu {
                    member: m,
                    resource,
                })?
        }
        None => names
            .iter()
            .find(|n| is_tabular(n))
            .cloned()
            .context(MissingZipMemberSnafu {
                member: "*.csv, *.xls or *.xlsx",
                resource,
            })?,
    };
    debug!("zip_member: {}: reading {} out of {:?}", resource, name, names);
    let mut file = archive
        .by_name(&name)
        .context(ReadingZipSnafu { resource })?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .context(ReadingFileSnafu { path: name.as_str() })?;
    Ok((name, content))
}

#[cfg(test)]
pub(crate) fn zip_of<C: AsRef<[u8]>>(files: &[(&str, C)]) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        for (name, content) in files.iter() {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(content.as_ref()).unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}
