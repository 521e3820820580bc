use std::fmt::Display;

use crate::geo::index::BoundaryIndex;
use crate::geo::io_common::*;
use crate::geo::io_csv::read_csv_bytes;
use crate::geo::io_excel::read_excel_bytes;
use crate::geo::*;

use asgs_correspondence::{BoundaryRequest, DataFetcher, GeoErrors, GeoResult, Table, TableSource};
use log::{debug, info};
use reqwest::blocking::Client;
use snafu::{whatever, ResultExt};

/// Fetches the tables from the web or from the local disk, following the
/// boundary index.
pub struct HttpFetcher {
    client: Client,
    index: BoundaryIndex,
}

fn unavailable(resource: &dyn Display, e: &GeoError) -> GeoErrors {
    GeoErrors::Unavailable {
        resource: resource.to_string(),
        message: error_chain(e),
    }
}

impl HttpFetcher {
    pub fn new(index: BoundaryIndex) -> BGeoResult<HttpFetcher> {
        let client = Client::builder()
            .user_agent(concat!("ausgeo/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(DownloadSnafu { url: "" })?;
        Ok(HttpFetcher { client, index })
    }

    pub fn index(&self) -> &BoundaryIndex {
        &self.index
    }

    /// Reads one file, opening zip archives on the way.
    pub fn load(&self, spec: &FileSpec) -> GeoRunResult<Table> {
        let mut bytes = read_bytes(&self.client, &spec.url)?;
        let mut name = simplify_file_name(&spec.url);
        let mut format = spec
            .format
            .unwrap_or_else(|| detect_format(&name, &bytes));
        if format == FileFormat::Zip {
            let (member, content) = zip_member(&bytes, spec.member.as_deref(), &spec.url)?;
            format = detect_format(&member, &content);
            name = member;
            bytes = content;
        }
        let resource = spec.to_string();
        debug!("load: {}: reading {} as {:?}", resource, name, format);
        let table = match format {
            FileFormat::Csv => read_csv_bytes(&bytes, spec.header_row, &resource)?,
            FileFormat::Xls | FileFormat::Xlsx => {
                read_excel_bytes(bytes, format, &spec.sheets, spec.header_row, &resource)?
            }
            FileFormat::Zip => whatever!("{} holds a zip archive inside a zip archive", resource),
        };
        info!(
            "load: {}: {} rows, {} columns",
            resource,
            table.len(),
            table.columns().len()
        );
        Ok(table)
    }
}

impl DataFetcher for HttpFetcher {
    fn fetch_boundary(&self, request: &BoundaryRequest) -> GeoResult<Table> {
        let entry = self
            .index
            .lookup(request)
            .ok_or_else(|| GeoErrors::Unavailable {
                resource: request.to_string(),
                message: "no entry in the boundary index".to_string(),
            })?;
        let spec = entry.file_spec().map_err(|e| unavailable(request, &e))?;
        info!("fetch_boundary: {} from {}", request, spec);
        self.load(&spec).map_err(|e| unavailable(request, &e))
    }

    fn fetch_table(&self, source: &TableSource) -> GeoResult<Table> {
        let spec = FileSpec::from(source);
        info!("fetch_table: {}", spec);
        self.load(&spec).map_err(|e| unavailable(source, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::io_excel::xlsx_of;
    use asgs_correspondence::{GeoLevel, Value};
    use serde_json::json;
    use std::fs;

    fn index_for(entries: serde_json::Value) -> BoundaryIndex {
        BoundaryIndex::parse(&json!({ "boundaries": entries }).to_string(), "test").unwrap()
    }

    #[test]
    fn boundaries_are_read_from_local_files() {
        let dir = std::env::temp_dir().join(format!("ausgeo-fetcher-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let csv_path = dir.join("SA1_2021_AUST.csv");
        fs::write(
            &csv_path,
            "SA1_CODE_2021,SA1_7DIGITCODE_2021\n10101100101,1100101\n",
        )
        .unwrap();
        let zip_path = dir.join("ced.zip");
        fs::write(
            &zip_path,
            zip_of(&[
                ("readme.txt", "Australian Bureau of Statistics"),
                ("CED_2021_AUST.csv", "MB_CODE_2021,CED_NAME_2021\n10000010000,Sydney\n"),
            ]),
        )
        .unwrap();
        let fetcher = HttpFetcher::new(index_for(json!([
            {"year": 2021, "level": "SA1", "type": "allocation",
             "url": csv_path.display().to_string()},
            {"year": 2021, "level": "CED", "type": "allocation",
             "url": format!("file://{}", zip_path.display())}
        ])))
        .unwrap();

        let sa1 = fetcher
            .fetch_boundary(&BoundaryRequest::allocation(2021, GeoLevel::Sa1))
            .unwrap();
        assert_eq!(sa1.columns(), &["SA1_CODE_2021", "SA1_7DIGITCODE_2021"]);
        assert_eq!(sa1.get(0, "SA1_7DIGITCODE_2021"), Some(&Value::text("1100101")));

        let ced = fetcher
            .fetch_boundary(&BoundaryRequest::allocation(2021, GeoLevel::Ced))
            .unwrap();
        assert_eq!(ced.get(0, "CED_NAME_2021"), Some(&Value::text("Sydney")));

        let source = TableSource {
            url: zip_path.display().to_string(),
            member: Some("CED_2021_AUST.csv".to_string()),
            sheet: None,
            header_row: 1,
        };
        assert_eq!(fetcher.fetch_table(&source).unwrap().len(), 1);
    }

    #[test]
    fn legacy_workbooks_are_read_across_sheets() {
        let dir = std::env::temp_dir().join(format!("ausgeo-workbook-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let workbook = xlsx_of(&[
            (
                "NSW",
                &[
                    &["Australian Bureau of Statistics", ""],
                    &["SA1_MAINCODE_2011", "CED_NAME_2011"],
                    &["10101100101", "Eden-Monaro"],
                ],
            ),
            (
                "VIC",
                &[
                    &["Australian Bureau of Statistics", ""],
                    &["SA1_MAINCODE_2011", "CED_NAME_2011"],
                    &["20101100101", "Ballarat"],
                    &["20101100102", "Ballarat"],
                ],
            ),
        ]);
        let zip_path = dir.join("CED_2011.zip");
        fs::write(
            &zip_path,
            zip_of(&[
                ("about.txt", "Australian Bureau of Statistics".as_bytes()),
                ("CED_2011_AUST.xlsx", workbook.as_slice()),
            ]),
        )
        .unwrap();
        let fetcher = HttpFetcher::new(index_for(json!([
            {"year": 2011, "level": "CED", "type": "allocation",
             "url": zip_path.display().to_string(),
             "member": "CED_2011_AUST.xlsx",
             "sheets": ["NSW", "VIC"],
             "headerRow": 2}
        ])))
        .unwrap();
        let ced = fetcher
            .fetch_boundary(&BoundaryRequest::allocation(2011, GeoLevel::Ced))
            .unwrap();
        assert_eq!(ced.columns(), &["SA1_MAINCODE_2011", "CED_NAME_2011"]);
        assert_eq!(ced.len(), 3);
        assert_eq!(ced.get(2, "CED_NAME_2011"), Some(&Value::text("Ballarat")));
        assert_eq!(
            ced.get(1, "SA1_MAINCODE_2011").and_then(|v| v.as_code()),
            Some("20101100101".to_string())
        );
    }

    #[test]
    fn failures_are_reported_as_unavailable() {
        let fetcher = HttpFetcher::new(index_for(json!([
            {"year": 2016, "level": "SA1", "type": "allocation",
             "url": "/nonexistent/SA1_2016_AUST.csv"}
        ])))
        .unwrap();
        match fetcher.fetch_boundary(&BoundaryRequest::allocation(2016, GeoLevel::Sa1)) {
            Err(GeoErrors::Unavailable { resource, message }) => {
                assert_eq!(resource, "SA1 2016 allocation");
                assert!(message.contains("/nonexistent/SA1_2016_AUST.csv"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match fetcher.fetch_boundary(&BoundaryRequest::allocation(2021, GeoLevel::Mb)) {
            Err(GeoErrors::Unavailable { resource, message }) => {
                assert_eq!(resource, "MB 2021 allocation");
                assert_eq!(message, "no entry in the boundary index");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
