//! The boundary index: where each ABS allocation and correspondence file lives.

use crate::geo::io_common::{FileFormat, FileSpec};
use crate::geo::*;

use asgs_correspondence::{BoundaryRequest, FileType, GeoLevel};
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::{whatever, ResultExt};
use std::collections::HashSet;
use std::fs;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub year: u16,
    pub level: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub url: String,
    pub member: Option<String>,
    pub sheets: Option<Vec<String>>,
    #[serde(rename = "headerRow")]
    pub header_row: Option<usize>,
    pub format: Option<String>,
}

impl IndexEntry {
    fn request(&self) -> GeoRunResult<BoundaryRequest> {
        let level = match GeoLevel::parse(&self.level) {
            Some(l) => l,
            None => whatever!("unknown level {:?} for {}", self.level, self.url),
        };
        let file_type = match FileType::parse(&self.file_type) {
            Some(t) => t,
            None => whatever!("unknown file type {:?} for {}", self.file_type, self.url),
        };
        Ok(BoundaryRequest {
            year: self.year,
            level,
            file_type,
        })
    }

    pub fn file_spec(&self) -> GeoRunResult<FileSpec> {
        let format = match &self.format {
            None => None,
            Some(f) => match FileFormat::parse(f) {
                Some(ff) => Some(ff),
                None => whatever!("unknown format {:?} for {}", f, self.url),
            },
        };
        let header_row = self.header_row.unwrap_or(1);
        if header_row == 0 {
            whatever!("headerRow starts at 1 for {}", self.url)
        }
        Ok(FileSpec {
            url: self.url.clone(),
            member: self.member.clone(),
            sheets: self.sheets.clone().unwrap_or_default(),
            header_row,
            format,
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryIndex {
    pub boundaries: Vec<IndexEntry>,
}

impl BoundaryIndex {
    pub fn builtin() -> BGeoResult<BoundaryIndex> {
        BoundaryIndex::parse(
            include_str!("../../resources/boundary_index.json"),
            "built-in boundary index",
        )
    }

    pub fn from_path(path: &str) -> BGeoResult<BoundaryIndex> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
        BoundaryIndex::parse(&contents, path)
    }

    pub fn parse(contents: &str, origin: &str) -> BGeoResult<BoundaryIndex> {
        let index: BoundaryIndex =
            serde_json::from_str(contents).context(ParsingJsonSnafu { path: origin })?;
        index.validate()?;
        debug!(
            "BoundaryIndex: {} entries from {}",
            index.boundaries.len(),
            origin
        );
        Ok(index)
    }

    /// Every entry must name a known level, type and format, and be unique.
    pub fn validate(&self) -> GeoRunResult<()> {
        let mut seen: HashSet<BoundaryRequest> = HashSet::new();
        for e in self.boundaries.iter() {
            let req = e.request()?;
            e.file_spec()?;
            if !seen.insert(req) {
                whatever!("{} is listed twice in the boundary index", req)
            }
        }
        Ok(())
    }

    pub fn lookup(&self, request: &BoundaryRequest) -> Option<&IndexEntry> {
        self.boundaries
            .iter()
            .find(|e| matches!(e.request(), Ok(r) if r == *request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asgs_correspondence::AllocationRoute;

    #[test]
    fn builtin_index_covers_every_configured_file() {
        let index = BoundaryIndex::builtin().unwrap();
        let config = asgs_correspondence::GeographyConfig::australia();
        for hop in config.hops.iter() {
            assert!(index.lookup(&hop.request).is_some(), "{}", hop.request);
        }
        for a in config.allocations.iter() {
            let mut requests = vec![
                BoundaryRequest::allocation(a.unit_year, a.unit.level()),
                BoundaryRequest::allocation(a.sa1_year, GeoLevel::Sa1),
            ];
            if let AllocationRoute::ViaMeshBlock { mb_year } = a.route {
                requests.push(BoundaryRequest::allocation(mb_year, GeoLevel::Mb));
            }
            for req in requests.iter() {
                assert!(index.lookup(req).is_some(), "{}", req);
            }
        }
    }

    #[test]
    fn entries_become_file_specs() {
        let index = BoundaryIndex::parse(
            r#"{"boundaries": [
                {"year": 2016, "level": "ced", "type": "Allocation",
                 "url": "https://example.org/CED_2016.zip", "member": "CED_2016_AUST.csv"},
                {"year": 2021, "level": "SA1", "type": "correspondence",
                 "url": "corr.xlsx", "sheets": ["Table 3"], "headerRow": 6, "format": "xlsx"}
            ]}"#,
            "test",
        )
        .unwrap();
        let ced = index
            .lookup(&BoundaryRequest::allocation(2016, GeoLevel::Ced))
            .unwrap();
        let spec = ced.file_spec().unwrap();
        assert_eq!(spec.member.as_deref(), Some("CED_2016_AUST.csv"));
        assert_eq!(spec.header_row, 1);
        assert_eq!(spec.format, None);

        let corr = index
            .lookup(&BoundaryRequest::correspondence(2021, GeoLevel::Sa1))
            .unwrap()
            .file_spec()
            .unwrap();
        assert_eq!(corr.sheets, vec!["Table 3".to_string()]);
        assert_eq!(corr.header_row, 6);
        assert_eq!(corr.format, Some(FileFormat::Xlsx));

        assert!(index
            .lookup(&BoundaryRequest::allocation(2011, GeoLevel::Poa))
            .is_none());
    }

    #[test]
    fn invalid_indexes_are_rejected() {
        let bad_level = r#"{"boundaries": [{"year": 2016, "level": "SA9", "type": "allocation", "url": "x"}]}"#;
        assert!(BoundaryIndex::parse(bad_level, "test").is_err());
        let bad_format = r#"{"boundaries": [{"year": 2016, "level": "SA1", "type": "allocation", "url": "x", "format": "pdf"}]}"#;
        assert!(BoundaryIndex::parse(bad_format, "test").is_err());
        let twice = r#"{"boundaries": [
            {"year": 2016, "level": "SA1", "type": "allocation", "url": "x"},
            {"year": 2016, "level": "SA1", "type": "allocation", "url": "y"}
        ]}"#;
        assert!(BoundaryIndex::parse(twice, "test").is_err());
        let zero = r#"{"boundaries": [{"year": 2016, "level": "SA1", "type": "allocation", "url": "x", "headerRow": 0}]}"#;
        assert!(BoundaryIndex::parse(zero, "test").is_err());
        assert!(BoundaryIndex::parse("[]", "test").is_err());
        assert!(BoundaryIndex::from_path("/nonexistent/index.json").is_err());
    }
}
