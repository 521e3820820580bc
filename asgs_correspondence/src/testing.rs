// In-memory fetcher and fixtures shared by the unit tests.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::config::*;
use crate::table::{Table, Value};
use crate::DataFetcher;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A table of text cells. Empty strings become nulls.
pub fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
    let rows = rows
        .iter()
        .map(|r| {
            r.iter()
                .map(|c| if c.is_empty() { Value::Null } else { Value::text(*c) })
                .collect()
        })
        .collect();
    Table::from_rows(columns, rows).unwrap()
}

/// Serves canned tables and records every request it receives.
#[derive(Default)]
pub struct MockFetcher {
    boundaries: HashMap<BoundaryRequest, Table>,
    tables: HashMap<String, Table>,
    calls: RefCell<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> MockFetcher {
        MockFetcher::default()
    }

    pub fn boundary(mut self, request: BoundaryRequest, t: Table) -> MockFetcher {
        self.boundaries.insert(request, t);
        self
    }

    pub fn table(mut self, url: &str, t: Table) -> MockFetcher {
        self.tables.insert(url.to_string(), t);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl DataFetcher for MockFetcher {
    fn fetch_boundary(&self, request: &BoundaryRequest) -> GeoResult<Table> {
        self.calls.borrow_mut().push(request.to_string());
        self.boundaries
            .get(request)
            .cloned()
            .ok_or_else(|| GeoErrors::Unavailable {
                resource: request.to_string(),
                message: "no such mock file".to_string(),
            })
    }

    fn fetch_table(&self, source: &TableSource) -> GeoResult<Table> {
        self.calls.borrow_mut().push(source.to_string());
        self.tables
            .get(&source.url)
            .cloned()
            .ok_or_else(|| GeoErrors::Unavailable {
                resource: source.to_string(),
                message: "no such mock file".to_string(),
            })
    }
}
