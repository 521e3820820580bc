mod allocation;
mod audit;
mod cache;
mod config;
mod correspondence;
pub mod manual;
mod ratios;
mod redistribution;
mod results;
mod table;
#[cfg(test)]
mod testing;

use log::{debug, info};

pub use crate::allocation::sa1_7digit;
pub use crate::audit::{AuditEvent, AuditLog};
pub use crate::cache::{CacheKey, SessionCache};
pub use crate::config::*;
pub use crate::ratios::{chain, combine_ratios, verify_ratios};
pub use crate::table::{Table, Value};

/// Source of the raw tables.
///
/// Implementations only have to turn a request into a table. Caching,
/// verification and every transformation happen in the [`Session`].
pub trait DataFetcher {
    /// One ABS boundary file (allocation or correspondence).
    fn fetch_boundary(&self, request: &BoundaryRequest) -> GeoResult<Table>;

    /// Any other tabular file, such as an AEC redistribution spreadsheet.
    fn fetch_table(&self, source: &TableSource) -> GeoResult<Table>;
}

/// Holds everything that lives for the duration of a run: the fetcher, the
/// configuration, the cache of fetched and computed tables, and the audit
/// log.
pub struct Session<F: DataFetcher> {
    pub(crate) fetcher: F,
    pub(crate) config: GeographyConfig,
    pub(crate) cache: SessionCache,
    pub(crate) audit: AuditLog,
    pub(crate) tolerance: f64,
}

impl<F: DataFetcher> Session<F> {
    pub fn new(fetcher: F) -> Session<F> {
        Session::with_config(fetcher, GeographyConfig::australia())
    }

    pub fn with_config(fetcher: F, config: GeographyConfig) -> Session<F> {
        Session {
            fetcher,
            config,
            cache: SessionCache::new(),
            audit: AuditLog::new(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Sets how far a group of ratios may stray from 1.
    pub fn with_tolerance(mut self, tolerance: f64) -> Session<F> {
        self.tolerance = tolerance;
        self
    }

    pub fn config(&self) -> &GeographyConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Returns the audit log collected so far and starts a new one.
    pub fn take_audit(&mut self) -> AuditLog {
        std::mem::take(&mut self.audit)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub(crate) fn fetch_boundary(&mut self, request: &BoundaryRequest) -> GeoResult<Table> {
        let key = CacheKey::new("fetch_boundary", &[request]);
        if let Some(t) = self.cache.get(&key) {
            return Ok(t);
        }
        let t = self.fetcher.fetch_boundary(request)?;
        if t.is_empty() {
            return Err(GeoErrors::EmptyTable {
                resource: request.to_string(),
            });
        }
        debug!(
            "fetch_boundary: {}: {} rows, columns {:?}",
            request,
            t.len(),
            t.columns()
        );
        self.cache.insert(key, t.clone());
        Ok(t)
    }

    pub(crate) fn fetch_table(&mut self, source: &TableSource) -> GeoResult<Table> {
        let key = CacheKey::new("fetch_table", &[source]);
        if let Some(t) = self.cache.get(&key) {
            return Ok(t);
        }
        let t = self.fetcher.fetch_table(source)?;
        if t.is_empty() {
            return Err(GeoErrors::EmptyTable {
                resource: source.to_string(),
            });
        }
        debug!("fetch_table: {}: {} rows", source, t.len());
        self.cache.insert(key, t.clone());
        Ok(t)
    }

    /// Builds the table that maps the areas of `event` onto `compare_to`.
    ///
    /// `compare_to` is either a census or postcode target, or another event
    /// whose divisions are wanted. For SA1 targets the correspondence itself is
    /// returned. For division and postal targets the correspondence is joined
    /// with the allocation of the target unit, and electoral divisions are
    /// patched with the redistribution the target names.
    ///
    /// Mapping to an SA1 edition older than the event's own is rejected
    /// before anything is fetched.
    pub fn prepare_boundaries(
        &mut self,
        event: &str,
        compare_to: &str,
        strict: bool,
    ) -> GeoResult<Table> {
        let ev = self
            .config
            .event(event)
            .cloned()
            .ok_or_else(|| GeoErrors::UnknownEvent(event.to_string()))?;
        let target = self
            .config
            .target(compare_to)
            .cloned()
            .ok_or_else(|| GeoErrors::UnknownTarget(compare_to.to_string()))?;
        if target.sa1_year < ev.base.year {
            return Err(GeoErrors::BackwardMapping {
                event: ev.id,
                base: ev.base,
                target_sa1_year: target.sa1_year,
            });
        }
        info!(
            "prepare_boundaries: {} ({}) -> {} ({:?} {} on SA1 {})",
            ev.id, ev.base, compare_to, target.unit, target.unit_year, target.sa1_year
        );

        let correspondence =
            self.get_correspondence(ev.base.kind, ev.base.year, target.sa1_year, strict)?;
        if target.unit == UnitType::Sa1 {
            return Ok(correspondence);
        }

        let spec = self
            .config
            .allocation(target.unit, target.unit_year)
            .cloned()
            .ok_or(GeoErrors::MissingAllocation {
                unit: target.unit,
                year: target.unit_year,
            })?;
        if spec.sa1_year != target.sa1_year {
            return Err(GeoErrors::UnsupportedCombination {
                base: Geography::sa1(spec.sa1_year),
                target_sa1_year: target.sa1_year,
            });
        }
        let allocation = self.get_allocation_table(target.unit_year, target.unit)?;
        let shared = correspondence.shared_columns(&allocation);
        if shared.is_empty() {
            return Err(GeoErrors::MissingColumn {
                column: sa1_code_column(target.sa1_year),
                available: correspondence.columns().to_vec(),
            });
        }
        let on: Vec<&str> = shared.iter().map(|c| c.as_str()).collect();
        let joined = correspondence.outer_join(&allocation, &on)?;
        debug!(
            "prepare_boundaries: joined on {:?}: {} rows",
            on,
            joined.len()
        );

        let redistribution = match (target.unit, &target.redistribution) {
            (UnitType::Ced, Some(r)) => self.config.redistribution(r).cloned(),
            _ => None,
        };
        let result = match redistribution {
            None => joined,
            Some(red) => {
                let bridge_year = red
                    .sources
                    .iter()
                    .map(|s| s.code_year)
                    .find(|y| *y != red.sa1_year);
                let bridge = match bridge_year {
                    Some(y) => Some(self.get_correspondence(AreaKind::Sa1, y, red.sa1_year, strict)?),
                    None => None,
                };
                self.apply_redistribution_adjustments(joined, &red.id, bridge.as_ref())?
            }
        };
        info!("prepare_boundaries: {} rows", result.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn backward_mapping_is_rejected_before_fetching() {
        let mut session = Session::new(MockFetcher::new());
        assert_eq!(
            session.prepare_boundaries("2022", "2016", true),
            Err(GeoErrors::BackwardMapping {
                event: "2022".to_string(),
                base: Geography::sa1(2021),
                target_sa1_year: 2016
            })
        );
        assert!(session.fetcher().calls().is_empty());
    }

    #[test]
    fn unknown_ids_are_configuration_errors() {
        let mut session = Session::new(MockFetcher::new());
        assert_eq!(
            session.prepare_boundaries("1999", "2022", true),
            Err(GeoErrors::UnknownEvent("1999".to_string()))
        );
        assert_eq!(
            session.prepare_boundaries("2022", "Census 1996", true),
            Err(GeoErrors::UnknownTarget("Census 1996".to_string()))
        );
        assert!(session.fetcher().calls().is_empty());
    }

    #[test]
    fn census_targets_return_the_correspondence() {
        init();
        let fetcher = MockFetcher::new().boundary(
            BoundaryRequest::correspondence(2021, GeoLevel::Sa1),
            table(
                &["SA1_MAINCODE_2016", "SA1_CODE_2021", "RATIO_FROM_TO"],
                &[
                    &["10101100101", "10101100101", "1"],
                    &["10101100102", "10101100102", "0.6"],
                    &["10101100102", "10101100103", "0.4"],
                ],
            ),
        );
        let mut session = Session::new(fetcher);
        let t = session
            .prepare_boundaries("2019", "Census 2021", true)
            .unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.find_column(RATIO_PREFIX), Some("RATIO_16SA1_21SA1"));
        assert_eq!(t.get(2, "SA1_7DIGITCODE_2016"), Some(&Value::text("1100102")));
    }

    #[test]
    fn division_targets_join_the_allocation() {
        init();
        let fetcher = MockFetcher::new()
            .boundary(
                BoundaryRequest::correspondence(2016, GeoLevel::Sa1),
                table(
                    &["SA1_MAINCODE_2011", "SA1_MAINCODE_2016", "RATIO"],
                    &[
                        &["10101100101", "10101100101", "1"],
                        &["10101100102", "10101100102", "0.5"],
                        &["10101100102", "10101100103", "0.5"],
                    ],
                ),
            )
            .boundary(
                BoundaryRequest::allocation(2018, GeoLevel::Ced),
                table(
                    &["SA1_MAINCODE_2016", "CED_CODE_2018", "CED_NAME_2018"],
                    &[
                        &["10101100101", "101", "Eden-Monaro"],
                        &["10101100102", "101", "Eden-Monaro"],
                        &["10101100103", "102", "Hume"],
                        &["10101100104", "102", "Hume"],
                    ],
                ),
            );
        let mut session = Session::new(fetcher);
        let t = session.prepare_boundaries("2016", "2019", true).unwrap();
        assert_eq!(
            t.columns(),
            &[
                "SA1_MAINCODE_2011",
                "SA1_MAINCODE_2016",
                "RATIO_11SA1_16SA1",
                "SA1_7DIGITCODE_2011",
                "CED_NAME_2018",
                "SA1_7DIGITCODE_2016"
            ]
        );
        // Three matched rows plus the SA1 that no 2011 area maps into.
        assert_eq!(t.len(), 4);
        assert_eq!(t.get(2, "CED_NAME_2018"), Some(&Value::text("Hume")));
        assert_eq!(t.get(3, "SA1_MAINCODE_2011"), Some(&Value::Null));
    }

    #[test]
    fn redistributions_patch_division_targets() {
        init();
        let nt_url = GeographyConfig::australia()
            .redistribution("NT")
            .map(|r| r.sources[0].source.url.clone())
            .unwrap();
        let fetcher = MockFetcher::new()
            .boundary(
                BoundaryRequest::allocation(2021, GeoLevel::Sa1),
                table(&["SA1_CODE_2021"], &[&["70101100101"], &["70101100102"]]),
            )
            .boundary(
                BoundaryRequest::allocation(2024, GeoLevel::Ced),
                table(
                    &["MB_CODE_2021", "CED_NAME_2024"],
                    &[&["1", "Lingiari"], &["2", "Lingiari"]],
                ),
            )
            .boundary(
                BoundaryRequest::allocation(2021, GeoLevel::Mb),
                table(
                    &["MB_CODE_2021", "SA1_CODE_2021"],
                    &[&["1", "70101100101"], &["2", "70101100102"]],
                ),
            )
            .table(
                &nt_url,
                table(
                    &["SA1 Code (2021 SA1s)", "New Division"],
                    &[&["7100102", "Solomon"]],
                ),
            );
        let mut session = Session::new(fetcher);
        let t = session.prepare_boundaries("2022", "2025", true).unwrap();
        assert_eq!(
            t.columns(),
            &["SA1_CODE_2021", "SA1_7DIGITCODE_2021", "CED_NAME_2024"]
        );
        assert_eq!(t.get(0, "CED_NAME_2024"), Some(&Value::text("Lingiari")));
        assert_eq!(t.get(1, "CED_NAME_2024"), Some(&Value::text("Solomon")));
        assert_eq!(session.fetcher().calls().len(), 4);
        assert_eq!(
            session
                .audit()
                .of_kind("redistribution_applied")
                .next()
                .map(|e| e.count()),
            Some(1)
        );

        // Everything is cached for the second run.
        let again = session.prepare_boundaries("2022", "2025", true).unwrap();
        assert_eq!(again, t);
        assert_eq!(session.fetcher().calls().len(), 4);
        assert!(session.cache().hits() > 0);
    }

    #[test]
    fn split_sa1s_are_counted_once() {
        init();
        let fetcher = MockFetcher::new()
            .boundary(
                BoundaryRequest::allocation(2021, GeoLevel::Sa1),
                table(&["SA1_CODE_2021"], &[&["11901100101"]]),
            )
            .boundary(
                BoundaryRequest::allocation(2021, GeoLevel::Poa),
                table(
                    &["MB_CODE_2021", "POA_NAME_2021"],
                    &[&["1", "2000"], &["2", "2001"], &["3", "2001"]],
                ),
            )
            .boundary(
                BoundaryRequest::allocation(2021, GeoLevel::Mb),
                table(
                    &["MB_CODE_2021", "SA1_CODE_2021"],
                    &[
                        &["1", "11901100101"],
                        &["2", "11901100101"],
                        &["3", "11901100101"],
                    ],
                ),
            );
        let mut session = Session::new(fetcher);
        let boundaries = session
            .prepare_boundaries("2022", "POA 2021", true)
            .unwrap();
        assert_eq!(boundaries.len(), 1);
        let votes = table(&["SA1_CODE_2021", "ALP"], &[&["11901100101", "100"]]);
        let out = session
            .prepare_results(&votes, &boundaries, "SA1_CODE_2021", &["ALP"], "POA_NAME_2021")
            .unwrap();
        assert_eq!(
            out.rows(),
            &[vec![Value::text("2001"), Value::Number(100.0)]]
        );
        assert_eq!(
            session
                .audit()
                .of_kind("split_allocation")
                .next()
                .map(|e| e.count()),
            Some(1)
        );
    }

    #[test]
    fn empty_files_are_errors() {
        let fetcher = MockFetcher::new().boundary(
            BoundaryRequest::correspondence(2021, GeoLevel::Sa1),
            table(&["SA1_MAINCODE_2016", "SA1_CODE_2021", "RATIO_FROM_TO"], &[]),
        );
        let mut session = Session::new(fetcher);
        assert_eq!(
            session.prepare_boundaries("2019", "Census 2021", true),
            Err(GeoErrors::EmptyTable {
                resource: "SA1 2021 correspondence".to_string()
            })
        );
    }

    #[test]
    fn audit_can_be_taken() {
        init();
        let fetcher = MockFetcher::new().boundary(
            BoundaryRequest::correspondence(2021, GeoLevel::Sa1),
            table(
                &["SA1_MAINCODE_2016", "SA1_CODE_2021", "RATIO_FROM_TO"],
                &[&["10101100101", "10101100101", "0.9"]],
            ),
        );
        let mut session = Session::new(fetcher).with_tolerance(0.2);
        session
            .prepare_boundaries("2019", "Census 2021", false)
            .unwrap();
        let audit = session.take_audit();
        assert_eq!(audit.of_kind("ratios_verified").count(), 1);
        assert!(session.audit().is_empty());
    }
}
