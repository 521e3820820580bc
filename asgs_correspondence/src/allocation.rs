use std::collections::HashMap;

use log::{debug, info, warn};

use crate::audit::AuditEvent;
use crate::cache::CacheKey;
use crate::config::*;
use crate::table::{Table, Value};
use crate::{DataFetcher, Session};

/// The 7-digit SA1 code used by the AEC, derived from the 11-digit maincode.
///
/// The short code is the state digit followed by the last six digits. Codes
/// that are not 11 characters long are returned as they are.
pub fn sa1_7digit(maincode: &str) -> String {
    let code = maincode.trim();
    if code.chars().count() != 11 {
        return code.to_string();
    }
    let first: String = code.chars().take(1).collect();
    let last: String = code.chars().skip(5).collect();
    format!("{}{}", first, last)
}

// Adds the 7-digit column, or normalises it when the source file already has it.
fn with_short_code(table: Table, year: u16) -> GeoResult<Table> {
    let long = sa1_code_column(year);
    let short = sa1_short_column(year);
    if table.has_column(&short) {
        table.cast_codes(&[&short])
    } else {
        table.derive_column(&short, &long, |v| match v.as_code() {
            Some(c) => Value::Text(sa1_7digit(&c)),
            None => Value::Null,
        })
    }
}

// Keeps one unit per SA1: the one named on most rows (Mesh Blocks on the
// Mesh Block route), the first seen on a tie. A missing unit only counts when
// the SA1 has no named unit. Returns the pairs, the number of SA1s spanning
// several units and the number of pairs dropped.
fn resolve_splits(pairs: &Table, sa1: &str, name: &str) -> GeoResult<(Table, usize, usize)> {
    let sa1_idx = pairs.column_index(sa1)?;
    let name_idx = pairs.column_index(name)?;
    let mut order: Vec<Option<String>> = Vec::new();
    let mut tallies: HashMap<Option<String>, Vec<(Value, usize)>> = HashMap::new();
    for r in pairs.rows() {
        let code = r[sa1_idx].as_code();
        let units = tallies.entry(code.clone()).or_insert_with(|| {
            order.push(code);
            Vec::new()
        });
        match units.iter_mut().find(|(u, _)| *u == r[name_idx]) {
            Some((_, n)) => *n += 1,
            None => units.push((r[name_idx].clone(), 1)),
        }
    }

    let mut resolved = Table::new(vec![sa1.to_string(), name.to_string()]);
    let mut split = 0;
    let mut dropped = 0;
    for code in order {
        let units = match tallies.get(&code) {
            Some(u) => u,
            None => continue,
        };
        let named = units.iter().filter(|(u, _)| !u.is_null()).count();
        if named > 1 {
            split += 1;
        }
        let mut best: Option<&(Value, usize)> = None;
        for candidate in units.iter().filter(|(u, _)| named == 0 || !u.is_null()) {
            match best {
                Some(b) if b.1 >= candidate.1 => {}
                _ => best = Some(candidate),
            }
        }
        if let Some((unit, _)) = best {
            dropped += units.len() - 1;
            let code = code.map(Value::Text).unwrap_or(Value::Null);
            resolved.push_row(vec![code, unit.clone()])?;
        }
    }
    Ok((resolved, split, dropped))
}

impl<F: DataFetcher> Session<F> {
    /// The SA1 codes of one edition, with their 7-digit form.
    pub fn sa1_allocation(&mut self, year: u16) -> GeoResult<Table> {
        let key = CacheKey::new("sa1_allocation", &[&year]);
        if let Some(t) = self.cache.get(&key) {
            return Ok(t);
        }
        let raw = self.fetch_boundary(&BoundaryRequest::allocation(year, GeoLevel::Sa1))?;
        let long = sa1_code_column(year);
        let short = sa1_short_column(year);
        let mut cols: Vec<&str> = vec![long.as_str()];
        if raw.has_column(&short) {
            cols.push(short.as_str());
        }
        let table = with_short_code(raw.select(&cols)?.cast_codes(&[&long])?, year)?
            .filter(|r| !r[0].is_null())
            .distinct();
        info!("sa1_allocation: {} SA1s for {}", table.len(), year);
        self.cache.insert(key, table.clone());
        Ok(table)
    }

    /// Assigns each SA1 to the postal area or electoral division containing it.
    ///
    /// Older editions are published against SA1s directly. Newer ones are only
    /// published against Mesh Blocks, in which case the unit file and the Mesh
    /// Block file are joined on the Mesh Block code.
    ///
    /// An SA1 spanning several units is kept in the unit holding most of its
    /// Mesh Blocks, so that each SA1 appears once.
    pub fn get_allocation_table(&mut self, year: u16, target_type: UnitType) -> GeoResult<Table> {
        if target_type == UnitType::Sa1 {
            return self.sa1_allocation(year);
        }
        let spec = self
            .config
            .allocation(target_type, year)
            .cloned()
            .ok_or(GeoErrors::MissingAllocation {
                unit: target_type,
                year,
            })?;
        let key = CacheKey::new("allocation", &[&format!("{:?}", target_type), &year]);
        if let Some(t) = self.cache.get(&key) {
            return Ok(t);
        }

        let sa1 = sa1_code_column(spec.sa1_year);
        let name = target_type.name_column(year);
        let unit_request = BoundaryRequest::allocation(year, target_type.level());

        let pairs = match spec.route {
            AllocationRoute::Direct => {
                debug!("get_allocation_table: direct {} file", unit_request);
                self.fetch_boundary(&unit_request)?
                    .select(&[&sa1, &name])?
                    .cast_codes(&[&sa1, &name])?
            }
            AllocationRoute::ViaMeshBlock { mb_year } => {
                let mb = mb_code_column(mb_year);
                debug!(
                    "get_allocation_table: {} through {} mesh blocks",
                    unit_request, mb_year
                );
                let units = self
                    .fetch_boundary(&unit_request)?
                    .select(&[&mb, &name])?
                    .cast_codes(&[&mb, &name])?;
                let blocks = self
                    .fetch_boundary(&BoundaryRequest::allocation(mb_year, GeoLevel::Mb))?
                    .select(&[&mb, &sa1])?
                    .cast_codes(&[&mb, &sa1])?;
                let joined = blocks.outer_join(&units, &[&mb])?.drop_column(&mb)?;
                let sa1_idx = joined.column_index(&sa1)?;
                // Mesh blocks outside any SA1 cannot be addressed downstream.
                joined
                    .filter(|r| !r[sa1_idx].is_null())
                    .select(&[&sa1, &name])?
            }
        };

        let (pairs, split, dropped) = resolve_splits(&pairs, &sa1, &name)?;
        if split > 0 {
            warn!(
                "get_allocation_table: {}: {} SA1s span several units; kept the unit holding most of each ({} allocations dropped)",
                name, split, dropped
            );
            self.audit.push(AuditEvent::SplitAllocation {
                unit_field: name.clone(),
                sa1s: split,
                dropped,
            });
        }
        let table = with_short_code(pairs, spec.sa1_year)?;
        info!(
            "get_allocation_table: {} rows for {:?} {} (SA1 {})",
            table.len(),
            target_type,
            year,
            spec.sa1_year
        );
        self.cache.insert(key, table.clone());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn short_code_takes_first_and_last_six_digits() {
        assert_eq!(sa1_7digit("12345678901"), "1678901");
        assert_eq!(sa1_7digit("12345678901"), sa1_7digit("12345678901"));
        assert_eq!(sa1_7digit("1678901"), "1678901");
        assert_eq!(sa1_7digit(" 20101100101 "), "2100101");
    }

    #[test]
    fn direct_allocation_adds_short_codes() {
        init();
        let fetcher = MockFetcher::new().boundary(
            BoundaryRequest::allocation(2016, GeoLevel::Ced),
            table(
                &["SA1_MAINCODE_2016", "CED_CODE_2016", "CED_NAME_2016"],
                &[
                    &["10101100101", "101", "Banks"],
                    &["10101100102", "101", "Banks"],
                ],
            ),
        );
        let mut session = Session::new(fetcher);
        let t = session.get_allocation_table(2016, UnitType::Ced).unwrap();
        assert_eq!(
            t.columns(),
            &["SA1_MAINCODE_2016", "CED_NAME_2016", "SA1_7DIGITCODE_2016"]
        );
        assert_eq!(t.get(1, "SA1_7DIGITCODE_2016"), Some(&Value::text("1100102")));
    }

    #[test]
    fn mesh_block_route_deduplicates() {
        init();
        let fetcher = MockFetcher::new()
            .boundary(
                BoundaryRequest::allocation(2021, GeoLevel::Ced),
                table(
                    &["MB_CODE_2021", "CED_CODE_2021", "CED_NAME_2021"],
                    &[
                        &["1", "101", "Banks"],
                        &["2", "101", "Banks"],
                        &["3", "102", "Barton"],
                    ],
                ),
            )
            .boundary(
                BoundaryRequest::allocation(2021, GeoLevel::Mb),
                table(
                    &["MB_CODE_2021", "SA1_CODE_2021"],
                    &[
                        &["1", "11901100101"],
                        &["2", "11901100101"],
                        &["3", "11901100102"],
                    ],
                ),
            );
        let mut session = Session::new(fetcher);
        let t = session.get_allocation_table(2021, UnitType::Ced).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(
            t.columns(),
            &["SA1_CODE_2021", "CED_NAME_2021", "SA1_7DIGITCODE_2021"]
        );
        assert_eq!(t.get(0, "CED_NAME_2021"), Some(&Value::text("Banks")));
        assert_eq!(t.get(1, "SA1_7DIGITCODE_2021"), Some(&Value::text("1100102")));

        // Served from the cache the second time.
        let again = session.get_allocation_table(2021, UnitType::Ced).unwrap();
        assert_eq!(again, t);
        assert_eq!(session.fetcher().calls().len(), 2);
    }

    #[test]
    fn split_sa1_goes_to_the_unit_holding_most_mesh_blocks() {
        init();
        let fetcher = MockFetcher::new()
            .boundary(
                BoundaryRequest::allocation(2021, GeoLevel::Poa),
                table(
                    &["MB_CODE_2021", "POA_CODE_2021", "POA_NAME_2021"],
                    &[
                        &["1", "2000", "2000"],
                        &["2", "2001", "2001"],
                        &["3", "2001", "2001"],
                        &["4", "2000", "2000"],
                        &["5", "2001", "2001"],
                        &["6", "", ""],
                    ],
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
                        &["4", "11901100102"],
                        &["5", "11901100102"],
                        &["6", "11901100103"],
                    ],
                ),
            );
        let mut session = Session::new(fetcher);
        let t = session.get_allocation_table(2021, UnitType::Poa).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(0, "SA1_CODE_2021"), Some(&Value::text("11901100101")));
        assert_eq!(t.get(0, "POA_NAME_2021"), Some(&Value::text("2001")));
        // Tied: the first unit seen is kept.
        assert_eq!(t.get(1, "POA_NAME_2021"), Some(&Value::text("2000")));
        assert_eq!(t.get(2, "POA_NAME_2021"), Some(&Value::Null));
        assert_eq!(
            session.audit().events(),
            &[AuditEvent::SplitAllocation {
                unit_field: "POA_NAME_2021".to_string(),
                sa1s: 2,
                dropped: 2
            }]
        );
    }

    #[test]
    fn unknown_allocation_is_a_configuration_error() {
        let mut session = Session::new(MockFetcher::new());
        assert_eq!(
            session.get_allocation_table(2013, UnitType::Poa),
            Err(GeoErrors::MissingAllocation {
                unit: UnitType::Poa,
                year: 2013
            })
        );
        assert!(session.fetcher().calls().is_empty());
    }
}
