use log::{debug, info};

use crate::allocation::sa1_7digit;
use crate::cache::CacheKey;
use crate::config::*;
use crate::ratios::{chain, verify_ratios};
use crate::table::{Table, Value};
use crate::{DataFetcher, Session};

impl<F: DataFetcher> Session<F> {
    /// Apportions the areas of a base geography into the SA1s of `target_sa1_year`.
    ///
    /// When the base is already an SA1 geography of the target edition, the
    /// plain SA1 allocation table is returned and no correspondence is
    /// fetched. Otherwise the published correspondences are chained along the
    /// configured hops, verifying the ratios after every step.
    ///
    /// The result holds the base code column, the target SA1 code column and
    /// a `RATIO_<base>_<target>` column. SA1 bases also get their 7-digit
    /// code.
    pub fn get_correspondence(
        &mut self,
        base_type: AreaKind,
        base_year: u16,
        target_sa1_year: u16,
        strict: bool,
    ) -> GeoResult<Table> {
        let base = Geography {
            kind: base_type,
            year: base_year,
        };
        let target = Geography::sa1(target_sa1_year);
        let unsupported = GeoErrors::UnsupportedCombination {
            base,
            target_sa1_year,
        };

        if base == target {
            if !self.is_known_sa1_edition(base_year) {
                return Err(unsupported);
            }
            debug!("get_correspondence: {} is already the target edition", base);
            return self.sa1_allocation(base_year);
        }

        let path: Vec<CorrespondenceHop> = match self.config.hop_path(&base, &target) {
            Some(p) if !p.is_empty() => p.into_iter().cloned().collect(),
            _ => return Err(unsupported),
        };

        let key = CacheKey::new(
            "correspondence",
            &[&base, &target_sa1_year, &strict, &self.tolerance],
        );
        if let Some(t) = self.cache.get(&key) {
            return Ok(t);
        }
        info!(
            "get_correspondence: {} -> {} in {} hop(s)",
            base,
            target,
            path.len()
        );

        let source_field = base.code_column();
        let mut table = self.load_hop(&path[0], strict)?;
        let mut reached = path[0].to;
        for hop in path.iter().skip(1) {
            let next = self.load_hop(hop, strict)?;
            table = chain(
                &table,
                &next,
                &hop.from.code_column(),
                &source_field,
                &hop.to.code_column(),
                &ratio_column(&base, &reached),
                &ratio_column(&hop.from, &hop.to),
                &ratio_column(&base, &hop.to),
                strict,
                self.tolerance,
                &mut self.audit,
            )?;
            reached = hop.to;
        }

        if base.kind == AreaKind::Sa1 {
            table = table.derive_column(&sa1_short_column(base.year), &source_field, |v| {
                match v.as_code() {
                    Some(c) => Value::Text(sa1_7digit(&c)),
                    None => Value::Null,
                }
            })?;
        }
        info!(
            "get_correspondence: {} -> {}: {} rows",
            base,
            target,
            table.len()
        );
        self.cache.insert(key, table.clone());
        Ok(table)
    }

    fn is_known_sa1_edition(&self, year: u16) -> bool {
        let sa1 = Geography::sa1(year);
        self.config.hops.iter().any(|h| h.from == sa1 || h.to == sa1)
            || self.config.allocations.iter().any(|a| a.sa1_year == year)
    }

    // One published correspondence, normalised and verified.
    fn load_hop(&mut self, hop: &CorrespondenceHop, strict: bool) -> GeoResult<Table> {
        let key = CacheKey::new("hop", &[&hop.from, &hop.to, &strict, &self.tolerance]);
        if let Some(t) = self.cache.get(&key) {
            return Ok(t);
        }
        let raw = self.fetch_boundary(&hop.request)?;
        let src = hop.from.code_column();
        let tgt = hop.to.code_column();
        let raw_ratio = RAW_RATIO_COLUMNS
            .iter()
            .find(|c| raw.has_column(c))
            .copied()
            .ok_or_else(|| GeoErrors::MissingColumn {
                column: RAW_RATIO_COLUMNS.join(" or "),
                available: raw.columns().to_vec(),
            })?;
        let ratio = ratio_column(&hop.from, &hop.to);
        debug!(
            "load_hop: {} -> {}: {} rows, ratio column {}",
            hop.from,
            hop.to,
            raw.len(),
            raw_ratio
        );

        let table = raw
            .select(&[&src, &tgt, raw_ratio])?
            .rename(raw_ratio, &ratio)?
            .cast_codes(&[&src, &tgt])?
            .cast_numbers(&ratio)?;
        let table = verify_ratios(
            table,
            &ratio,
            &[&src],
            strict,
            self.tolerance,
            &mut self.audit,
        )?;
        self.cache.insert(key, table.clone());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn cd_fetcher() -> MockFetcher {
        MockFetcher::new()
            .boundary(
                BoundaryRequest::correspondence(2011, GeoLevel::Sa1),
                table(
                    &["CD_CODE_2006", "SA1_MAINCODE_2011", "RATIO", "PERCENTAGE"],
                    &[
                        &["1010101", "100001", "0.6", "60"],
                        &["1010101", "100002", "0.4", "40"],
                    ],
                ),
            )
            .boundary(
                BoundaryRequest::correspondence(2016, GeoLevel::Sa1),
                table(
                    &["SA1_MAINCODE_2011", "SA1_MAINCODE_2016", "RATIO"],
                    &[&["100001", "200001", "1"], &["100002", "200002", "1"]],
                ),
            )
            .boundary(
                BoundaryRequest::correspondence(2021, GeoLevel::Sa1),
                table(
                    &["SA1_MAINCODE_2016", "SA1_CODE_2021", "RATIO_FROM_TO"],
                    &[
                        &["200001", "30000100001", "0.5"],
                        &["200001", "30000100002", "0.5"],
                        &["200002", "30000100002", "1.0"],
                    ],
                ),
            )
    }

    #[test]
    fn collection_district_single_hop() {
        init();
        let mut session = Session::new(cd_fetcher());
        let t = session
            .get_correspondence(AreaKind::CollectionDistrict, 2006, 2011, true)
            .unwrap();
        assert_eq!(
            t.columns(),
            &["CD_CODE_2006", "SA1_MAINCODE_2011", "RATIO_06CD_11SA1"]
        );
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "RATIO_06CD_11SA1"), Some(&Value::Number(0.6)));
    }

    #[test]
    fn collection_district_to_2016() {
        init();
        let mut session = Session::new(cd_fetcher());
        let t = session
            .get_correspondence(AreaKind::CollectionDistrict, 2006, 2016, true)
            .unwrap();
        assert_eq!(
            t.rows(),
            &[
                vec![
                    Value::text("1010101"),
                    Value::text("200001"),
                    Value::Number(0.6)
                ],
                vec![
                    Value::text("1010101"),
                    Value::text("200002"),
                    Value::Number(0.4)
                ],
            ]
        );
    }

    #[test]
    fn collection_district_to_2021_chains_three_hops() {
        init();
        let mut session = Session::new(cd_fetcher());
        let t = session
            .get_correspondence(AreaKind::CollectionDistrict, 2006, 2021, true)
            .unwrap();
        assert_eq!(
            t.columns(),
            &["CD_CODE_2006", "SA1_CODE_2021", "RATIO_06CD_21SA1"]
        );
        let r1 = t.get(0, "RATIO_06CD_21SA1").and_then(|v| v.as_number()).unwrap();
        let r2 = t.get(1, "RATIO_06CD_21SA1").and_then(|v| v.as_number()).unwrap();
        assert!((r1 - 0.3).abs() < 1e-12);
        assert!((r2 - 0.7).abs() < 1e-12);
        assert_eq!(session.fetcher().calls().len(), 3);
    }

    #[test]
    fn sa1_bases_carry_short_codes() {
        init();
        let mut session = Session::new(cd_fetcher());
        let t = session
            .get_correspondence(AreaKind::Sa1, 2016, 2021, true)
            .unwrap();
        assert_eq!(
            t.columns(),
            &[
                "SA1_MAINCODE_2016",
                "SA1_CODE_2021",
                "RATIO_16SA1_21SA1",
                "SA1_7DIGITCODE_2016"
            ]
        );
    }

    #[test]
    fn same_edition_returns_the_allocation_table() {
        init();
        let fetcher = cd_fetcher().boundary(
            BoundaryRequest::allocation(2016, GeoLevel::Sa1),
            table(
                &["SA1_MAINCODE_2016", "SA1_7DIGITCODE_2016", "SA2_NAME_2016"],
                &[&["10101100101", "1100101", "Braidwood"]],
            ),
        );
        let mut session = Session::new(fetcher);
        let t = session
            .get_correspondence(AreaKind::Sa1, 2016, 2016, true)
            .unwrap();
        assert_eq!(t.columns(), &["SA1_MAINCODE_2016", "SA1_7DIGITCODE_2016"]);
        assert!(t.find_column(RATIO_PREFIX).is_none());
        let calls = session.fetcher().calls();
        assert_eq!(calls, vec!["SA1 2016 allocation".to_string()]);
    }

    #[test]
    fn unsupported_pairings_are_rejected() {
        let mut session = Session::new(cd_fetcher());
        assert_eq!(
            session.get_correspondence(AreaKind::Sa1, 2016, 2011, true),
            Err(GeoErrors::UnsupportedCombination {
                base: Geography::sa1(2016),
                target_sa1_year: 2011
            })
        );
        assert!(session
            .get_correspondence(AreaKind::CollectionDistrict, 2001, 2011, true)
            .is_err());
        assert!(session
            .get_correspondence(AreaKind::Sa1, 2006, 2006, true)
            .is_err());
        assert!(session.fetcher().calls().is_empty());
    }

    #[test]
    fn computed_correspondences_are_cached() {
        init();
        let mut session = Session::new(cd_fetcher());
        let first = session
            .get_correspondence(AreaKind::Sa1, 2011, 2021, true)
            .unwrap();
        let second = session
            .get_correspondence(AreaKind::Sa1, 2011, 2021, true)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(session.fetcher().calls().len(), 2);

        session.clear_cache();
        session
            .get_correspondence(AreaKind::Sa1, 2011, 2021, true)
            .unwrap();
        assert_eq!(session.fetcher().calls().len(), 4);
    }

    #[test]
    fn new_editions_only_need_configuration() {
        init();
        let mut config = GeographyConfig::australia();
        config.hops.push(CorrespondenceHop {
            from: Geography::sa1(2021),
            to: Geography::sa1(2026),
            request: BoundaryRequest::correspondence(2026, GeoLevel::Sa1),
        });
        let fetcher = cd_fetcher().boundary(
            BoundaryRequest::correspondence(2026, GeoLevel::Sa1),
            table(
                &["SA1_CODE_2021", "SA1_CODE_2026", "RATIO_FROM_TO"],
                &[
                    &["30000100001", "40000100001", "1"],
                    &["30000100002", "40000100001", "1"],
                ],
            ),
        );
        let mut session = Session::with_config(fetcher, config);
        let t = session
            .get_correspondence(AreaKind::CollectionDistrict, 2006, 2026, true)
            .unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(0, "SA1_CODE_2026"), Some(&Value::text("40000100001")));
        let r = t.get(0, "RATIO_06CD_26SA1").and_then(|v| v.as_number()).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }
}
