//! Electoral redistributions published after the ABS division files.
//!
//! When the AEC redraws divisions between census editions, the new division
//! of every SA1 is only available from the AEC's own spreadsheets. Those
//! files are applied as a patch over the division column of a boundary
//! table.

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::allocation::sa1_7digit;
use crate::audit::AuditEvent;
use crate::config::*;
use crate::table::{Table, Value};
use crate::{DataFetcher, Session};

// Old SA1 codes of a bridge, full and 7-digit.
struct Translation {
    // Old code -> new SA1 codes for which it is the largest contributor.
    children: HashMap<String, Vec<String>>,
    known: HashSet<String>,
}

fn dominant_children(bridge: &Table, old_year: u16, new_year: u16) -> GeoResult<Translation> {
    let old_idx = bridge.column_index(&sa1_code_column(old_year))?;
    let new_idx = bridge.column_index(&sa1_code_column(new_year))?;
    let ratio = bridge
        .find_column(RATIO_PREFIX)
        .ok_or_else(|| GeoErrors::MissingColumn {
            column: format!("{}*", RATIO_PREFIX),
            available: bridge.columns().to_vec(),
        })?;
    let ratio_idx = bridge.column_index(ratio)?;

    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, (String, f64)> = HashMap::new();
    let mut known: HashSet<String> = HashSet::new();
    for r in bridge.rows() {
        let (old, new) = match (r[old_idx].as_code(), r[new_idx].as_code()) {
            (Some(o), Some(n)) => (o, n),
            _ => continue,
        };
        known.insert(sa1_7digit(&old));
        known.insert(old.clone());
        let x = r[ratio_idx].as_number().unwrap_or(0.0);
        match best.get_mut(&new) {
            Some(b) => {
                if x > b.1 {
                    *b = (old, x);
                }
            }
            None => {
                order.push(new.clone());
                best.insert(new, (old, x));
            }
        }
    }

    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    for new in order {
        if let Some((old, _)) = best.remove(&new) {
            let short = sa1_7digit(&old);
            if short != old {
                children.entry(short).or_default().push(new.clone());
            }
            children.entry(old).or_default().push(new);
        }
    }
    Ok(Translation { children, known })
}

impl<F: DataFetcher> Session<F> {
    /// Overwrites the division column of `table` with a redistribution.
    ///
    /// Supplementary files coded against an older SA1 edition are translated
    /// through `sa1_2021_bridge`, the correspondence from that edition to the
    /// edition of `table`. Each new SA1 takes the division of the old SA1
    /// contributing the largest share of it.
    ///
    /// Rows not named by the redistribution are left as they are.
    pub fn apply_redistribution_adjustments(
        &mut self,
        table: Table,
        redistribution_id: &str,
        sa1_2021_bridge: Option<&Table>,
    ) -> GeoResult<Table> {
        let spec = self
            .config
            .redistribution(redistribution_id)
            .cloned()
            .ok_or_else(|| GeoErrors::UnknownRedistribution(redistribution_id.to_string()))?;

        let division_idx = table.column_index(&spec.division_field)?;
        let long_idx = table.column_index(&sa1_code_column(spec.sa1_year))?;
        let short_idx = table.column_index(&sa1_short_column(spec.sa1_year)).ok();

        let mut translations: HashMap<u16, Translation> = HashMap::new();
        for source in spec.sources.iter() {
            if source.code_year == spec.sa1_year || translations.contains_key(&source.code_year) {
                continue;
            }
            let bridge = sa1_2021_bridge.ok_or_else(|| GeoErrors::MissingBridge {
                redistribution: spec.id.clone(),
                code_year: source.code_year,
            })?;
            translations.insert(
                source.code_year,
                dominant_children(bridge, source.code_year, spec.sa1_year)?,
            );
        }

        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, r) in table.rows().iter().enumerate() {
            if let Some(code) = r[long_idx].as_code() {
                let short = short_idx
                    .and_then(|s| r[s].as_code())
                    .unwrap_or_else(|| sa1_7digit(&code));
                if short != code {
                    positions.entry(short).or_default().push(i);
                }
                positions.entry(code).or_default().push(i);
            }
        }
        let before: Vec<Option<String>> = table
            .rows()
            .iter()
            .map(|r| r[division_idx].as_code())
            .collect();

        let mut table = table;
        let mut unmatched = 0;
        let mut superseded = 0;
        for source in spec.sources.iter() {
            let code_col = source.code_column.as_str();
            let division_col = source.division_column.as_str();
            let supplement = self
                .fetch_table(&source.source)?
                .select(&[code_col, division_col])?
                .cast_codes(&[code_col, division_col])?;
            debug!(
                "apply_redistribution_adjustments: {}: {} rows from {}",
                source.label,
                supplement.len(),
                source.source
            );
            let translation = translations.get(&source.code_year);

            for r in supplement.rows() {
                let code = match r[0].as_code() {
                    Some(c) => c,
                    // Notes and blank lines at the bottom of the sheet.
                    None => continue,
                };
                let division = match r[1].as_code() {
                    Some(d) => d,
                    None => {
                        unmatched += 1;
                        continue;
                    }
                };
                let codes: Vec<String> = match translation {
                    Some(t) => match t.children.get(&code) {
                        Some(c) => c.clone(),
                        None if t.known.contains(&code) => {
                            superseded += 1;
                            continue;
                        }
                        None => Vec::new(),
                    },
                    None => vec![code],
                };
                let rows: Vec<usize> = codes
                    .iter()
                    .filter_map(|c| positions.get(c))
                    .flatten()
                    .copied()
                    .collect();
                if rows.is_empty() {
                    unmatched += 1;
                    continue;
                }
                for i in rows {
                    table.set_cell(i, division_idx, Value::Text(division.clone()));
                }
            }
        }

        if unmatched > 0 {
            warn!(
                "apply_redistribution_adjustments: {}: {} supplementary SA1s did not match any row",
                spec.id, unmatched
            );
            self.audit.push(AuditEvent::RedistributionUnmatched {
                redistribution: spec.id.clone(),
                rows: unmatched,
            });
        }
        if superseded > 0 {
            info!(
                "apply_redistribution_adjustments: {}: {} supplementary SA1s are not the largest part of any new SA1; their divisions were not used",
                spec.id, superseded
            );
            self.audit.push(AuditEvent::RedistributionSuperseded {
                redistribution: spec.id.clone(),
                rows: superseded,
            });
        }
        let changed = table
            .rows()
            .iter()
            .zip(before.iter())
            .filter(|(r, old)| r[division_idx].as_code() != **old)
            .count();
        info!(
            "apply_redistribution_adjustments: {}: {} rows changed {}",
            spec.id, changed, spec.division_field
        );
        self.audit.push(AuditEvent::RedistributionApplied {
            redistribution: spec.id,
            changed,
        });
        Ok(table)
    }
}
