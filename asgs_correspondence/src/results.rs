use log::{info, warn};

use crate::audit::AuditEvent;
use crate::config::*;
use crate::table::{Table, Value};
use crate::{DataFetcher, Session};

impl<F: DataFetcher> Session<F> {
    /// Re-expresses vote counts in the units of a boundary table.
    ///
    /// Each value field is weighted by the ratio column of `boundaries` (found
    /// by its `RATIO_` prefix, or 1 for plain allocation tables) and summed per
    /// `output_field`. Votes without a boundary match are kept under a null
    /// output key so that totals are preserved.
    pub fn prepare_results(
        &mut self,
        votes: &Table,
        boundaries: &Table,
        vote_code_field: &str,
        value_fields: &[&str],
        output_field: &str,
    ) -> GeoResult<Table> {
        let ratio_field = boundaries.find_column(RATIO_PREFIX).map(|r| r.to_string());
        let mut wanted: Vec<&str> = vec![vote_code_field, output_field];
        if let Some(r) = &ratio_field {
            wanted.push(r.as_str());
        }
        let bounds = boundaries
            .select(&wanted)?
            .cast_codes(&[vote_code_field])?;
        let mut vote_cols: Vec<&str> = vec![vote_code_field];
        vote_cols.extend_from_slice(value_fields);
        let votes = votes.select(&vote_cols)?.cast_codes(&[vote_code_field])?;

        let known = bounds.codes(vote_code_field)?;
        let unmatched = votes
            .rows()
            .iter()
            .filter(|r| r[0].as_code().map_or(true, |c| !known.contains(&c)))
            .count();
        if unmatched > 0 {
            warn!(
                "prepare_results: {} vote rows have no match on {}; kept under an empty {}",
                unmatched, vote_code_field, output_field
            );
            self.audit.push(AuditEvent::UnmatchedVotes {
                code_field: vote_code_field.to_string(),
                rows: unmatched,
            });
        }

        let joined = votes.left_join(&bounds, &[vote_code_field])?;
        let out_idx = joined.column_index(output_field)?;
        let value_idx: Vec<usize> = (1..=value_fields.len()).collect();
        let ratio_idx = match &ratio_field {
            Some(r) => Some(joined.column_index(r)?),
            None => None,
        };

        let mut columns: Vec<&str> = vec![output_field];
        columns.extend_from_slice(value_fields);
        let mut weighted = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for r in joined.rows() {
            let matched = r[0]
                .as_code()
                .map_or(false, |c| known.contains(&c));
            let ratio = match (matched, ratio_idx) {
                (true, Some(i)) => r[i].as_number().unwrap_or(0.0),
                _ => 1.0,
            };
            let mut row = vec![r[out_idx].clone()];
            row.extend(value_idx.iter().map(|i| match r[*i].as_number() {
                Some(x) => Value::Number(x * ratio),
                None => Value::Null,
            }));
            weighted.push_row(row)?;
        }

        let totals = weighted.group_sum(&[output_field], value_fields)?;
        info!(
            "prepare_results: {} vote rows -> {} {} rows",
            votes.len(),
            totals.len(),
            output_field
        );
        Ok(totals)
    }
}
