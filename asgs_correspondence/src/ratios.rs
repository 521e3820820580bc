//! Verification and composition of apportionment ratios.

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::audit::{AuditEvent, AuditLog};
use crate::config::GeoResult;
use crate::table::{Table, Value};

type GroupKey = Vec<Option<String>>;

// Groups whose ratio sum is off by more than the tolerance, and the number of groups.
fn find_violations(
    records: &Table,
    ratio_idx: usize,
    key_idx: &[usize],
    tolerance: f64,
) -> (HashSet<GroupKey>, usize) {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut sums: std::collections::HashMap<GroupKey, f64> = std::collections::HashMap::new();
    for r in records.rows() {
        let k: GroupKey = key_idx.iter().map(|i| r[*i].as_code()).collect();
        let x = r[ratio_idx].as_number().unwrap_or(0.0);
        match sums.get_mut(&k) {
            Some(s) => *s += x,
            None => {
                order.push(k.clone());
                sums.insert(k, x);
            }
        }
    }
    let bad: HashSet<GroupKey> = order
        .into_iter()
        .filter(|k| !sums[k].is_finite() || (sums[k] - 1.0).abs() > tolerance)
        .collect();
    (bad, sums.len())
}

/// Checks that the ratios of every group sum to 1 within `tolerance`.
///
/// In non-strict mode offending groups are reported and kept. In strict mode
/// every record of an offending group is removed, and the remainder is
/// checked again.
pub fn verify_ratios(
    records: Table,
    ratio_field: &str,
    group_fields: &[&str],
    strict: bool,
    tolerance: f64,
    audit: &mut AuditLog,
) -> GeoResult<Table> {
    let ratio_idx = records.column_index(ratio_field)?;
    let key_idx: Vec<usize> = group_fields
        .iter()
        .map(|g| records.column_index(g))
        .collect::<GeoResult<Vec<usize>>>()?;

    let (bad, num_groups) = find_violations(&records, ratio_idx, &key_idx, tolerance);
    if bad.is_empty() {
        info!(
            "verify_ratios: {}: all {} groups of {:?} sum to 1 (tolerance {})",
            ratio_field, num_groups, group_fields, tolerance
        );
        audit.push(AuditEvent::RatiosVerified {
            ratio_field: ratio_field.to_string(),
            groups: num_groups,
        });
        return Ok(records);
    }

    let in_bad = |r: &[Value]| -> bool {
        let k: GroupKey = key_idx.iter().map(|i| r[*i].as_code()).collect();
        bad.contains(&k)
    };
    let bad_rows = records.rows().iter().filter(|r| in_bad(r.as_slice())).count();

    if !strict {
        warn!(
            "verify_ratios: {}: {} of {} groups ({} rows) do not sum to 1; keeping them",
            ratio_field,
            bad.len(),
            num_groups,
            bad_rows
        );
        audit.push(AuditEvent::RatioViolations {
            ratio_field: ratio_field.to_string(),
            groups: bad.len(),
            rows: bad_rows,
            removed: false,
        });
        return Ok(records);
    }

    let cleaned = records.filter(|r| !in_bad(r));
    info!(
        "verify_ratios: {}: removed {} of {} groups ({} rows) whose ratios do not sum to 1",
        ratio_field,
        bad.len(),
        num_groups,
        bad_rows
    );
    audit.push(AuditEvent::RatioViolations {
        ratio_field: ratio_field.to_string(),
        groups: bad.len(),
        rows: bad_rows,
        removed: true,
    });

    let (residual, _) = find_violations(&cleaned, ratio_idx, &key_idx, tolerance);
    if !residual.is_empty() {
        warn!(
            "verify_ratios: {}: {} groups still do not sum to 1 after cleaning",
            ratio_field,
            residual.len()
        );
        audit.push(AuditEvent::ResidualRatioViolations {
            ratio_field: ratio_field.to_string(),
            groups: residual.len(),
        });
    }
    Ok(cleaned)
}

/// Multiplies the two ratios of a merged table and sums them per group.
///
/// `merged` is the outer join of a source→intermediate table with an
/// intermediate→target table. `group_fields` are the (source, target)
/// columns; the result is verified on the first of them.
#[allow(clippy::too_many_arguments)]
pub fn combine_ratios(
    merged: &Table,
    output_field: &str,
    ratio_field_a: &str,
    ratio_field_b: &str,
    group_fields: &[&str],
    strict: bool,
    tolerance: f64,
    audit: &mut AuditLog,
) -> GeoResult<Table> {
    let a_idx = merged.column_index(ratio_field_a)?;
    let b_idx = merged.column_index(ratio_field_b)?;
    let key_idx: Vec<usize> = group_fields
        .iter()
        .map(|g| merged.column_index(g))
        .collect::<GeoResult<Vec<usize>>>()?;

    let complete = |r: &[Value]| -> bool {
        key_idx.iter().all(|i| !r[*i].is_null())
            && r[a_idx].as_number().is_some()
            && r[b_idx].as_number().is_some()
    };
    let unmatched = merged.rows().iter().filter(|r| !complete(r.as_slice())).count();
    if unmatched > 0 {
        warn!(
            "combine_ratios: {}: dropping {} rows without a matching intermediate area",
            output_field, unmatched
        );
        audit.push(AuditEvent::UnmatchedIntermediate {
            output_field: output_field.to_string(),
            rows: unmatched,
        });
    }

    let mut columns: Vec<&str> = group_fields.to_vec();
    columns.push(output_field);
    let mut product = Table::new(columns.iter().map(|c| c.to_string()).collect());
    for r in merged.rows().iter().filter(|r| complete(r.as_slice())) {
        let mut row: Vec<Value> = key_idx.iter().map(|i| r[*i].clone()).collect();
        // Both ratios are present: checked by `complete`.
        let a = r[a_idx].as_number().unwrap_or(0.0);
        let b = r[b_idx].as_number().unwrap_or(0.0);
        row.push(Value::Number(a * b));
        product.push_row(row)?;
    }

    let combined = product.group_sum(group_fields, &[output_field])?;
    debug!(
        "combine_ratios: {}: {} merged rows -> {} combined rows",
        output_field,
        merged.len(),
        combined.len()
    );
    verify_ratios(
        combined,
        output_field,
        &group_fields[..1],
        strict,
        tolerance,
        audit,
    )
}

/// Chains a source→intermediate table with an intermediate→target table.
///
/// Both tables must carry `join_field`. The result holds `source_field`,
/// `target_field` and `output_field`.
#[allow(clippy::too_many_arguments)]
pub fn chain(
    first: &Table,
    second: &Table,
    join_field: &str,
    source_field: &str,
    target_field: &str,
    ratio_field_a: &str,
    ratio_field_b: &str,
    output_field: &str,
    strict: bool,
    tolerance: f64,
    audit: &mut AuditLog,
) -> GeoResult<Table> {
    let left = first.select(&[source_field, join_field, ratio_field_a])?;
    let right = second.select(&[join_field, target_field, ratio_field_b])?;
    let merged = left.outer_join(&right, &[join_field])?;
    debug!(
        "chain: {} x {} rows on {} -> {} merged rows",
        left.len(),
        right.len(),
        join_field,
        merged.len()
    );
    combine_ratios(
        &merged,
        output_field,
        ratio_field_a,
        ratio_field_b,
        &[source_field, target_field],
        strict,
        tolerance,
        audit,
    )
}
