//! Structured record of every recoverable data problem met during a session.
//!
//! Each event is also emitted through `log` at the point it happens; the
//! audit log keeps the same information in a form callers can inspect.

use std::fmt::Display;

#[derive(PartialEq, Debug, Clone)]
pub enum AuditEvent {
    /// Every group of the ratio column summed to 1.
    RatiosVerified { ratio_field: String, groups: usize },
    /// Some groups did not sum to 1. `removed` tells whether they were dropped.
    RatioViolations {
        ratio_field: String,
        groups: usize,
        rows: usize,
        removed: bool,
    },
    /// Violations were still present after dropping the offending groups.
    ResidualRatioViolations { ratio_field: String, groups: usize },
    /// Rows of a chained join missing a code or a ratio on one side.
    UnmatchedIntermediate { output_field: String, rows: usize },
    /// Supplementary SA1s that could not be found in the patched table.
    RedistributionUnmatched { redistribution: String, rows: usize },
    /// Supplementary SA1s of an older edition whose division lost to another
    /// SA1 contributing more to every new SA1 they overlap.
    RedistributionSuperseded { redistribution: String, rows: usize },
    /// Rows whose division was changed by a redistribution patch.
    RedistributionApplied {
        redistribution: String,
        changed: usize,
    },
    /// SA1s whose Mesh Blocks fall in more than one unit. Only the unit
    /// holding most of them is kept.
    SplitAllocation {
        unit_field: String,
        sa1s: usize,
        dropped: usize,
    },
    /// Vote rows without any boundary match.
    UnmatchedVotes { code_field: String, rows: usize },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::RatiosVerified { .. } => "ratios_verified",
            AuditEvent::RatioViolations { .. } => "ratio_violations",
            AuditEvent::ResidualRatioViolations { .. } => "residual_ratio_violations",
            AuditEvent::UnmatchedIntermediate { .. } => "unmatched_intermediate",
            AuditEvent::RedistributionUnmatched { .. } => "redistribution_unmatched",
            AuditEvent::RedistributionSuperseded { .. } => "redistribution_superseded",
            AuditEvent::RedistributionApplied { .. } => "redistribution_applied",
            AuditEvent::SplitAllocation { .. } => "split_allocation",
            AuditEvent::UnmatchedVotes { .. } => "unmatched_votes",
        }
    }

    /// The number of records the event is about.
    pub fn count(&self) -> usize {
        match self {
            AuditEvent::RatiosVerified { groups, .. } => *groups,
            AuditEvent::RatioViolations { groups, .. } => *groups,
            AuditEvent::ResidualRatioViolations { groups, .. } => *groups,
            AuditEvent::UnmatchedIntermediate { rows, .. } => *rows,
            AuditEvent::RedistributionUnmatched { rows, .. } => *rows,
            AuditEvent::RedistributionSuperseded { rows, .. } => *rows,
            AuditEvent::RedistributionApplied { changed, .. } => *changed,
            AuditEvent::SplitAllocation { sa1s, .. } => *sa1s,
            AuditEvent::UnmatchedVotes { rows, .. } => *rows,
        }
    }
}

impl Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditEvent::RatiosVerified { ratio_field, groups } => {
                write!(f, "{}: all {} groups sum to 1", ratio_field, groups)
            }
            AuditEvent::RatioViolations {
                ratio_field,
                groups,
                rows,
                removed: true,
            } => write!(
                f,
                "{}: removed {} groups ({} rows) whose ratios do not sum to 1",
                ratio_field, groups, rows
            ),
            AuditEvent::RatioViolations {
                ratio_field,
                groups,
                rows,
                removed: false,
            } => write!(
                f,
                "{}: {} groups ({} rows) do not sum to 1, kept as is",
                ratio_field, groups, rows
            ),
            AuditEvent::ResidualRatioViolations {
                ratio_field,
                groups,
            } => write!(
                f,
                "{}: {} groups still do not sum to 1 after cleaning",
                ratio_field, groups
            ),
            AuditEvent::UnmatchedIntermediate { output_field, rows } => write!(
                f,
                "{}: dropped {} rows without a matching intermediate area",
                output_field, rows
            ),
            AuditEvent::RedistributionUnmatched {
                redistribution,
                rows,
            } => write!(
                f,
                "{}: dropped {} supplementary SA1s not found in the table",
                redistribution, rows
            ),
            AuditEvent::RedistributionSuperseded {
                redistribution,
                rows,
            } => write!(
                f,
                "{}: {} supplementary SA1s are not the largest part of any new SA1",
                redistribution, rows
            ),
            AuditEvent::RedistributionApplied {
                redistribution,
                changed,
            } => write!(
                f,
                "{}: changed the division of {} rows",
                redistribution, changed
            ),
            AuditEvent::SplitAllocation {
                unit_field,
                sa1s,
                dropped,
            } => write!(
                f,
                "{}: {} SA1s span several units, dropped {} minority allocations",
                unit_field, sa1s, dropped
            ),
            AuditEvent::UnmatchedVotes { code_field, rows } => write!(
                f,
                "{}: {} vote rows have no boundary match",
                code_field, rows
            ),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    pub fn new() -> AuditLog {
        AuditLog::default()
    }

    pub fn push(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events of a given kind, in order.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a AuditEvent> + 'a {
        self.events.iter().filter(move |e| e.kind() == kind)
    }
}
