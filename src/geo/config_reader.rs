use crate::args::Args;
use crate::geo::*;

use asgs_correspondence::DEFAULT_TOLERANCE;
use log::debug;
use serde::{Deserialize, Serialize};
use snafu::{whatever, ResultExt};
use std::fs;
use std::path::Path;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ResultsConfig {
    #[serde(rename = "votesPath")]
    pub votes_path: String,
    #[serde(rename = "codeColumn")]
    pub code_column: Option<String>,
    #[serde(rename = "valueColumns")]
    pub value_columns: Option<Vec<String>>,
    #[serde(rename = "aggregateTo")]
    pub aggregate_to: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub event: Option<String>,
    #[serde(rename = "compareTo")]
    pub compare_to: Option<String>,
    pub strict: Option<bool>,
    pub tolerance: Option<f64>,
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
    #[serde(rename = "indexPath")]
    pub index_path: Option<String>,
    #[serde(rename = "auditPath")]
    pub audit_path: Option<String>,
    #[serde(rename = "referencePath")]
    pub reference_path: Option<String>,
    pub results: Option<ResultsConfig>,
}

/// The validated settings of a run, once the configuration file and the
/// command line have been merged.
#[derive(PartialEq, Debug, Clone)]
pub struct RunSettings {
    pub event: String,
    pub compare_to: String,
    pub strict: bool,
    pub tolerance: f64,
    pub output: Option<String>,
    pub index_path: Option<String>,
    pub audit_out: Option<String>,
    pub reference: Option<String>,
    pub results: Option<ResultsSettings>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ResultsSettings {
    pub votes_path: String,
    pub code_column: String,
    pub value_columns: Vec<String>,
    pub aggregate_to: Option<String>,
}

// Paths in a configuration file are relative to the file itself.
fn resolve(root: &Path, p: &str) -> String {
    if p.contains("://") || Path::new(p).is_absolute() || p == "stdout" || p.is_empty() {
        p.to_string()
    } else {
        root.join(p).display().to_string()
    }
}

pub fn read_run_config(path: &str) -> BGeoResult<RunConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let mut config: RunConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    let root = Path::new(path).parent().unwrap_or_else(|| Path::new("."));
    let relocate = |p: &mut Option<String>| {
        if let Some(s) = p.as_mut() {
            *s = resolve(root, s);
        }
    };
    relocate(&mut config.output_path);
    relocate(&mut config.index_path);
    relocate(&mut config.audit_path);
    relocate(&mut config.reference_path);
    if let Some(r) = config.results.as_mut() {
        r.votes_path = resolve(root, &r.votes_path);
    }
    debug!("read_run_config: {:?}", config);
    Ok(config)
}

fn validate_results(
    file: Option<&ResultsConfig>,
    args: &Args,
) -> GeoRunResult<Option<ResultsSettings>> {
    let votes_path = match (&args.votes, file) {
        (Some(p), _) => p.clone(),
        (None, Some(r)) => r.votes_path.clone(),
        (None, None) => {
            if args.votes_code_column.is_some() || args.value_columns.is_some() {
                whatever!("--votes-code-column and --value-columns require --votes")
            }
            return Ok(None);
        }
    };
    let code_column = match (&args.votes_code_column, file.and_then(|r| r.code_column.clone())) {
        (Some(c), _) => c.clone(),
        (None, Some(c)) => c,
        (None, None) => whatever!(
            "No code column for the votes in {}: use --votes-code-column",
            votes_path
        ),
    };
    let value_columns: Vec<String> =
        match (&args.value_columns, file.and_then(|r| r.value_columns.clone())) {
            (Some(v), _) => v.clone(),
            (None, Some(v)) => v,
            (None, None) => Vec::new(),
        };
    let value_columns: Vec<String> = value_columns
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if value_columns.is_empty() {
        whatever!(
            "No value columns for the votes in {}: use --value-columns",
            votes_path
        )
    }
    let aggregate_to = args
        .aggregate_to
        .clone()
        .or_else(|| file.and_then(|r| r.aggregate_to.clone()));
    Ok(Some(ResultsSettings {
        votes_path,
        code_column,
        value_columns,
        aggregate_to,
    }))
}

fn pick(
    cli: &Option<String>,
    file: Option<&RunConfig>,
    from_file: impl Fn(&RunConfig) -> Option<String>,
) -> Option<String> {
    cli.clone().or_else(|| file.and_then(from_file))
}

/// Merges the configuration file (if any) with the command line. The command line wins.
pub fn validate_run(file: Option<&RunConfig>, args: &Args) -> GeoRunResult<RunSettings> {
    let event = match args.event.clone().or_else(|| file.and_then(|c| c.event.clone())) {
        Some(e) => e,
        None => whatever!("No event given: use --event or the 'event' key of the configuration"),
    };
    let compare_to = match args
        .compare_to
        .clone()
        .or_else(|| file.and_then(|c| c.compare_to.clone()))
    {
        Some(t) => t,
        None => whatever!(
            "No comparison target given: use --compare-to or the 'compareTo' key of the configuration"
        ),
    };
    let strict = if args.lenient {
        false
    } else {
        file.and_then(|c| c.strict).unwrap_or(true)
    };
    let tolerance = args
        .tolerance
        .or_else(|| file.and_then(|c| c.tolerance))
        .unwrap_or(DEFAULT_TOLERANCE);
    if !(0.0..1.0).contains(&tolerance) {
        whatever!("The tolerance must be in [0, 1), got {}", tolerance)
    }
    Ok(RunSettings {
        event,
        compare_to,
        strict,
        tolerance,
        output: pick(&args.out, file, |c| c.output_path.clone()),
        index_path: pick(&args.index, file, |c| c.index_path.clone()),
        audit_out: pick(&args.audit_out, file, |c| c.audit_path.clone()),
        reference: pick(&args.reference, file, |c| c.reference_path.clone()),
        results: validate_results(file.and_then(|c| c.results.as_ref()), args)?,
    })
}
