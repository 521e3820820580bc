use log::{debug, info, warn};

use asgs_correspondence::*;
use snafu::{prelude::*, Snafu};

use std::fs;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::geo::config_reader::*;
use crate::geo::fetcher::HttpFetcher;
use crate::geo::index::BoundaryIndex;
use crate::geo::io_csv::table_to_csv_string;

pub mod config_reader;
pub mod fetcher;
pub mod index;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;

#[derive(Debug, Snafu)]
pub enum GeoError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error with the JSON content of {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error downloading {url}"))]
    Download { source: reqwest::Error, url: String },
    #[snafu(display("Error reading file {path}"))]
    ReadingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error reading zip archive {resource}"))]
    ReadingZip {
        source: zip::result::ZipError,
        resource: String,
    },
    #[snafu(display("No file matching {member:?} in zip archive {resource}"))]
    MissingZipMember { member: String, resource: String },
    #[snafu(display("Error opening spreadsheet {resource}"))]
    OpeningExcel {
        source: calamine::Error,
        resource: String,
    },
    #[snafu(display("No worksheet {sheet:?} in {resource}"))]
    MissingSheet { sheet: String, resource: String },
    #[snafu(display("{resource} is empty"))]
    EmptyFile { resource: String },
    #[snafu(display("Error parsing CSV {resource}"))]
    CsvParse {
        source: csv::Error,
        resource: String,
    },
    #[snafu(display("Error writing CSV"))]
    CsvWrite { source: csv::Error },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("{source}"))]
    Correspondence { source: GeoErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type GeoRunResult<T> = Result<T, GeoError>;

pub type BGeoResult<T> = Result<T, Box<GeoError>>;

/// The message of an error followed by the messages of its sources.
pub fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut src = e.source();
    while let Some(s) = src {
        let s_msg = s.to_string();
        if !msg.ends_with(&s_msg) {
            msg.push_str(": ");
            msg.push_str(&s_msg);
        }
        src = s.source();
    }
    msg
}

fn print_listing(config: &GeographyConfig) {
    println!("Events:");
    for e in config.events.iter() {
        println!("  {:<18} {} (results on {})", e.id, e.description, e.base);
    }
    println!("Census and postcode targets:");
    for t in config.targets.iter() {
        println!("  {:<18} {}", t.id, t.description);
    }
    println!("Redistributions:");
    for r in config.redistributions.iter() {
        println!("  {:<18} {}", r.id, r.description);
    }
    println!("Any event can also be used as a target, meaning the divisions in force at that event.");
}

fn aggregate_votes(
    session: &mut Session<HttpFetcher>,
    settings: &RunSettings,
    results: &ResultsSettings,
    boundaries: &Table,
) -> BGeoResult<Table> {
    let source = TableSource {
        url: results.votes_path.clone(),
        member: None,
        sheet: None,
        header_row: 1,
    };
    let votes = session
        .fetcher()
        .fetch_table(&source)
        .context(CorrespondenceSnafu {})?;
    let aggregate_to = match &results.aggregate_to {
        Some(a) => a.clone(),
        None => {
            let target = session
                .config()
                .target(&settings.compare_to)
                .ok_or_else(|| GeoErrors::UnknownTarget(settings.compare_to.clone()))
                .context(CorrespondenceSnafu {})?;
            target.unit.name_column(target.unit_year)
        }
    };
    info!(
        "aggregate_votes: {} vote rows from {} to {}",
        votes.len(),
        results.votes_path,
        aggregate_to
    );
    let value_columns: Vec<&str> = results.value_columns.iter().map(|c| c.as_str()).collect();
    let totals = session
        .prepare_results(
            &votes,
            boundaries,
            &results.code_column,
            &value_columns,
            &aggregate_to,
        )
        .context(CorrespondenceSnafu {})?;
    Ok(totals)
}

fn write_output(path: Option<&str>, content: &str) -> GeoRunResult<()> {
    match path {
        None | Some("stdout") | Some("") => {
            print!("{}", content);
            Ok(())
        }
        Some(p) => {
            info!("Writing {}", p);
            fs::write(p, content).context(WritingOutputSnafu { path: p })
        }
    }
}

fn audit_to_json(audit: &AuditLog, settings: &RunSettings) -> JSValue {
    let events: Vec<JSValue> = audit
        .events()
        .iter()
        .map(|e| json!({"kind": e.kind(), "count": e.count(), "message": e.to_string()}))
        .collect();
    json!({
        "event": settings.event,
        "compareTo": settings.compare_to,
        "strict": settings.strict,
        "tolerance": settings.tolerance,
        "events": events
    })
}

fn check_reference(reference_path: &str, produced: &str) -> GeoRunResult<()> {
    let reference = fs::read_to_string(reference_path).context(ReadingFileSnafu {
        path: reference_path,
    })?;
    let reference = reference.replace("\r\n", "\n");
    if reference != produced {
        warn!("Found differences with the reference {}", reference_path);
        print_diff(reference.as_str(), produced, "\n");
        whatever!(
            "Difference detected between the output and the reference {}",
            reference_path
        )
    }
    info!("Output matches the reference {}", reference_path);
    Ok(())
}

pub fn run(args: &Args) -> BGeoResult<()> {
    if args.list {
        print_listing(&GeographyConfig::australia());
        return Ok(());
    }

    let file_config = match &args.config {
        Some(p) => Some(read_run_config(p)?),
        None => None,
    };
    let settings = validate_run(file_config.as_ref(), args)?;
    debug!("run: settings: {:?}", settings);

    let index = match &settings.index_path {
        Some(p) => BoundaryIndex::from_path(p)?,
        None => BoundaryIndex::builtin()?,
    };
    let mut session = Session::new(HttpFetcher::new(index)?).with_tolerance(settings.tolerance);

    let boundaries = session
        .prepare_boundaries(&settings.event, &settings.compare_to, settings.strict)
        .context(CorrespondenceSnafu {})?;
    let output = match &settings.results {
        None => boundaries,
        Some(r) => aggregate_votes(&mut session, &settings, r, &boundaries)?,
    };

    let csv_text = table_to_csv_string(&output)?;
    write_output(settings.output.as_deref(), &csv_text)?;

    let audit = session.take_audit();
    info!(
        "run: {} rows, {} audit events, {} cache hits",
        output.len(),
        audit.len(),
        session.cache().hits()
    );
    if let Some(p) = &settings.audit_out {
        let pretty = serde_json::to_string_pretty(&audit_to_json(&audit, &settings))
            .context(ParsingJsonSnafu { path: p })?;
        write_output(Some(p), &pretty)?;
    }

    // The reference output, if provided for comparison
    if let Some(reference) = &settings.reference {
        check_reference(reference, &csv_text)?;
    }
    Ok(())
}
