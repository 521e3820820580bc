use clap::Parser;

/// Maps Australian election results between electoral and census geographies.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (event id) The election or referendum whose geography is mapped, for example '2019'.
    #[clap(short, long, value_parser)]
    pub event: Option<String>,

    /// (event or target id) What to compare to: another event, or one of the census and postcode
    /// targets ('Census 2021', 'POA 2016', ...). See --list.
    #[clap(long, value_parser)]
    pub compare_to: Option<String>,

    /// (file path, optional) A JSON file describing the run. Other flags override its content.
    /// For more information about the file format, read the documentation of the manual module.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, optional) A JSON boundary index to use instead of the built-in one.
    #[clap(long, value_parser)]
    pub index: Option<String>,

    /// (file path, 'stdout' or empty) Where to write the output table in CSV format.
    /// Setting this option overrides the path that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path, optional) If specified, the audit log of the run is written in JSON format to the given location.
    #[clap(long, value_parser)]
    pub audit_out: Option<String>,

    /// (file path) A reference file containing a previous output in CSV format. If provided, ausgeo will
    /// check that the output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// If passed, areas whose ratios do not sum to 1 are reported but kept.
    #[clap(long, takes_value = false)]
    pub lenient: bool,

    /// (default 0.01) How far the ratios of an area may be from 1.
    #[clap(long, value_parser)]
    pub tolerance: Option<f64>,

    /// (file path or URL, optional) A CSV file of votes to re-express in the output units.
    #[clap(long, value_parser)]
    pub votes: Option<String>,

    /// The column of the vote file holding the area codes.
    #[clap(long, value_parser)]
    pub votes_code_column: Option<String>,

    /// (list of comma-separated values) The columns of the vote file to aggregate.
    #[clap(long, value_parser, value_delimiter = ',')]
    pub value_columns: Option<Vec<String>>,

    /// (column name, optional) The unit column to aggregate to. Defaults to the unit name of the target.
    #[clap(long, value_parser)]
    pub aggregate_to: Option<String>,

    /// If passed, prints the known events and comparison targets and exits.
    #[clap(long, takes_value = false)]
    pub list: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
