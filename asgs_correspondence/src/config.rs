// ********* Geography vocabulary ***********

use std::error::Error;
use std::fmt::Display;

/// The levels at which the ABS publishes boundary files.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum GeoLevel {
    /// Statistical Area Level 1.
    Sa1,
    /// Mesh Block, the smallest building block of the ASGS.
    Mb,
    /// Commonwealth Electoral Division.
    Ced,
    /// State Electoral Division.
    Sed,
    /// Postal Area.
    Poa,
}

impl GeoLevel {
    pub const ALL: [GeoLevel; 5] = [
        GeoLevel::Sa1,
        GeoLevel::Mb,
        GeoLevel::Ced,
        GeoLevel::Sed,
        GeoLevel::Poa,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            GeoLevel::Sa1 => "SA1",
            GeoLevel::Mb => "MB",
            GeoLevel::Ced => "CED",
            GeoLevel::Sed => "SED",
            GeoLevel::Poa => "POA",
        }
    }

    pub fn parse(s: &str) -> Option<GeoLevel> {
        GeoLevel::ALL
            .iter()
            .find(|l| l.label().eq_ignore_ascii_case(s.trim()))
            .copied()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum FileType {
    /// Assigns each fine area to the coarser unit that contains it.
    Allocation,
    /// Apportions areas of one edition to the areas of the next edition.
    Correspondence,
}

impl FileType {
    pub fn label(&self) -> &'static str {
        match self {
            FileType::Allocation => "allocation",
            FileType::Correspondence => "correspondence",
        }
    }

    pub fn parse(s: &str) -> Option<FileType> {
        match s.trim().to_lowercase().as_str() {
            "allocation" => Some(FileType::Allocation),
            "correspondence" => Some(FileType::Correspondence),
            _ => None,
        }
    }
}

/// A request for one raw boundary file.
///
/// Correspondence files are keyed by the vintage they map *into*: the 2016
/// SA1 correspondence is the one from the 2011 SA1s to the 2016 SA1s.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct BoundaryRequest {
    pub year: u16,
    pub level: GeoLevel,
    pub file_type: FileType,
}

impl BoundaryRequest {
    pub fn allocation(year: u16, level: GeoLevel) -> BoundaryRequest {
        BoundaryRequest {
            year,
            level,
            file_type: FileType::Allocation,
        }
    }

    pub fn correspondence(year: u16, level: GeoLevel) -> BoundaryRequest {
        BoundaryRequest {
            year,
            level,
            file_type: FileType::Correspondence,
        }
    }
}

impl Display for BoundaryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.level.label(),
            self.year,
            self.file_type.label()
        )
    }
}

/// The kind of area an election is natively coded against.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum AreaKind {
    /// Census Collection District (2006 Census and earlier).
    CollectionDistrict,
    Sa1,
}

/// An area type at a given ASGS vintage.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct Geography {
    pub kind: AreaKind,
    pub year: u16,
}

impl Geography {
    pub fn cd(year: u16) -> Geography {
        Geography {
            kind: AreaKind::CollectionDistrict,
            year,
        }
    }

    pub fn sa1(year: u16) -> Geography {
        Geography {
            kind: AreaKind::Sa1,
            year,
        }
    }

    /// The column holding the full code of this geography.
    pub fn code_column(&self) -> String {
        match self.kind {
            AreaKind::CollectionDistrict => format!("CD_CODE_{}", self.year),
            AreaKind::Sa1 => sa1_code_column(self.year),
        }
    }

    /// Short form used in ratio column names, e.g. `06CD` or `21SA1`.
    pub fn abbrev(&self) -> String {
        let kind = match self.kind {
            AreaKind::CollectionDistrict => "CD",
            AreaKind::Sa1 => "SA1",
        };
        format!("{:02}{}", self.year % 100, kind)
    }
}

impl Display for Geography {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            AreaKind::CollectionDistrict => write!(f, "CD {}", self.year),
            AreaKind::Sa1 => write!(f, "SA1 {}", self.year),
        }
    }
}

/// The 11-digit SA1 column. The 2021 edition dropped the `MAINCODE` naming.
pub fn sa1_code_column(year: u16) -> String {
    if year >= 2021 {
        format!("SA1_CODE_{}", year)
    } else {
        format!("SA1_MAINCODE_{}", year)
    }
}

/// The 7-digit SA1 column, as used in AEC vote files.
pub fn sa1_short_column(year: u16) -> String {
    format!("SA1_7DIGITCODE_{}", year)
}

pub fn mb_code_column(year: u16) -> String {
    format!("MB_CODE_{}", year)
}

/// Name of the ratio column produced when apportioning `from` into `to`.
pub fn ratio_column(from: &Geography, to: &Geography) -> String {
    format!("RATIO_{}_{}", from.abbrev(), to.abbrev())
}

/// Prefix shared by every ratio column; consumers locate the column with it.
pub const RATIO_PREFIX: &str = "RATIO_";

/// Raw ratio columns found in ABS correspondence files, by preference.
pub const RAW_RATIO_COLUMNS: [&str; 2] = ["RATIO_FROM_TO", "RATIO"];

pub const DEFAULT_TOLERANCE: f64 = 0.01;

// ********* Comparison targets ***********

/// The unit type a comparison ends at.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum UnitType {
    Sa1,
    Ced,
    Poa,
}

impl UnitType {
    pub fn level(&self) -> GeoLevel {
        match self {
            UnitType::Sa1 => GeoLevel::Sa1,
            UnitType::Ced => GeoLevel::Ced,
            UnitType::Poa => GeoLevel::Poa,
        }
    }

    /// The column holding the unit name for a given vintage.
    pub fn name_column(&self, year: u16) -> String {
        match self {
            UnitType::Sa1 => sa1_code_column(year),
            UnitType::Ced => format!("CED_NAME_{}", year),
            UnitType::Poa => format!("POA_NAME_{}", year),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct GeoTarget {
    pub unit: UnitType,
    /// The SA1 edition the target is expressed in.
    pub sa1_year: u16,
    /// The edition of the unit itself (e.g. CED 2024 is built from 2021 SA1s).
    pub unit_year: u16,
    pub redistribution: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct EventGeography {
    pub id: String,
    pub description: String,
    /// The geography the event's results are published against.
    pub base: Geography,
    /// What another event gets when it asks to be compared to this one.
    pub target: Option<GeoTarget>,
}

/// Census and postcode targets, which are not tied to an event.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NamedTarget {
    pub id: String,
    pub description: String,
    pub target: GeoTarget,
}

/// One edge of the vintage graph: a single published correspondence file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CorrespondenceHop {
    pub from: Geography,
    pub to: Geography,
    pub request: BoundaryRequest,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AllocationRoute {
    /// The ABS publishes the unit against SA1 codes.
    Direct,
    /// Only a Mesh Block file exists; SA1s come from the Mesh Block file of `mb_year`.
    ViaMeshBlock { mb_year: u16 },
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AllocationSpec {
    pub unit: UnitType,
    pub unit_year: u16,
    pub sa1_year: u16,
    pub route: AllocationRoute,
}

/// Where to get a table that is not part of the boundary index.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct TableSource {
    pub url: String,
    /// File to pick inside a zip archive.
    pub member: Option<String>,
    /// Worksheet to read for Excel sources; the first sheet otherwise.
    pub sheet: Option<String>,
    /// 1-based row holding the column names.
    pub header_row: usize,
}

impl Display for TableSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)?;
        if let Some(m) = &self.member {
            write!(f, " [{}]", m)?;
        }
        if let Some(s) = &self.sheet {
            write!(f, " <{}>", s)?;
        }
        Ok(())
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RedistributionSource {
    pub label: String,
    pub source: TableSource,
    pub code_column: String,
    pub division_column: String,
    /// SA1 edition of the codes in the file.
    pub code_year: u16,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RedistributionSpec {
    pub id: String,
    pub description: String,
    /// SA1 edition of the tables being patched.
    pub sa1_year: u16,
    /// The CED name column that gets overwritten.
    pub division_field: String,
    pub sources: Vec<RedistributionSource>,
}

/// The static tables driving the orchestration.
///
/// Everything the orchestrator needs to know about events, editions and
/// published files lives here, so that supporting a new edition is a matter
/// of adding rows.
#[derive(PartialEq, Debug, Clone)]
pub struct GeographyConfig {
    pub events: Vec<EventGeography>,
    pub targets: Vec<NamedTarget>,
    pub hops: Vec<CorrespondenceHop>,
    pub allocations: Vec<AllocationSpec>,
    pub redistributions: Vec<RedistributionSpec>,
}

impl GeographyConfig {
    pub fn event(&self, id: &str) -> Option<&EventGeography> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Resolves a comparison target: a census/postcode target or another event.
    pub fn target(&self, id: &str) -> Option<&GeoTarget> {
        self.targets
            .iter()
            .find(|t| t.id == id)
            .map(|t| &t.target)
            .or_else(|| self.event(id).and_then(|e| e.target.as_ref()))
    }

    pub fn allocation(&self, unit: UnitType, unit_year: u16) -> Option<&AllocationSpec> {
        self.allocations
            .iter()
            .find(|a| a.unit == unit && a.unit_year == unit_year)
    }

    pub fn redistribution(&self, id: &str) -> Option<&RedistributionSpec> {
        self.redistributions.iter().find(|r| r.id == id)
    }

    /// The sequence of hops going from `from` to `to`, found by a forward
    /// breadth-first search over the configured hops.
    ///
    /// Returns an empty path when both ends are the same geography and `None`
    /// when no pathway exists.
    pub fn hop_path(&self, from: &Geography, to: &Geography) -> Option<Vec<&CorrespondenceHop>> {
        if from == to {
            return Some(Vec::new());
        }
        let mut frontier: Vec<(Geography, Vec<&CorrespondenceHop>)> = vec![(*from, Vec::new())];
        let mut seen: Vec<Geography> = vec![*from];
        while !frontier.is_empty() {
            let mut next: Vec<(Geography, Vec<&CorrespondenceHop>)> = Vec::new();
            for (node, path) in frontier.iter() {
                for hop in self.hops.iter() {
                    // Editions only ever map forward in time.
                    if hop.from != *node || hop.to.year <= hop.from.year || seen.contains(&hop.to) {
                        continue;
                    }
                    let mut p = path.clone();
                    p.push(hop);
                    if hop.to == *to {
                        return Some(p);
                    }
                    seen.push(hop.to);
                    next.push((hop.to, p));
                }
            }
            frontier = next;
        }
        None
    }

    /// The Australian events, editions and files known to the tool.
    pub fn australia() -> GeographyConfig {
        let ced = |sa1_year: u16, unit_year: u16, redistribution: Option<&str>| GeoTarget {
            unit: UnitType::Ced,
            sa1_year,
            unit_year,
            redistribution: redistribution.map(|s| s.to_string()),
        };
        let event = |id: &str, description: &str, base: Geography, target: Option<GeoTarget>| {
            EventGeography {
                id: id.to_string(),
                description: description.to_string(),
                base,
                target,
            }
        };
        let named = |id: &str, description: &str, unit: UnitType, year: u16| NamedTarget {
            id: id.to_string(),
            description: description.to_string(),
            target: GeoTarget {
                unit,
                sa1_year: year,
                unit_year: year,
                redistribution: None,
            },
        };

        GeographyConfig {
            events: vec![
                event(
                    "2010",
                    "2010 federal election",
                    Geography::cd(2006),
                    Some(ced(2011, 2011, None)),
                ),
                event(
                    "2013",
                    "2013 federal election",
                    Geography::sa1(2011),
                    Some(ced(2011, 2011, None)),
                ),
                event(
                    "2016",
                    "2016 federal election",
                    Geography::sa1(2011),
                    Some(ced(2016, 2016, None)),
                ),
                event(
                    "2019",
                    "2019 federal election",
                    Geography::sa1(2016),
                    Some(ced(2016, 2018, None)),
                ),
                event(
                    "2022",
                    "2022 federal election",
                    Geography::sa1(2021),
                    Some(ced(2021, 2021, Some("Vic_WA"))),
                ),
                event(
                    "2023 Referendum",
                    "2023 Voice referendum",
                    Geography::sa1(2021),
                    Some(ced(2021, 2021, Some("Vic_WA"))),
                ),
                event(
                    "2025",
                    "2025 federal election",
                    Geography::sa1(2021),
                    Some(ced(2021, 2024, Some("NT"))),
                ),
            ],
            targets: vec![
                named("Census 2011", "2011 Census SA1s", UnitType::Sa1, 2011),
                named("Census 2016", "2016 Census SA1s", UnitType::Sa1, 2016),
                named("Census 2021", "2021 Census SA1s", UnitType::Sa1, 2021),
                named("POA 2011", "2011 postal areas", UnitType::Poa, 2011),
                named("POA 2016", "2016 postal areas", UnitType::Poa, 2016),
                named("POA 2021", "2021 postal areas", UnitType::Poa, 2021),
            ],
            hops: vec![
                CorrespondenceHop {
                    from: Geography::cd(2006),
                    to: Geography::sa1(2011),
                    request: BoundaryRequest::correspondence(2011, GeoLevel::Sa1),
                },
                CorrespondenceHop {
                    from: Geography::sa1(2011),
                    to: Geography::sa1(2016),
                    request: BoundaryRequest::correspondence(2016, GeoLevel::Sa1),
                },
                CorrespondenceHop {
                    from: Geography::sa1(2016),
                    to: Geography::sa1(2021),
                    request: BoundaryRequest::correspondence(2021, GeoLevel::Sa1),
                },
            ],
            allocations: vec![
                AllocationSpec {
                    unit: UnitType::Ced,
                    unit_year: 2011,
                    sa1_year: 2011,
                    route: AllocationRoute::Direct,
                },
                AllocationSpec {
                    unit: UnitType::Ced,
                    unit_year: 2016,
                    sa1_year: 2016,
                    route: AllocationRoute::Direct,
                },
                AllocationSpec {
                    unit: UnitType::Ced,
                    unit_year: 2018,
                    sa1_year: 2016,
                    route: AllocationRoute::Direct,
                },
                AllocationSpec {
                    unit: UnitType::Ced,
                    unit_year: 2021,
                    sa1_year: 2021,
                    route: AllocationRoute::ViaMeshBlock { mb_year: 2021 },
                },
                AllocationSpec {
                    unit: UnitType::Ced,
                    unit_year: 2024,
                    sa1_year: 2021,
                    route: AllocationRoute::ViaMeshBlock { mb_year: 2021 },
                },
                AllocationSpec {
                    unit: UnitType::Poa,
                    unit_year: 2011,
                    sa1_year: 2011,
                    route: AllocationRoute::Direct,
                },
                AllocationSpec {
                    unit: UnitType::Poa,
                    unit_year: 2016,
                    sa1_year: 2016,
                    route: AllocationRoute::ViaMeshBlock { mb_year: 2016 },
                },
                AllocationSpec {
                    unit: UnitType::Poa,
                    unit_year: 2021,
                    sa1_year: 2021,
                    route: AllocationRoute::ViaMeshBlock { mb_year: 2021 },
                },
            ],
            redistributions: vec![
                RedistributionSpec {
                    id: "Vic_WA".to_string(),
                    description: "2021 Victorian and Western Australian redistributions"
                        .to_string(),
                    sa1_year: 2021,
                    division_field: UnitType::Ced.name_column(2021),
                    sources: vec![
                        RedistributionSource {
                            label: "Victoria 2021".to_string(),
                            source: TableSource {
                                url: "https://www.aec.gov.au/redistributions/2021/vic/final-report/files/vic-final-sa1-and-divisions.xlsx".to_string(),
                                member: None,
                                sheet: None,
                                header_row: 1,
                            },
                            code_column: "SA1 Code (2016 SA1s)".to_string(),
                            division_column: "New Division".to_string(),
                            code_year: 2016,
                        },
                        RedistributionSource {
                            label: "Western Australia 2021".to_string(),
                            source: TableSource {
                                url: "https://www.aec.gov.au/redistributions/2021/wa/final-report/files/wa-final-sa1-and-divisions.xlsx".to_string(),
                                member: None,
                                sheet: None,
                                header_row: 1,
                            },
                            code_column: "SA1 Code (2016 SA1s)".to_string(),
                            division_column: "New Division".to_string(),
                            code_year: 2016,
                        },
                    ],
                },
                RedistributionSpec {
                    id: "NT".to_string(),
                    description: "2024 Northern Territory redistribution".to_string(),
                    sa1_year: 2021,
                    division_field: UnitType::Ced.name_column(2024),
                    sources: vec![RedistributionSource {
                        label: "Northern Territory 2024".to_string(),
                        source: TableSource {
                            url: "https://www.aec.gov.au/redistributions/2024/nt/final-report/files/nt-final-sa1-and-divisions.xlsx".to_string(),
                            member: None,
                            sheet: None,
                            header_row: 1,
                        },
                        code_column: "SA1 Code (2021 SA1s)".to_string(),
                        division_column: "New Division".to_string(),
                        code_year: 2021,
                    }],
                },
            ],
        }
    }
}

impl Default for GeographyConfig {
    fn default() -> Self {
        GeographyConfig::australia()
    }
}

// ********* Errors ***********

/// Errors that prevent an operation from completing.
///
/// Recoverable data problems (ratio violations, unmatched patch rows) are not
/// errors: they are reported in the audit log.
#[derive(PartialEq, Debug, Clone)]
pub enum GeoErrors {
    UnknownEvent(String),
    UnknownTarget(String),
    /// ASGS editions cannot be mapped backward in time.
    BackwardMapping {
        event: String,
        base: Geography,
        target_sa1_year: u16,
    },
    /// No correspondence pathway exists between these editions.
    UnsupportedCombination {
        base: Geography,
        target_sa1_year: u16,
    },
    MissingAllocation {
        unit: UnitType,
        year: u16,
    },
    UnknownRedistribution(String),
    /// A redistribution needs translating older SA1 codes but no bridge was given.
    MissingBridge {
        redistribution: String,
        code_year: u16,
    },
    MissingColumn {
        column: String,
        available: Vec<String>,
    },
    RowWidth {
        expected: usize,
        found: usize,
    },
    /// The upstream resource could not be obtained.
    Unavailable {
        resource: String,
        message: String,
    },
    EmptyTable {
        resource: String,
    },
}

impl Error for GeoErrors {}

impl Display for GeoErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoErrors::UnknownEvent(e) => write!(f, "unknown event {:?}", e),
            GeoErrors::UnknownTarget(t) => write!(f, "unknown comparison target {:?}", t),
            GeoErrors::BackwardMapping {
                event,
                base,
                target_sa1_year,
            } => write!(
                f,
                "cannot map event {:?} ({}) backward to SA1 {}",
                event, base, target_sa1_year
            ),
            GeoErrors::UnsupportedCombination {
                base,
                target_sa1_year,
            } => write!(
                f,
                "unsupported combination: no correspondence from {} to SA1 {}",
                base, target_sa1_year
            ),
            GeoErrors::MissingAllocation { unit, year } => {
                write!(f, "no allocation table configured for {:?} {}", unit, year)
            }
            GeoErrors::UnknownRedistribution(r) => write!(f, "unknown redistribution {:?}", r),
            GeoErrors::MissingBridge {
                redistribution,
                code_year,
            } => write!(
                f,
                "redistribution {:?} uses SA1 {} codes and needs a bridge table",
                redistribution, code_year
            ),
            GeoErrors::MissingColumn { column, available } => write!(
                f,
                "missing column {:?} (available: {})",
                column,
                available.join(", ")
            ),
            GeoErrors::RowWidth { expected, found } => write!(
                f,
                "row has {} cells but the table has {} columns",
                found, expected
            ),
            GeoErrors::Unavailable { resource, message } => {
                write!(f, "could not obtain {}: {}", resource, message)
            }
            GeoErrors::EmptyTable { resource } => write!(f, "{} is empty", resource),
        }
    }
}

pub type GeoResult<T> = Result<T, GeoErrors>;
