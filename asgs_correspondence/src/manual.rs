/*!

This is the long-form manual for `asgs_correspondence` and `ausgeo`.

Australian election results are published against the statistical areas of
the census that preceded them. Comparing two elections, or an election with
census data, means moving the results from one edition of the Australian
Statistical Geography Standard (ASGS) to another. This crate builds the
tables that do that move.

## Geographies

The following geographies are supported:
* `CD 2006` Census Collection Districts, used by the 2010 federal election
* `SA1 2011`, `SA1 2016`, `SA1 2021` Statistical Areas Level 1
* `CED` Commonwealth Electoral Divisions, for the 2011, 2016, 2018, 2021 and 2024 editions
* `POA` Postal Areas, for the 2011, 2016 and 2021 editions

Each edition only exists as a set of codes: a code of one edition is never
compared directly with a code of another edition.

## Events and targets

An event is an election or a referendum. It is known by its id (`2010`,
`2013`, `2016`, `2019`, `2022`, `2023 Referendum`, `2025`) and names the
geography its results are coded against.

A comparison target is either another event, meaning "the divisions in force
at that event", or one of the census and postcode targets (`Census 2011`,
`Census 2016`, `Census 2021`, `POA 2011`, `POA 2016`, `POA 2021`).

Mapping to an older edition is not possible: the 2022 results cannot be
expressed in the 2016 divisions.

Run `ausgeo --list` to print every known event and target.

## Output

For an SA1 target the output is a correspondence table:

| CD_CODE_2006 | SA1_CODE_2021 | RATIO_06CD_21SA1 |
|--------------|---------------|------------------|
| 1010101      | 10101100101   | 0.6              |
| 1010101      | 10101100102   | 0.4              |

The ratio column is always named `RATIO_<from>_<to>` and holds the share of
the source area that falls in the target area. The ratios of one source area
sum to 1.

For a division or postal target the allocation of the target unit is joined
on: each row also carries the unit name (`CED_NAME_2021`, `POA_NAME_2016`,
...) and the 7-digit SA1 code used by the AEC (`SA1_7DIGITCODE_2021`).
Postal areas and recent divisions are built from Mesh Blocks, and an SA1 can
straddle two units. Such an SA1 is assigned to the unit holding most of its
Mesh Blocks, and the number of split SA1s is reported.

## Strict and lenient mode

The published correspondences do not always sum to 1 exactly. In strict mode
(the default) the source areas whose ratios do not sum to 1 within the
tolerance (0.01 by default) are dropped. With `--lenient` they are kept and
reported. In both cases the number of affected areas is written to the log
and to the audit file.

## Redistributions

When divisions are redrawn between two censuses, the ABS files lag behind.
The AEC spreadsheets of the Victorian and Western Australian redistributions
(`Vic_WA`, used for the 2022 election) and of the Northern Territory
redistribution (`NT`, used for the 2025 election) are applied on top of the
ABS divisions. Spreadsheets coded against 2016 SA1s are translated to 2021
SA1s first: each 2021 SA1 takes the division of the 2016 SA1 that contributes
the largest share of it. Rows of the spreadsheet whose 2016 SA1 is outweighed
in every 2021 SA1 it overlaps are counted separately from the rows that match
nothing.

## Results

With `--votes`, a CSV of votes is re-expressed in the output units:

```text
ausgeo --event 2019 --compare-to 2022 \
    --votes votes_2019.csv --votes-code-column SA1_7DIGITCODE_2016 \
    --value-columns ALP,LNP --out results.csv
```

Every value column is multiplied by the ratio and summed per unit. Votes that
do not match any area are kept under an empty unit name, so that totals are
preserved.

## Boundary index

The location of every ABS file is read from a JSON index. A default index is
built in; another one can be given with `--index`:

```json
{
  "boundaries": [
    {
      "year": 2021,
      "level": "SA1",
      "type": "correspondence",
      "url": "https://www.abs.gov.au/.../CG_SA1_2016_SA1_2021.csv",
      "headerRow": 1
    }
  ]
}
```

Entries may point to a CSV file, an Excel file (`.xls` or `.xlsx`) or a zip
archive holding one of those (`member` picks the file inside the archive).
Excel entries may list several `sheets`: they are concatenated on the columns
they have in common. Local paths and `file://` URLs are accepted, which is
useful to work offline.

## Run configuration

Instead of flags, a run can be described in a JSON file passed with
`--config`. Flags given on the command line take precedence.

```json
{
  "event": "2016",
  "compareTo": "Census 2021",
  "strict": true,
  "tolerance": 0.01,
  "outputPath": "2016_to_2021.csv",
  "results": {
    "votesPath": "votes_2016.csv",
    "codeColumn": "SA1_7DIGITCODE_2011",
    "valueColumns": ["ALP", "LNP"]
  }
}
```

*/
