//! A minimal in-memory table.
//!
//! Boundary files are small enough (a few hundred thousand rows at most) to
//! be held as rows of cells. Only the handful of relational operations that
//! the correspondence chaining needs are provided.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use crate::config::{GeoErrors, GeoResult};

/// A single cell.
#[derive(PartialEq, Debug, Clone)]
pub enum Value {
    Null,
    Text(String),
    Number(f64),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The cell read as an area code.
    ///
    /// Spreadsheets often store codes as numbers: integral numbers are
    /// printed without a fractional part so that `1010101.0` becomes
    /// `"1010101"`. Blank text is treated as missing.
    pub fn as_code(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) if s.trim().is_empty() => None,
            Value::Text(s) => Some(s.trim().to_string()),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Value::Number(n) => Some(n.to_string()),
        }
    }

    /// The cell read as a finite number.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Value::Null => None,
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
        };
        n.filter(|x| x.is_finite())
    }

    // Hashable identity of a cell, used for grouping and joining.
    fn key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(format!("t{}", s)),
            Value::Number(n) => Some(format!("n{}", n.to_bits())),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

type RowKey = Vec<Option<String>>;

fn row_key(row: &[Value], idxs: &[usize]) -> RowKey {
    idxs.iter().map(|i| row[*i].key()).collect()
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Table {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: &[&str], rows: Vec<Vec<Value>>) -> GeoResult<Table> {
        let mut t = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            t.push_row(row)?;
        }
        Ok(t)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> GeoResult<()> {
        if row.len() != self.columns.len() {
            return Err(GeoErrors::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> GeoResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| GeoErrors::MissingColumn {
                column: name.to_string(),
                available: self.columns.clone(),
            })
    }

    fn column_indexes(&self, names: &[&str]) -> GeoResult<Vec<usize>> {
        names.iter().map(|n| self.column_index(n)).collect()
    }

    /// The first column whose name starts with `prefix`.
    pub fn find_column(&self, prefix: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.starts_with(prefix))
            .map(|c| c.as_str())
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Replaces one cell, returning the previous value.
    pub fn set_cell(&mut self, row: usize, column: usize, value: Value) -> Value {
        std::mem::replace(&mut self.rows[row][column], value)
    }

    pub fn select(&self, names: &[&str]) -> GeoResult<Table> {
        let idxs = self.column_indexes(names)?;
        Ok(Table {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| idxs.iter().map(|i| r[*i].clone()).collect())
                .collect(),
        })
    }

    pub fn drop_column(mut self, name: &str) -> GeoResult<Table> {
        let idx = self.column_index(name)?;
        self.columns.remove(idx);
        for r in self.rows.iter_mut() {
            r.remove(idx);
        }
        Ok(self)
    }

    pub fn rename(mut self, from: &str, to: &str) -> GeoResult<Table> {
        let idx = self.column_index(from)?;
        self.columns[idx] = to.to_string();
        Ok(self)
    }

    pub fn map_column(mut self, name: &str, f: impl Fn(&Value) -> Value) -> GeoResult<Table> {
        let idx = self.column_index(name)?;
        for r in self.rows.iter_mut() {
            r[idx] = f(&r[idx]);
        }
        Ok(self)
    }

    /// Casts the given columns to text codes.
    pub fn cast_codes(self, names: &[&str]) -> GeoResult<Table> {
        let mut t = self;
        for n in names {
            t = t.map_column(n, |v| v.as_code().map(Value::Text).unwrap_or(Value::Null))?;
        }
        Ok(t)
    }

    pub fn cast_numbers(self, name: &str) -> GeoResult<Table> {
        self.map_column(name, |v| v.as_number().map(Value::Number).unwrap_or(Value::Null))
    }

    /// Appends a column computed from an existing one.
    pub fn derive_column(
        mut self,
        name: &str,
        from: &str,
        f: impl Fn(&Value) -> Value,
    ) -> GeoResult<Table> {
        let idx = self.column_index(from)?;
        self.columns.push(name.to_string());
        for r in self.rows.iter_mut() {
            let v = f(&r[idx]);
            r.push(v);
        }
        Ok(self)
    }

    pub fn filter(mut self, mut pred: impl FnMut(&[Value]) -> bool) -> Table {
        self.rows.retain(|r| pred(r));
        self
    }

    /// Removes duplicate rows, keeping the first occurrence.
    pub fn distinct(mut self) -> Table {
        let all: Vec<usize> = (0..self.columns.len()).collect();
        let mut seen: HashSet<RowKey> = HashSet::new();
        self.rows.retain(|r| seen.insert(row_key(r, &all)));
        self
    }

    /// Appends the rows of a table with the same columns.
    pub fn append(&mut self, other: Table) -> GeoResult<()> {
        if other.columns != self.columns {
            let missing = other
                .columns
                .iter()
                .chain(self.columns.iter())
                .find(|c| !(self.has_column(c) && other.has_column(c)))
                .cloned()
                .unwrap_or_default();
            return Err(GeoErrors::MissingColumn {
                column: missing,
                available: self.columns.clone(),
            });
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Columns present in both tables, in the order of `self`.
    pub fn shared_columns(&self, other: &Table) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| other.has_column(c))
            .cloned()
            .collect()
    }

    /// Full outer join on the `on` columns.
    ///
    /// Rows without a partner on either side are kept, with missing cells
    /// set to null. A null key never matches anything.
    pub fn outer_join(&self, other: &Table, on: &[&str]) -> GeoResult<Table> {
        self.join(other, on, true)
    }

    /// Left join on the `on` columns: unmatched rows of `other` are dropped.
    pub fn left_join(&self, other: &Table, on: &[&str]) -> GeoResult<Table> {
        self.join(other, on, false)
    }

    fn join(&self, other: &Table, on: &[&str], keep_right: bool) -> GeoResult<Table> {
        let left_idx = self.column_indexes(on)?;
        let right_idx = other.column_indexes(on)?;
        let right_rest: Vec<usize> = (0..other.columns.len())
            .filter(|i| !right_idx.contains(i))
            .collect();

        let mut columns = self.columns.clone();
        columns.extend(right_rest.iter().map(|i| other.columns[*i].clone()));

        let mut index: HashMap<RowKey, Vec<usize>> = HashMap::new();
        for (ridx, r) in other.rows.iter().enumerate() {
            let k = row_key(r, &right_idx);
            if k.iter().all(|x| x.is_some()) {
                index.entry(k).or_default().push(ridx);
            }
        }

        let mut matched: Vec<bool> = vec![false; other.rows.len()];
        let mut rows: Vec<Vec<Value>> = Vec::new();
        for l in self.rows.iter() {
            let k = row_key(l, &left_idx);
            match index.get(&k) {
                Some(partners) => {
                    for ridx in partners {
                        matched[*ridx] = true;
                        let mut row = l.clone();
                        row.extend(right_rest.iter().map(|i| other.rows[*ridx][*i].clone()));
                        rows.push(row);
                    }
                }
                None => {
                    let mut row = l.clone();
                    row.extend(right_rest.iter().map(|_| Value::Null));
                    rows.push(row);
                }
            }
        }

        if keep_right {
            for (ridx, r) in other.rows.iter().enumerate() {
                if matched[ridx] {
                    continue;
                }
                let mut row: Vec<Value> = vec![Value::Null; self.columns.len()];
                for (li, ri) in left_idx.iter().zip(right_idx.iter()) {
                    row[*li] = r[*ri].clone();
                }
                row.extend(right_rest.iter().map(|i| r[*i].clone()));
                rows.push(row);
            }
        }

        Ok(Table { columns, rows })
    }

    /// Groups by `keys` and sums each of `values`.
    ///
    /// Groups come out in the order they are first seen. Null cells do not
    /// contribute to a sum; a group where every cell is null sums to 0.
    pub fn group_sum(&self, keys: &[&str], values: &[&str]) -> GeoResult<Table> {
        let key_idx = self.column_indexes(keys)?;
        let value_idx = self.column_indexes(values)?;

        let mut order: Vec<(Vec<Value>, Vec<f64>)> = Vec::new();
        let mut positions: HashMap<RowKey, usize> = HashMap::new();
        for r in self.rows.iter() {
            let k = row_key(r, &key_idx);
            let pos = match positions.get(&k) {
                Some(p) => *p,
                None => {
                    let key_values = key_idx.iter().map(|i| r[*i].clone()).collect();
                    order.push((key_values, vec![0.0; value_idx.len()]));
                    positions.insert(k, order.len() - 1);
                    order.len() - 1
                }
            };
            for (slot, vi) in value_idx.iter().enumerate() {
                if let Some(x) = r[*vi].as_number() {
                    order[pos].1[slot] += x;
                }
            }
        }

        let mut columns: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        columns.extend(values.iter().map(|v| v.to_string()));
        let rows = order
            .into_iter()
            .map(|(mut k, sums)| {
                k.extend(sums.into_iter().map(Value::Number));
                k
            })
            .collect();
        Ok(Table { columns, rows })
    }

    /// Distinct non-null codes of a column.
    pub fn codes(&self, column: &str) -> GeoResult<HashSet<String>> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().filter_map(|r| r[idx].as_code()).collect())
    }
}
