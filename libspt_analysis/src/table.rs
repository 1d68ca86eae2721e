//! Ragged per-particle tables (speed sequences, MSD curves).
//!
//! A [`ParticleTable`] has one shared index (row number or lag time) and one column per
//! particle. Columns of different lengths are padded with explicit missing values, and
//! tables from different samples can be concatenated side by side.
use std::path::Path;

use super::error::TableError;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| v.is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticleTable {
    index_name: String,
    index: Vec<f64>,
    columns: Vec<Column>,
}

impl ParticleTable {
    /// Create an empty table with the given index values
    pub fn new(index_name: &str, index: Vec<f64>) -> Self {
        Self {
            index_name: index_name.to_string(),
            index,
            columns: Vec::new(),
        }
    }

    /// Create a table from columns that have exactly one value per index row
    pub fn from_columns(
        index_name: &str,
        index: Vec<f64>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self, TableError> {
        let mut table = Self::new(index_name, index);
        for (label, values) in columns {
            table.push_column(label, values)?;
        }
        Ok(table)
    }

    /// Create a single column table from `(index, value)` points
    pub fn from_series(index_name: &str, label: &str, points: &[(f64, f64)]) -> Self {
        Self {
            index_name: index_name.to_string(),
            index: points.iter().map(|(index, _)| *index).collect(),
            columns: vec![Column {
                label: label.to_string(),
                values: points.iter().map(|(_, value)| Some(*value)).collect(),
            }],
        }
    }

    /// Create a table from sequences of different lengths. The index is the row
    /// number and short columns are padded with missing values.
    pub fn from_ragged(index_name: &str, columns: Vec<(String, Vec<f64>)>) -> Self {
        let n_rows = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let mut table = Self::new(index_name, (0..n_rows).map(|r| r as f64).collect());
        for (label, values) in columns {
            let mut padded: Vec<Option<f64>> = values.into_iter().map(Some).collect();
            padded.resize(n_rows, None);
            table.columns.push(Column {
                label,
                values: padded,
            });
        }
        table
    }

    /// Append a column, which must have exactly one value per index row
    pub fn push_column(
        &mut self,
        label: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), TableError> {
        let label = label.into();
        if values.len() != self.index.len() {
            return Err(TableError::LengthMismatch {
                label,
                given: values.len(),
                expected: self.index.len(),
            });
        }
        self.columns.push(Column { label, values });
        Ok(())
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &[f64] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, label: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.label == label)
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Value at a given row and column position
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        self.columns.get(column)?.values.get(row).copied().flatten()
    }

    /// Concatenate tables side by side.
    ///
    /// Rows are aligned by index value; the result's index is the sorted union of all
    /// indices and every cell a table does not cover is missing. Duplicate column labels
    /// are kept as they are.
    pub fn hconcat(tables: &[ParticleTable]) -> ParticleTable {
        let index_name = tables
            .first()
            .map(|t| t.index_name.clone())
            .unwrap_or_default();
        let mut index: Vec<f64> = tables.iter().flat_map(|t| t.index.iter().copied()).collect();
        index.sort_by(|a, b| a.total_cmp(b));
        index.dedup();

        let mut combined = ParticleTable {
            index_name,
            index,
            columns: Vec::new(),
        };
        for table in tables {
            let positions: Vec<Option<usize>> = combined
                .index
                .iter()
                .map(|value| table.index.iter().position(|v| v == value))
                .collect();
            for column in table.columns.iter() {
                let values = positions
                    .iter()
                    .map(|pos| pos.and_then(|p| column.values[p]))
                    .collect();
                combined.columns.push(Column {
                    label: column.label.clone(),
                    values,
                });
            }
        }
        combined
    }

    /// All present values, row by row
    pub fn flatten_values(&self) -> Vec<f64> {
        (0..self.n_rows())
            .flat_map(|row| self.columns.iter().filter_map(move |c| c.values[row]))
            .collect()
    }

    /// Mean of the present values in every row; None for rows with no values
    pub fn row_means(&self) -> Vec<Option<f64>> {
        (0..self.n_rows())
            .map(|row| {
                let (sum, count) = self
                    .columns
                    .iter()
                    .filter_map(|c| c.values[row])
                    .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                if count == 0 {
                    None
                } else {
                    Some(sum / count as f64)
                }
            })
            .collect()
    }

    /// Copy of the table without any column that has a missing value
    pub fn complete_columns(&self) -> ParticleTable {
        ParticleTable {
            index_name: self.index_name.clone(),
            index: self.index.clone(),
            columns: self
                .columns
                .iter()
                .filter(|c| c.is_complete())
                .cloned()
                .collect(),
        }
    }

    /// Read a table written by [`ParticleTable::write_csv`].
    ///
    /// The first column is the index. Empty cells and `nan` are missing values.
    pub fn read_csv(path: &Path) -> Result<Self, TableError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let mut header_iter = headers.iter();
        let index_name = match header_iter.next() {
            Some(name) => name.to_string(),
            None => return Err(TableError::MissingHeader(path.to_path_buf())),
        };
        let mut columns: Vec<Column> = header_iter
            .map(|label| Column {
                label: label.to_string(),
                values: Vec::new(),
            })
            .collect();

        let mut index = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let mut cells = record.iter();
            match cells.next().map(parse_cell) {
                Some(Ok(Some(value))) => index.push(value),
                _ => {
                    return Err(TableError::BadValue {
                        row,
                        column: 0,
                        value: record.get(0).unwrap_or_default().to_string(),
                    })
                }
            }
            for (col, cell) in cells.enumerate() {
                match parse_cell(cell) {
                    Ok(value) => columns[col].values.push(value),
                    Err(()) => {
                        return Err(TableError::BadValue {
                            row,
                            column: col + 1,
                            value: cell.to_string(),
                        })
                    }
                }
            }
        }

        Ok(Self {
            index_name,
            index,
            columns,
        })
    }

    /// Write the table with the index as first column and blank cells for missing values
    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut header = vec![self.index_name.clone()];
        header.extend(self.columns.iter().map(|c| c.label.clone()));
        writer.write_record(&header)?;
        for (row, value) in self.index.iter().enumerate() {
            let mut record = vec![value.to_string()];
            record.extend(self.columns.iter().map(|c| match c.values[row] {
                Some(v) => v.to_string(),
                None => String::new(),
            }));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn parse_cell(cell: &str) -> Result<Option<f64>, ()> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    cell.parse::<f64>().map(Some).map_err(|_| ())
}
