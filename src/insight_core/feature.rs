use ndarray::{Array2, ArrayView1};
use tracing::{debug, warn};

use crate::dataset::{Cell, Table};
use crate::utils::IngestError;

/// How rows with a missing or non-numeric value in a selected column are handled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingValues {
    /// Exclude the row and report it
    #[default]
    Exclude,
    /// Fill missing cells with the column mean; rows with text cells are still excluded
    ImputeMean,
}

/// Validated numeric rows for the selected features.
///
/// Every row has exactly `n_features()` finite values and keeps the index of
/// the table record it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    feature_names: Vec<String>,
    features: Array2<f64>,
    row_indices: Vec<usize>,
}

impl Dataset {
    /// Build a dataset from in-memory rows; row `i` gets index `i`
    pub fn from_rows(feature_names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, IngestError> {
        if feature_names.is_empty() {
            return Err(IngestError::NoNumericColumns);
        }
        if rows.is_empty() {
            return Err(IngestError::EmptyAfterFiltering { excluded: 0 });
        }

        let n_features = feature_names.len();
        for (row, values) in rows.iter().enumerate() {
            if values.len() != n_features {
                return Err(IngestError::RaggedRow {
                    row,
                    expected: n_features,
                    actual: values.len(),
                });
            }
            if let Some(feature) = values.iter().position(|v| !v.is_finite()) {
                return Err(IngestError::NonFiniteValue { row, feature });
            }
        }

        let row_indices = (0..rows.len()).collect();
        Ok(Self::from_validated(feature_names, &rows, row_indices))
    }

    fn from_validated(feature_names: Vec<String>, rows: &[Vec<f64>], row_indices: Vec<usize>) -> Self {
        let mut features = Array2::<f64>::zeros((rows.len(), feature_names.len()));
        for (mut target, values) in features.rows_mut().into_iter().zip(rows) {
            for (slot, &value) in target.iter_mut().zip(values) {
                *slot = value;
            }
        }
        Self {
            feature_names,
            features,
            row_indices,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Feature matrix (rows=samples, cols=features)
    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    /// Source table index of each row, in dataset order
    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    /// Values of the row at dataset position `pos`
    pub fn row(&self, pos: usize) -> ArrayView1<'_, f64> {
        self.features.row(pos)
    }

    /// Iterate `(source_index, values)` in dataset order
    pub fn rows(&self) -> impl Iterator<Item = (usize, ArrayView1<'_, f64>)> + '_ {
        self.row_indices
            .iter()
            .copied()
            .zip(self.features.rows())
    }
}

/// Outcome of ingesting a table
#[derive(Debug, Clone)]
pub struct Ingested {
    pub dataset: Dataset,
    /// Table indices of rows left out by [`MissingValues::Exclude`]
    pub excluded_rows: Vec<usize>,
    /// Cells filled by [`MissingValues::ImputeMean`]
    pub imputed_cells: usize,
}

impl Ingested {
    pub fn excluded_count(&self) -> usize {
        self.excluded_rows.len()
    }
}

/// Extract the selected numeric columns of `table`, excluding incomplete rows
pub fn ingest<S: AsRef<str>>(table: &Table, selected: &[S]) -> Result<Ingested, IngestError> {
    ingest_with(table, selected, MissingValues::Exclude)
}

/// Extract the selected numeric columns of `table` with an explicit missing-value policy
///
/// # Errors
/// * `NoNumericColumns` - selection is empty or no selected column is numeric
/// * `UnknownColumn` - a selected name is not a column of the table
/// * `NonNumericColumn` - a selected column is not numeric while others are
/// * `EmptyAfterFiltering` - every row was excluded
pub fn ingest_with<S: AsRef<str>>(
    table: &Table,
    selected: &[S],
    policy: MissingValues,
) -> Result<Ingested, IngestError> {
    let mut feature_names: Vec<String> = Vec::with_capacity(selected.len());
    for name in selected.iter().map(AsRef::as_ref) {
        if !feature_names.iter().any(|n| n == name) {
            feature_names.push(name.to_string());
        }
    }
    if feature_names.is_empty() {
        return Err(IngestError::NoNumericColumns);
    }

    let mut non_numeric = Vec::new();
    for name in &feature_names {
        match table.column_type(name) {
            None => return Err(IngestError::UnknownColumn(name.clone())),
            Some(column_type) if !column_type.is_numeric() => non_numeric.push(name),
            Some(_) => {}
        }
    }
    if non_numeric.len() == feature_names.len() {
        return Err(IngestError::NoNumericColumns);
    }
    if let Some(name) = non_numeric.first() {
        return Err(IngestError::NonNumericColumn((*name).clone()));
    }

    // `None` marks a row with a text cell; those rows are never imputed
    let cells: Vec<Option<Vec<Option<f64>>>> = table
        .records
        .iter()
        .map(|record| {
            feature_names
                .iter()
                .map(|name| match record.get_field(name) {
                    Cell::Number(v) => Some(Some(*v)),
                    Cell::Missing => Some(None),
                    Cell::Text(_) => None,
                })
                .collect()
        })
        .collect();

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(cells.len());
    let mut row_indices = Vec::with_capacity(cells.len());
    let mut excluded_rows = Vec::new();
    let mut imputed_cells = 0;

    match policy {
        MissingValues::Exclude => {
            for (index, values) in cells.into_iter().enumerate() {
                match values.and_then(|v| v.into_iter().collect::<Option<Vec<f64>>>()) {
                    Some(row) => {
                        rows.push(row);
                        row_indices.push(index);
                    }
                    None => excluded_rows.push(index),
                }
            }
        }
        MissingValues::ImputeMean => {
            let means = column_means(&cells, feature_names.len());
            for (index, values) in cells.into_iter().enumerate() {
                let Some(values) = values else {
                    excluded_rows.push(index);
                    continue;
                };
                let row: Vec<f64> = values
                    .into_iter()
                    .zip(&means)
                    .map(|(value, &mean)| {
                        value.unwrap_or_else(|| {
                            imputed_cells += 1;
                            mean
                        })
                    })
                    .collect();
                rows.push(row);
                row_indices.push(index);
            }
        }
    }

    if rows.is_empty() {
        warn!(table = %table.name, excluded = excluded_rows.len(), "no rows left after filtering");
        return Err(IngestError::EmptyAfterFiltering {
            excluded: excluded_rows.len(),
        });
    }

    debug!(
        table = %table.name,
        rows = rows.len(),
        features = feature_names.len(),
        excluded = excluded_rows.len(),
        imputed = imputed_cells,
        "ingested table"
    );

    Ok(Ingested {
        dataset: Dataset::from_validated(feature_names, &rows, row_indices),
        excluded_rows,
        imputed_cells,
    })
}

/// Mean of the numeric cells of each column over rows free of text cells
fn column_means(cells: &[Option<Vec<Option<f64>>>], n_features: usize) -> Vec<f64> {
    let mut sums = vec![0.0; n_features];
    let mut counts = vec![0usize; n_features];
    for values in cells.iter().flatten() {
        for (col, value) in values.iter().enumerate() {
            if let Some(v) = value {
                sums[col] += v;
                counts[col] += 1;
            }
        }
    }
    sums.iter()
        .zip(&counts)
        .map(|(&sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
        .collect()
}
