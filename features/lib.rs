/*!
This crate turns the raw hourly patient records into the feature table the models are trained on. [`preprocess`](fn.preprocess.html) applies the following steps in order:

1. `Unit` is computed as `Unit1 + Unit2`.
2. The columns in [`SPARSE_COLUMNS`](constant.SPARSE_COLUMNS.html) are dropped.
3. Rows are grouped by `Patient_ID` and within each patient every column is back filled and then forward filled.
4. The columns in [`MOSTLY_MISSING_COLUMNS`](constant.MOSTLY_MISSING_COLUMNS.html) are dropped, which includes `Unit` and `Patient_ID`.
5. The columns in [`SKEWED_COLUMNS`](constant.SKEWED_COLUMNS.html) are replaced with `ln(1 + value)`.
6. `Gender` is one hot encoded, dropping the first category.
7. Rows that still have a missing value are dropped.
*/

#![allow(clippy::tabs_in_doc_comments)]

use sepsis_dataframe::{Column, DataFrame, DataFrameError, NumberColumn};
use tracing::debug;

mod fill;
mod one_hot;

pub use self::fill::fill_by_group;
pub use self::one_hot::one_hot_encode;

/// Columns dropped before imputation.
pub const SPARSE_COLUMNS: &[&str] = &[
	"SBP",
	"DBP",
	"EtCO2",
	"BaseExcess",
	"HCO3",
	"pH",
	"PaCO2",
	"Alkalinephos",
	"Calcium",
	"Magnesium",
	"Phosphate",
	"Potassium",
	"PTT",
	"Fibrinogen",
	"Unit1",
	"Unit2",
];

/// Columns dropped after imputation because most of their values are still missing.
pub const MOSTLY_MISSING_COLUMNS: &[&str] = &[
	"TroponinI",
	"Bilirubin_direct",
	"AST",
	"Bilirubin_total",
	"Lactate",
	"SaO2",
	"FiO2",
	"Unit",
	"Patient_ID",
];

/// Columns with long right tails that are log transformed.
pub const SKEWED_COLUMNS: &[&str] = &["MAP", "BUN", "Creatinine", "Glucose", "WBC", "Platelets"];

pub const PATIENT_ID_COLUMN: &str = "Patient_ID";
pub const GENDER_COLUMN: &str = "Gender";

/// Run the full preprocessing transform. Any expected column that is missing is an error.
pub fn preprocess(mut dataframe: DataFrame) -> Result<DataFrame, DataFrameError> {
	let n_rows_in = dataframe.nrows();
	let unit = {
		let unit1 = dataframe.number_column("Unit1")?;
		let unit2 = dataframe.number_column("Unit2")?;
		unit1
			.data
			.iter()
			.zip(unit2.data.iter())
			.map(|(a, b)| a + b)
			.collect()
	};
	dataframe.push_column(Column::Number(NumberColumn::new("Unit", unit)))?;
	dataframe.drop_columns(SPARSE_COLUMNS)?;
	let mut dataframe = fill_by_group(&dataframe, PATIENT_ID_COLUMN)?;
	dataframe.drop_columns(MOSTLY_MISSING_COLUMNS)?;
	for name in SKEWED_COLUMNS {
		let column = dataframe
			.column_mut(name)?
			.as_number_mut()
			.ok_or_else(|| DataFrameError::NotNumber((*name).to_owned()))?;
		column.data.iter_mut().for_each(|value| *value = value.ln_1p());
	}
	let dataframe = one_hot_encode(dataframe, GENDER_COLUMN)?;
	let complete_rows: Vec<usize> = (0..dataframe.nrows())
		.filter(|row| !dataframe.row_has_missing(*row))
		.collect();
	let dataframe = dataframe.take_rows(&complete_rows);
	debug!(
		n_rows_in,
		n_rows_out = dataframe.nrows(),
		n_columns_out = dataframe.ncols(),
		"preprocessed"
	);
	Ok(dataframe)
}
