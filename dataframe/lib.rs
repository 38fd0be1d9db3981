/*!
This crate provides a small dataframe: a two dimensional table where each column is either a number column or an enum column. It implements only what the sepsis pipeline needs: loading and writing csv, row and column selection, concatenation, and conversion into a dense feature matrix.
*/

use itertools::Itertools;
use ndarray::prelude::*;
use std::{collections::BTreeMap, num::NonZeroUsize};
use thiserror::Error;

mod load;

#[derive(Debug, Error)]
pub enum DataFrameError {
	#[error("did not find column \"{0}\"")]
	MissingColumn(String),
	#[error("column \"{name}\" has {len} rows but {expected} were expected")]
	LengthMismatch {
		name: String,
		len: usize,
		expected: usize,
	},
	#[error("the columns do not match, expected \"{expected}\" but found \"{found}\"")]
	SchemaMismatch { expected: String, found: String },
	#[error("column \"{0}\" is not a number column")]
	NotNumber(String),
	#[error("cannot concatenate an empty list of dataframes")]
	Empty,
	#[error(transparent)]
	Csv(#[from] csv::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type Result<T, E = DataFrameError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
	pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
	Number(NumberColumn),
	Enum(EnumColumn),
}

/// A column of numbers. Missing values are stored as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn {
	pub name: String,
	pub data: Vec<f32>,
}

/// A column of categorical values. `options` is sorted and a value of `Some(n)` refers to `options[n - 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumColumn {
	pub name: String,
	pub options: Vec<String>,
	pub data: Vec<Option<NonZeroUsize>>,
}

impl DataFrame {
	pub fn new(columns: Vec<Column>) -> Result<Self> {
		if let Some(first) = columns.first() {
			let expected = first.len();
			for column in columns.iter() {
				if column.len() != expected {
					return Err(DataFrameError::LengthMismatch {
						name: column.name().to_owned(),
						len: column.len(),
						expected,
					});
				}
			}
		}
		Ok(Self { columns })
	}

	pub fn nrows(&self) -> usize {
		self.columns.first().map(|column| column.len()).unwrap_or(0)
	}

	pub fn ncols(&self) -> usize {
		self.columns.len()
	}

	pub fn column_names(&self) -> Vec<&str> {
		self.columns.iter().map(|column| column.name()).collect()
	}

	pub fn position(&self, name: &str) -> Option<usize> {
		self.columns.iter().position(|column| column.name() == name)
	}

	pub fn column(&self, name: &str) -> Result<&Column> {
		self.columns
			.iter()
			.find(|column| column.name() == name)
			.ok_or_else(|| DataFrameError::MissingColumn(name.to_owned()))
	}

	pub fn column_mut(&mut self, name: &str) -> Result<&mut Column> {
		self.columns
			.iter_mut()
			.find(|column| column.name() == name)
			.ok_or_else(|| DataFrameError::MissingColumn(name.to_owned()))
	}

	pub fn number_column(&self, name: &str) -> Result<&NumberColumn> {
		self.column(name)?
			.as_number()
			.ok_or_else(|| DataFrameError::NotNumber(name.to_owned()))
	}

	/// Append a column. The column must have as many rows as the dataframe unless the dataframe has no columns yet.
	pub fn push_column(&mut self, column: Column) -> Result<()> {
		if !self.columns.is_empty() && column.len() != self.nrows() {
			return Err(DataFrameError::LengthMismatch {
				name: column.name().to_owned(),
				len: column.len(),
				expected: self.nrows(),
			});
		}
		self.columns.push(column);
		Ok(())
	}

	pub fn remove_column(&mut self, name: &str) -> Result<Column> {
		let index = self
			.position(name)
			.ok_or_else(|| DataFrameError::MissingColumn(name.to_owned()))?;
		Ok(self.columns.remove(index))
	}

	/// Remove each of the named columns. Fails without modifying the dataframe if any column is missing.
	pub fn drop_columns(&mut self, names: &[&str]) -> Result<()> {
		for name in names {
			if self.position(name).is_none() {
				return Err(DataFrameError::MissingColumn((*name).to_owned()));
			}
		}
		self.columns.retain(|column| !names.contains(&column.name()));
		Ok(())
	}

	/// Create a new dataframe holding the rows at `indices`, in that order.
	pub fn take_rows(&self, indices: &[usize]) -> DataFrame {
		DataFrame {
			columns: self
				.columns
				.iter()
				.map(|column| column.take_rows(indices))
				.collect(),
		}
	}

	/// Stack dataframes on top of each other. Every dataframe must have the same column names in the same order.
	pub fn concat_rows(frames: &[&DataFrame]) -> Result<DataFrame> {
		let first = frames.first().ok_or(DataFrameError::Empty)?;
		for frame in frames.iter().skip(1) {
			let expected = first.column_names();
			let found = frame.column_names();
			if expected != found || first.columns.iter().zip(frame.columns.iter()).any(
				|(a, b)| std::mem::discriminant(a) != std::mem::discriminant(b),
			) {
				return Err(DataFrameError::SchemaMismatch {
					expected: expected.join(","),
					found: found.join(","),
				});
			}
		}
		let columns = (0..first.ncols())
			.map(|index| {
				let parts: Vec<&Column> = frames.iter().map(|frame| &frame.columns[index]).collect();
				Column::concat(&parts)
			})
			.collect();
		Ok(DataFrame { columns })
	}

	/// Join two dataframes side by side on row position.
	pub fn hconcat(mut self, other: DataFrame) -> Result<DataFrame> {
		for column in other.columns {
			self.push_column(column)?;
		}
		Ok(self)
	}

	/// Convert the dataframe to a dense row major matrix. Every column must be a number column.
	pub fn to_array(&self) -> Result<Array2<f32>> {
		let mut array = Array::zeros((self.nrows(), self.ncols()));
		for (mut array_column, column) in array.axis_iter_mut(Axis(1)).zip(self.columns.iter()) {
			let column = column
				.as_number()
				.ok_or_else(|| DataFrameError::NotNumber(column.name().to_owned()))?;
			for (a, value) in array_column.iter_mut().zip(column.data.iter()) {
				*a = *value;
			}
		}
		Ok(array)
	}

	/// Return true if any column is missing a value in this row.
	pub fn row_has_missing(&self, row: usize) -> bool {
		self.columns.iter().any(|column| column.is_missing(row))
	}
}

impl Column {
	pub fn name(&self) -> &str {
		match self {
			Column::Number(column) => column.name.as_str(),
			Column::Enum(column) => column.name.as_str(),
		}
	}

	pub fn len(&self) -> usize {
		match self {
			Column::Number(column) => column.data.len(),
			Column::Enum(column) => column.data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn as_number(&self) -> Option<&NumberColumn> {
		match self {
			Column::Number(column) => Some(column),
			_ => None,
		}
	}

	pub fn as_number_mut(&mut self) -> Option<&mut NumberColumn> {
		match self {
			Column::Number(column) => Some(column),
			_ => None,
		}
	}

	pub fn as_enum(&self) -> Option<&EnumColumn> {
		match self {
			Column::Enum(column) => Some(column),
			_ => None,
		}
	}

	pub fn is_missing(&self, row: usize) -> bool {
		match self {
			Column::Number(column) => column.data[row].is_nan(),
			Column::Enum(column) => column.data[row].is_none(),
		}
	}

	pub fn take_rows(&self, indices: &[usize]) -> Column {
		match self {
			Column::Number(column) => Column::Number(NumberColumn {
				name: column.name.clone(),
				data: indices.iter().map(|index| column.data[*index]).collect(),
			}),
			Column::Enum(column) => Column::Enum(EnumColumn {
				name: column.name.clone(),
				options: column.options.clone(),
				data: indices.iter().map(|index| column.data[*index]).collect(),
			}),
		}
	}

	// All parts must have the same variant as the first.
	fn concat(parts: &[&Column]) -> Column {
		match parts[0] {
			Column::Number(first) => Column::Number(NumberColumn {
				name: first.name.clone(),
				data: parts
					.iter()
					.filter_map(|part| part.as_number())
					.flat_map(|part| part.data.iter().cloned())
					.collect(),
			}),
			Column::Enum(first) => {
				let parts: Vec<&EnumColumn> = parts.iter().filter_map(|part| part.as_enum()).collect();
				let options: Vec<String> = parts
					.iter()
					.flat_map(|part| part.options.iter().cloned())
					.sorted()
					.dedup()
					.collect();
				let positions: BTreeMap<&str, usize> = options
					.iter()
					.enumerate()
					.map(|(index, option)| (option.as_str(), index))
					.collect();
				let data = parts
					.iter()
					.copied()
					.flat_map(|part| {
						let positions = &positions;
						part.data.iter().map(move |value| {
							value
								.and_then(|value| part.options.get(value.get() - 1))
								.and_then(|option| positions.get(option.as_str()))
								.and_then(|position| NonZeroUsize::new(position + 1))
						})
					})
					.collect();
				Column::Enum(EnumColumn {
					name: first.name.clone(),
					options,
					data,
				})
			}
		}
	}
}

impl NumberColumn {
	pub fn new(name: impl Into<String>, data: Vec<f32>) -> Self {
		Self {
			name: name.into(),
			data,
		}
	}
}

impl EnumColumn {
	/// Build an enum column from string values. `None` marks a missing value.
	pub fn from_values<'a>(
		name: impl Into<String>,
		values: impl IntoIterator<Item = Option<&'a str>>,
	) -> Self {
		let values: Vec<Option<&str>> = values.into_iter().collect();
		let options: Vec<String> = values
			.iter()
			.flatten()
			.sorted()
			.dedup()
			.map(|value| (*value).to_owned())
			.collect();
		let data = values
			.iter()
			.map(|value| {
				value
					.and_then(|value| options.iter().position(|option| option == value))
					.and_then(|position| NonZeroUsize::new(position + 1))
			})
			.collect();
		Self {
			name: name.into(),
			options,
			data,
		}
	}

	pub fn value(&self, row: usize) -> Option<&str> {
		self.data[row]
			.and_then(|value| self.options.get(value.get() - 1))
			.map(|option| option.as_str())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn frame(a: Vec<f32>, b: Vec<Option<&str>>) -> DataFrame {
		DataFrame::new(vec![
			Column::Number(NumberColumn::new("a", a)),
			Column::Enum(EnumColumn::from_values("b", b)),
		])
		.unwrap()
	}

	#[test]
	fn test_new_length_mismatch() {
		let result = DataFrame::new(vec![
			Column::Number(NumberColumn::new("a", vec![1.0, 2.0])),
			Column::Number(NumberColumn::new("b", vec![1.0])),
		]);
		assert!(matches!(
			result,
			Err(DataFrameError::LengthMismatch { len: 1, expected: 2, .. })
		));
	}

	#[test]
	fn test_concat_rows_merges_enum_options() {
		let top = frame(vec![1.0, 2.0], vec![Some("x"), None]);
		let bottom = frame(vec![3.0], vec![Some("w")]);
		let concat = DataFrame::concat_rows(&[&top, &bottom]).unwrap();
		assert_eq!(concat.nrows(), 3);
		let b = concat.column("b").unwrap().as_enum().unwrap();
		assert_eq!(b.options, vec!["w".to_owned(), "x".to_owned()]);
		assert_eq!(b.value(0), Some("x"));
		assert_eq!(b.value(1), None);
		assert_eq!(b.value(2), Some("w"));
	}

	#[test]
	fn test_concat_rows_schema_mismatch() {
		let top = frame(vec![1.0], vec![Some("x")]);
		let mut bottom = frame(vec![1.0], vec![Some("x")]);
		bottom.columns.reverse();
		assert!(matches!(
			DataFrame::concat_rows(&[&top, &bottom]),
			Err(DataFrameError::SchemaMismatch { .. })
		));
	}

	#[test]
	fn test_take_rows_and_drop_columns() {
		let mut df = frame(vec![1.0, 2.0, 3.0], vec![Some("x"), Some("y"), None]);
		let taken = df.take_rows(&[2, 0]);
		assert_eq!(taken.number_column("a").unwrap().data, vec![3.0, 1.0]);
		assert!(taken.row_has_missing(0));
		assert!(!taken.row_has_missing(1));
		assert!(matches!(
			df.drop_columns(&["b", "c"]),
			Err(DataFrameError::MissingColumn(name)) if name == "c"
		));
		assert_eq!(df.ncols(), 2);
		df.drop_columns(&["b"]).unwrap();
		assert_eq!(df.column_names(), vec!["a"]);
	}

	#[test]
	fn test_to_array() {
		let df = DataFrame::new(vec![
			Column::Number(NumberColumn::new("a", vec![1.0, 2.0])),
			Column::Number(NumberColumn::new("b", vec![3.0, 4.0])),
		])
		.unwrap();
		assert_eq!(df.to_array().unwrap(), arr2(&[[1.0, 3.0], [2.0, 4.0]]));
		let df = frame(vec![1.0], vec![Some("x")]);
		assert!(matches!(df.to_array(), Err(DataFrameError::NotNumber(_))));
	}
}
