use super::*;
use std::{collections::BTreeSet, io::Write, path::Path};

/// These values are considered missing when reading a csv.
const INVALID_VALUES: &[&str] = &[
	"", "null", "NULL", "n/a", "N/A", "nan", "-nan", "NaN", "-NaN", "?",
];

#[derive(Clone, Copy, Debug, PartialEq)]
enum InferColumnType {
	Unknown,
	Number,
	Enum,
}

impl DataFrame {
	pub fn from_path(path: &Path) -> Result<Self> {
		Self::from_csv(std::fs::File::open(path)?)
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		Self::from_csv(bytes)
	}

	/// Read a csv with a header row. A column whose valid values all parse as finite numbers becomes a number column, any other column becomes an enum column.
	pub fn from_csv<R>(reader: R) -> Result<Self>
	where
		R: std::io::Read,
	{
		let mut reader = csv::Reader::from_reader(reader);
		let column_names: Vec<String> = reader
			.headers()?
			.iter()
			.map(|column_name| column_name.to_owned())
			.collect();
		let records: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;

		// Infer the type of each column from its values.
		let mut column_types = vec![InferColumnType::Unknown; column_names.len()];
		for record in records.iter() {
			for (column_type, value) in column_types.iter_mut().zip(record.iter()) {
				if INVALID_VALUES.contains(&value) || *column_type == InferColumnType::Enum {
					continue;
				}
				*column_type = if parse_number(value).is_some() {
					InferColumnType::Number
				} else {
					InferColumnType::Enum
				};
			}
		}

		let columns = column_names
			.into_iter()
			.zip(column_types.into_iter())
			.enumerate()
			.map(|(index, (name, column_type))| {
				let values = records.iter().map(|record| record.get(index).unwrap_or(""));
				match column_type {
					// A column with no valid values is read as an all missing number column.
					InferColumnType::Unknown | InferColumnType::Number => {
						let data = values
							.map(|value| parse_number(value).unwrap_or(std::f32::NAN))
							.collect();
						Column::Number(NumberColumn { name, data })
					}
					InferColumnType::Enum => {
						let options: BTreeSet<&str> = records
							.iter()
							.filter_map(|record| record.get(index))
							.filter(|value| !INVALID_VALUES.contains(value))
							.collect();
						let options: Vec<String> = options.into_iter().map(|o| o.to_owned()).collect();
						let data = values
							.map(|value| {
								options
									.binary_search_by(|option| option.as_str().cmp(value))
									.ok()
									.and_then(|position| NonZeroUsize::new(position + 1))
							})
							.collect();
						Column::Enum(EnumColumn {
							name,
							options,
							data,
						})
					}
				}
			})
			.collect();
		DataFrame::new(columns)
	}

	/// Write the dataframe as csv with a header row. Missing values are written as empty fields.
	pub fn to_csv<W>(&self, writer: W) -> Result<()>
	where
		W: Write,
	{
		let mut writer = csv::Writer::from_writer(writer);
		writer.write_record(self.column_names())?;
		for row in 0..self.nrows() {
			let record: Vec<String> = self
				.columns
				.iter()
				.map(|column| match column {
					Column::Number(column) => {
						let value = column.data[row];
						if value.is_nan() {
							String::new()
						} else {
							value.to_string()
						}
					}
					Column::Enum(column) => column.value(row).unwrap_or("").to_owned(),
				})
				.collect();
			writer.write_record(&record)?;
		}
		writer.flush()?;
		Ok(())
	}

	pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
		let mut bytes = Vec::new();
		self.to_csv(&mut bytes)?;
		Ok(bytes)
	}
}

fn parse_number(value: &str) -> Option<f32> {
	match lexical::parse::<f32, _>(value) {
		Ok(value) if value.is_finite() => Some(value),
		_ => None,
	}
}
