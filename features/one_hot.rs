use sepsis_dataframe::{Column, DataFrame, DataFrameError, NumberColumn};
use sepsis_util::finite::Finite;
use std::collections::BTreeMap;

/**
Replace the column `name` with one number column per category, dropping the first category in sorted order. The new columns are appended after the remaining columns and are named `<name>_<category>`.

| value   | Gender_1 |
|---------|----------|
| 0       | 0        |
| 1       | 1        |
| missing | 0        |

Number categories are sorted numerically and written without a trailing `.0`. A missing value is 0 in every new column.
*/
pub fn one_hot_encode(mut dataframe: DataFrame, name: &str) -> Result<DataFrame, DataFrameError> {
	let column = dataframe.remove_column(name)?;
	let n_rows = column.len();
	// Each category's label and the rows that hold it, in sorted order.
	let categories: Vec<(String, Vec<usize>)> = match &column {
		Column::Number(column) => {
			let mut groups: BTreeMap<Finite<f32>, Vec<usize>> = BTreeMap::new();
			for (row, value) in column.data.iter().enumerate() {
				if let Ok(value) = Finite::new(*value) {
					groups.entry(value).or_insert_with(Vec::new).push(row);
				}
			}
			groups
				.into_iter()
				.map(|(value, rows)| (value.get().to_string(), rows))
				.collect()
		}
		Column::Enum(column) => {
			let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
			for (row, value) in column.data.iter().enumerate() {
				if let Some(value) = value {
					groups.entry(value.get()).or_insert_with(Vec::new).push(row);
				}
			}
			groups
				.into_iter()
				.map(|(value, rows)| (column.options[value - 1].clone(), rows))
				.collect()
		}
	};
	for (category, rows) in categories.into_iter().skip(1) {
		let mut data = vec![0.0; n_rows];
		for row in rows {
			data[row] = 1.0;
		}
		dataframe.push_column(Column::Number(NumberColumn::new(
			format!("{}_{}", name, category),
			data,
		)))?;
	}
	Ok(dataframe)
}

#[cfg(test)]
mod test {
	use super::*;
	use sepsis_dataframe::EnumColumn;

	#[test]
	fn test_one_hot_enum() {
		let dataframe = DataFrame::new(vec![
			Column::Number(NumberColumn::new("a", vec![1.0, 2.0, 3.0, 4.0])),
			Column::Enum(EnumColumn::from_values(
				"color",
				vec![Some("red"), Some("blue"), None, Some("green")],
			)),
		])
		.unwrap();
		let output = one_hot_encode(dataframe, "color").unwrap();
		assert_eq!(output.column_names(), vec!["a", "color_green", "color_red"]);
		assert_eq!(
			output.number_column("color_green").unwrap().data,
			vec![0.0, 0.0, 0.0, 1.0]
		);
		assert_eq!(
			output.number_column("color_red").unwrap().data,
			vec![1.0, 0.0, 0.0, 0.0]
		);
	}

	#[test]
	fn test_one_hot_number() {
		let dataframe = DataFrame::new(vec![Column::Number(NumberColumn::new(
			"Gender",
			vec![1.0, 0.0, std::f32::NAN, 1.0],
		))])
		.unwrap();
		let output = one_hot_encode(dataframe, "Gender").unwrap();
		assert_eq!(output.column_names(), vec!["Gender_1"]);
		assert_eq!(
			output.number_column("Gender_1").unwrap().data,
			vec![1.0, 0.0, 0.0, 1.0]
		);
	}
}
