use sepsis_dataframe::{Column, DataFrame, DataFrameError};
use sepsis_util::finite::Finite;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum GroupKey {
	Number(Finite<f32>),
	Enum(usize),
}

/**
Group the rows of `dataframe` by the value of the `key` column and fill missing values within each group, first backward and then forward.

The output holds the groups in ascending key order, with the original row order kept inside each group. Rows whose key is missing belong to no group and are dropped.
*/
pub fn fill_by_group(dataframe: &DataFrame, key: &str) -> Result<DataFrame, DataFrameError> {
	let key_column = dataframe.column(key)?;
	let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
	for row in 0..key_column.len() {
		let group_key = match key_column {
			Column::Number(column) => Finite::new(column.data[row]).ok().map(GroupKey::Number),
			Column::Enum(column) => column.data[row].map(|value| GroupKey::Enum(value.get())),
		};
		if let Some(group_key) = group_key {
			groups.entry(group_key).or_insert_with(Vec::new).push(row);
		}
	}
	let mut order = Vec::with_capacity(dataframe.nrows());
	let mut group_sizes = Vec::with_capacity(groups.len());
	for rows in groups.values() {
		order.extend_from_slice(rows);
		group_sizes.push(rows.len());
	}
	let mut output = dataframe.take_rows(&order);
	for column in output.columns.iter_mut() {
		let mut start = 0;
		for group_size in group_sizes.iter() {
			let range = start..start + group_size;
			match column {
				Column::Number(column) => fill(&mut column.data[range], |value| value.is_nan()),
				Column::Enum(column) => fill(&mut column.data[range], |value| value.is_none()),
			}
			start += group_size;
		}
	}
	Ok(output)
}

/// Back fill then forward fill the missing values in `values`.
fn fill<T: Copy>(values: &mut [T], is_missing: impl Fn(&T) -> bool) {
	let mut next_valid = None;
	for value in values.iter_mut().rev() {
		if is_missing(&*value) {
			if let Some(next_valid) = next_valid {
				*value = next_valid;
			}
		} else {
			next_valid = Some(*value);
		}
	}
	let mut previous_valid = None;
	for value in values.iter_mut() {
		if is_missing(&*value) {
			if let Some(previous_valid) = previous_valid {
				*value = previous_valid;
			}
		} else {
			previous_valid = Some(*value);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use sepsis_dataframe::{EnumColumn, NumberColumn};

	#[test]
	fn test_fill() {
		let nan = std::f32::NAN;
		let mut values = vec![nan, 1.0, nan, nan, 2.0, nan];
		fill(&mut values, |value| value.is_nan());
		assert_eq!(values, vec![1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
		let mut values = vec![nan, nan];
		fill(&mut values, |value| value.is_nan());
		assert!(values.iter().all(|value| value.is_nan()));
	}

	#[test]
	fn test_fill_by_group() {
		let nan = std::f32::NAN;
		let dataframe = DataFrame::new(vec![
			Column::Enum(EnumColumn::from_values(
				"id",
				vec![Some("b"), Some("a"), Some("b"), None, Some("a")],
			)),
			Column::Number(NumberColumn::new("x", vec![nan, 1.0, 3.0, 9.0, nan])),
		])
		.unwrap();
		let output = fill_by_group(&dataframe, "id").unwrap();
		let ids: Vec<Option<&str>> = (0..output.nrows())
			.map(|row| output.column("id").unwrap().as_enum().unwrap().value(row))
			.collect();
		assert_eq!(ids, vec![Some("a"), Some("a"), Some("b"), Some("b")]);
		// Values never leak across patients.
		assert_eq!(
			output.number_column("x").unwrap().data,
			vec![1.0, 1.0, 3.0, 3.0]
		);
	}
}
