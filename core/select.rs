use crate::search::{best_position, BestCandidate};
use anyhow::{format_err, Result};
use tracing::info;

/// Choose the candidate with the highest validation f1 score. Ties go to the candidate that comes first.
pub fn select(mut candidates: Vec<BestCandidate>) -> Result<BestCandidate> {
	let scores: Vec<f32> = candidates
		.iter()
		.map(|candidate| candidate.f1_score)
		.collect();
	let index = best_position(&scores)
		.ok_or_else(|| format_err!("there are no candidate models to select from"))?;
	let best = candidates.swap_remove(index);
	info!(
		family = %best.family(),
		params = %best.params,
		f1_score = best.f1_score,
		"selected the best model"
	);
	Ok(best)
}
