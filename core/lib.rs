/*!
This crate implements the sepsis model selection pipeline. [`train`](train/fn.train.html) runs the stages in order:

1. [`load`](load/index.html) fetches the four pre split datasets from object storage.
2. [`resample`](resample/index.html) merges them, undersamples the majority class, and splits off a validation set.
3. [`search`](search/index.html) runs a cross validated grid search for each model family.
4. [`select`](select/index.html) picks the family with the best validation f1 score.
5. [`evaluate`](evaluate/index.html) scores the winner and records it with the experiment tracker.
6. [`publish`](publish/index.html) writes the model and metrics and uploads them.

The serving side reads models back with [`Model::from_slice`](model/struct.Model.html#method.from_slice).
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod config;
pub mod evaluate;
pub mod grid;
pub mod load;
pub mod model;
pub mod publish;
pub mod resample;
pub mod search;
pub mod select;
pub mod train;

pub use self::{config::Config, model::Model, train::train};
