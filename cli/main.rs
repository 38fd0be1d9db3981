//! This module contains the main entrypoint to the sepsis cli.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use sepsis_core::{
	config::Config,
	train::{open_store, open_tracker, train, TrainArgs},
};
use sepsis_dataframe::DataFrame;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
	name = "sepsis",
	about = "Train, select, and serve sepsis prediction models.",
	disable_help_subcommand = true
)]
struct Options {
	/// Write logs as json lines.
	#[arg(long, global = true)]
	log_json: bool,
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Search every model family, select the best model, and publish it.
	Train(TrainOptions),
	/// Clean raw patient records into a feature table.
	Preprocess(PreprocessOptions),
	/// Serve predictions from the latest model in a bucket.
	Serve(ServeOptions),
}

#[derive(Args, Debug)]
struct TrainOptions {
	/// The bucket path holding X_train.csv, X_test.csv, y_train.csv, and y_test.csv.
	#[arg(long)]
	gcs_bucket_path: String,
	/// The gs:// directory to upload the model and metrics to. If empty, they are only saved locally.
	#[arg(long, env = "AIP_MODEL_DIR", default_value = "")]
	model_dir: String,
	/// The local directory to write the model and metrics to.
	#[arg(long)]
	artifact_base_path: Option<PathBuf>,
	/// The path to a config file.
	#[arg(short, long)]
	config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PreprocessOptions {
	/// The path to the raw .csv file.
	#[arg(short, long)]
	input: PathBuf,
	/// The path to write the preprocessed .csv file to.
	#[arg(short, long)]
	output: PathBuf,
}

#[derive(Args, Debug)]
struct ServeOptions {
	/// The bucket whose models/ folder holds the published models.
	#[arg(long, env = "BUCKET")]
	bucket: String,
	#[arg(long, default_value = "0.0.0.0")]
	host: std::net::IpAddr,
	#[arg(long, env = "AIP_HTTP_PORT", default_value_t = sepsis_serve::DEFAULT_PORT)]
	port: u16,
	#[arg(long, env = "AIP_HEALTH_ROUTE", default_value = sepsis_serve::DEFAULT_HEALTH_ROUTE)]
	health_route: String,
	#[arg(long, env = "AIP_PREDICT_ROUTE", default_value = sepsis_serve::DEFAULT_PREDICT_ROUTE)]
	predict_route: String,
	/// The path to a config file. Only its storage section is used.
	#[arg(short, long)]
	config: Option<PathBuf>,
}

fn main() {
	let options = Options::parse();
	init_logging(options.log_json);
	let result = match options.command {
		Command::Train(options) => cli_train(options),
		Command::Preprocess(options) => cli_preprocess(options),
		Command::Serve(options) => cli_serve(options),
	};
	if let Err(error) = result {
		eprintln!("{}: {:#}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

/// Log to stderr, filtered by `RUST_LOG` with a default level of info.
fn init_logging(json: bool) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let builder = tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr);
	if json {
		builder.json().init();
	} else {
		builder.init();
	}
}

fn cli_train(options: TrainOptions) -> Result<()> {
	let config = Config::load(options.config.as_deref())?;
	let store = open_store(&config)?;
	let mut tracker = open_tracker(&config)?;
	let args = TrainArgs {
		gcs_bucket_path: &options.gcs_bucket_path,
		model_dir: Some(options.model_dir.as_str()),
		artifact_base_path: options.artifact_base_path.as_deref(),
	};
	let output = train(&args, &config, store.as_ref(), &mut tracker)?;
	eprintln!(
		"The best model was {} with a validation f1 score of {:.4}.",
		output.best.family(),
		output.evaluation.metrics.f1_score,
	);
	eprintln!(
		"The model was written to {}.",
		output.publish.model_path.display()
	);
	for url in output.publish.uploaded.iter() {
		eprintln!("Uploaded {}.", url);
	}
	Ok(())
}

fn cli_preprocess(options: PreprocessOptions) -> Result<()> {
	let dataframe = DataFrame::from_path(&options.input)
		.with_context(|| format!("failed to read {}", options.input.display()))?;
	let dataframe = sepsis_features::preprocess(dataframe)?;
	let file = std::fs::File::create(&options.output)
		.with_context(|| format!("failed to create {}", options.output.display()))?;
	dataframe.to_csv(std::io::BufWriter::new(file))?;
	info!(
		output = %options.output.display(),
		n_rows = dataframe.nrows(),
		n_columns = dataframe.ncols(),
		"wrote the preprocessed dataset"
	);
	Ok(())
}

fn cli_serve(options: ServeOptions) -> Result<()> {
	let config = Config::load(options.config.as_deref())?;
	let store = open_store(&config)?;
	let model = sepsis_serve::load_latest_model(store.as_ref(), &options.bucket)?;
	sepsis_serve::run(
		sepsis_serve::Options {
			host: options.host,
			port: options.port,
			health_route: options.health_route,
			predict_route: options.predict_route,
		},
		model,
	)
}
