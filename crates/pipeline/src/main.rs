//! UFCNN pipeline driver.
//!
//! Usage: `ufcnn <tradcom|cos> [config.json]`

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ufcnn_core::config::TestStatsSource;
use ufcnn_core::{Config, NormalizationStats};
use ufcnn_dataset::{
    gen_cosine_amp, generator, lookahead_mean, ClassificationRequest, CosineSeries, RetType, Windower,
};
use ufcnn_features::accumulate_tradcom_normalization;
use ufcnn_ingestion::discover_tick_files;
use ufcnn_topology::{build_topology, check_prediction, Activation, Loss, MergeMode, TopologySpec};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(action) = args.get(1) else {
        bail!("usage: {} <tradcom|cos> [config.json]", args[0]);
    };
    let config = match args.get(2) {
        Some(path) => Config::from_json_file(path).with_context(|| format!("loading config {path}"))?,
        None => Config::default(),
    };

    info!(action = %action, "running");
    match action.as_str() {
        "tradcom" => run_tradcom(&config),
        "cos" => run_cosine(&config),
        other => bail!("unknown action {other:?}, expected tradcom or cos"),
    }
}

/// Normalize and window trading days, then score the classifier on them.
fn run_tradcom(config: &Config) -> Result<()> {
    let files = discover_tick_files(
        &config.data.store_path,
        &config.data.tick_prefix,
        &config.data.tick_suffix,
    )
    .with_context(|| format!("listing {}", config.data.store_path.display()))?;
    if files.is_empty() {
        bail!(
            "no {}*{} files in {}; tick and signal files are needed",
            config.data.tick_prefix,
            config.data.tick_suffix,
            config.data.store_path.display()
        );
    }

    let training_count = config.training.training_count.min(files.len());
    let testing_end = (training_count + config.training.testing_count).min(files.len());
    let training_files: Vec<PathBuf> = files[..training_count].to_vec();
    let testing_files: Vec<PathBuf> = files[training_count..testing_end].to_vec();
    if training_files.is_empty() {
        bail!("training_count must select at least one file");
    }

    let windower = Windower::from_config(config);
    let model_config = &config.model;
    let train = windower.prepare_classification(&ClassificationRequest::training(
        RetType::Df,
        model_config.sequence_length,
        config.data.features_list.clone(),
        training_files.clone(),
    ))?;
    let x = train.x.as_table().context("training X is not a table")?;
    let y = train.y.as_table().context("training y is not a table")?;

    let spec = TopologySpec::from_config(model_config, config.data.features_list.len())?;
    let model = build_topology(&spec)?;
    println!("{}", model.summary());

    let days = generator(x, y)?;
    let per_cycle = days.days_per_cycle();
    let mut final_loss = 0.0;
    for batch in days.take(per_cycle) {
        final_loss = model.evaluate(batch.input.view(), batch.output.view())?;
        info!(date = %batch.date, loss = final_loss, "training day");
    }
    info!(final_loss, "training days scored");

    if testing_files.is_empty() {
        info!("no testing files left after the training files");
        return Ok(());
    }
    let stats = testing_stats(config, &training_files, &train.stats)?;
    let test = windower.prepare_classification(&ClassificationRequest::testing(
        RetType::Df,
        model_config.sequence_length,
        config.data.features_list.clone(),
        testing_files,
        stats,
        training_count,
    ))?;
    let x = test.x.as_table().context("testing X is not a table")?;
    let y = test.y.as_table().context("testing y is not a table")?;

    let days = generator(x, y)?;
    let per_cycle = days.days_per_cycle();
    for batch in days.take(per_cycle) {
        let prediction = model.predict(batch.input.view())?;
        let report = check_prediction(batch.output.view(), prediction.view())?;
        println!("{}\n{report}", batch.date);
    }
    Ok(())
}

/// Statistics applied to the testing days, per `training.test_stats`.
fn testing_stats(
    config: &Config,
    training_files: &[PathBuf],
    training: &NormalizationStats,
) -> Result<NormalizationStats> {
    match config.training.test_stats {
        TestStatsSource::Training => Ok(training.clone()),
        TestStatsSource::Tradcom => {
            let tradcom = accumulate_tradcom_normalization(training_files, &config.tradcom)?;
            info!(means = ?tradcom.means(), stds = ?tradcom.stds(), "tradcom statistics for testing");
            Ok(tradcom)
        }
    }
}

/// Score the sum-merge regression model on the damped cosine series.
fn run_cosine(config: &Config) -> Result<()> {
    let sequence_length = config.model.sequence_length;
    let series = gen_cosine_amp(&CosineSeries {
        xn: sequence_length * 100,
        ..Default::default()
    });
    let target = lookahead_mean(&series, 1);

    let spec = TopologySpec {
        features: 1,
        output_dim: 1,
        mode: MergeMode::Sum,
        activation: Activation::PARAMETRIC_SOFTPLUS,
        loss: Loss::Mse,
        regression: true,
        ..TopologySpec::from_config(&config.model, 1)?
    };
    let model = build_topology(&spec)?;
    println!("{}", model.summary());

    // One sample per non-overlapping window of the series.
    let samples = series.len() / sequence_length;
    let input = series.into_shape((samples, sequence_length, 1))?;
    let target = target.into_shape((samples, sequence_length, 1))?;
    let loss = model.evaluate(input.view(), target.view())?;
    info!(samples, loss, "cosine regression scored");
    Ok(())
}
