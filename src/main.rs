//! StockSense CLI
//!
//! Forecast a daily OHLCV series from a CSV file or a synthetic demo series.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use stocksense::{
    config::AppConfig,
    data::{self, synthetic::Scenario},
    prediction::{PredictionReport, PredictionService, TrainingPeriod},
    types::{ModelKind, OhlcvSeries},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "stocksense")]
#[command(about = "Regime-aware multi-model stock price forecasts")]
struct Cli {
    /// CSV file with Date,Open,High,Low,Close,Volume columns
    #[arg(long, conflicts_with = "demo", required_unless_present = "demo")]
    csv: Option<String>,

    /// Forecast a synthetic series instead of a file
    #[arg(long, value_enum)]
    demo: Option<Scenario>,

    /// Bars in the demo series
    #[arg(long, default_value_t = 400)]
    demo_bars: usize,

    /// Seed for the demo series
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Forecast horizon in days (overrides config)
    #[arg(long)]
    horizon: Option<usize>,

    /// Comma-separated models, e.g. linear,arima,fourier (overrides config)
    #[arg(long, value_delimiter = ',')]
    models: Option<Vec<String>>,

    /// History window used for fitting (overrides config)
    #[arg(long, value_enum)]
    training_period: Option<TrainingPeriod>,

    /// Disable regime priors and boosts in the ensemble
    #[arg(long)]
    no_regime: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(config: &AppConfig, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) -> Result<()> {
    if let Some(horizon) = cli.horizon {
        config.prediction.horizon = horizon;
    }
    if let Some(names) = &cli.models {
        let mut kinds = Vec::new();
        for name in names {
            let kind: ModelKind = name.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        config.prediction.models = kinds;
    }
    if let Some(period) = cli.training_period {
        config.prediction.training_period = period;
    }
    if cli.no_regime {
        config.ensemble.regime_aware = false;
    }
    config.validate()
}

fn load_series(cli: &Cli) -> Result<OhlcvSeries> {
    match (&cli.csv, cli.demo) {
        (Some(path), _) => {
            data::load_csv(path).with_context(|| format!("Failed to load {path}"))
        }
        (None, Some(scenario)) => Ok(scenario.generate(cli.demo_bars, cli.seed)),
        (None, None) => bail!("either --csv or --demo is required"),
    }
}

fn print_text(report: &PredictionReport) {
    println!(
        "Last close {:.2} on {} ({} bars, period {})",
        report.last_close, report.last_date, report.bars_used, report.training_period
    );
    println!(
        "Regime: {} (confidence {:.2}, {} bars{})",
        report.regime.regime,
        report.regime.confidence,
        report.regime.duration,
        if report.regime.regime_change { ", changed recently" } else { "" }
    );
    println!("  {}", report.regime_description);
    println!();

    println!("{:<22} {:>10} {:>8} {:>10}", "Model", "End", "Conf", "Tier");
    for f in &report.forecasts {
        println!(
            "{:<22} {:>10.2} {:>8.3} {:>10}",
            f.model.to_string(),
            f.predictions.last().copied().unwrap_or_default(),
            f.confidences.first().copied().unwrap_or_default(),
            format!("{:?}", f.tier)
        );
    }
    println!();

    println!("Ensemble ({}):", report.ensemble.tier);
    println!("{:<12} {:>10} {:>10} {:>10} {:>8}", "Date", "Price", "Low", "High", "Conf");
    for (band, conf) in report.bands.iter().zip(&report.ensemble.confidences) {
        println!(
            "{:<12} {:>10.2} {:>10.2} {:>10.2} {:>8.3}",
            band.date.to_string(),
            band.prediction,
            band.lower,
            band.upper,
            conf
        );
    }
    println!();

    let m = &report.metrics;
    println!(
        "Change {:+.2}% | avg confidence {:.2} | confidence trend {:+.4} | predicted volatility {:.2}%",
        m.price_change_pct, m.average_confidence, m.confidence_trend, m.predicted_volatility_pct
    );
    println!("Signal: {}", report.signal);
    if let Some(t) = &report.trajectory {
        println!(
            "Trajectory: {} ({}d {:+.2}%, {}d {:+.2}%, {}d {:+.2}%)",
            t.pattern,
            t.short_term.days,
            t.short_term.change_pct,
            t.medium_term.days,
            t.medium_term.change_pct,
            t.long_term.days,
            t.long_term.change_pct
        );
        println!("  {}", t.description);
    }

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  {w}");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(&config, cli.json_logs || config.logging.json);
    apply_overrides(&mut config, &cli)?;
    tracing::info!(config = %config, "Configuration loaded");

    let series = load_series(&cli)?;
    let service = PredictionService::new(config);
    let report = service.predict(&series).context("Prediction failed")?;

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text(&report),
    }
    Ok(())
}
