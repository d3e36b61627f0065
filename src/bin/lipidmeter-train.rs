//! Train the stored model over the whole dataset.

use lipidmeter::logging::{self, Verbosity};
use lipidmeter::ml::linear::{ModelKind, TrainingProgress};
use lipidmeter::session::Session;
use lipidmeter::settings::{self, InitMode};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    logging::init(options.verbosity).map_err(|err| err.to_string())?;
    let mut settings = settings::load_or_default().map_err(|err| err.to_string())?;
    let training = &mut settings.training;
    if let Some(kind) = options.kind {
        training.kind = kind;
    }
    if let Some(epochs) = options.epochs {
        training.epochs = epochs;
    }
    if let Some(learning_rate) = options.learning_rate {
        training.learning_rate = learning_rate;
    }
    if let Some(seed) = options.seed {
        training.seed = seed;
        training.init = InitMode::Seeded;
    }
    if options.shuffle {
        training.shuffle = true;
    }
    let settings = settings.normalized();

    let opened = Session::open_default(&settings).map_err(|err| err.to_string())?;
    for warning in &opened.warnings {
        eprintln!("warning: {warning}");
    }
    let mut session = opened.session;
    if options.reset {
        session.reset_model().map_err(|err| err.to_string())?;
    }
    if let Some(model) = session.model() {
        if model.kind != settings.training.kind {
            println!(
                "continuing existing {} model (pass --reset to start a {} model)",
                model.kind, settings.training.kind
            );
        }
    }

    let mut print_epoch = |p: TrainingProgress| {
        if let Some(metrics) = p.epoch_metrics {
            println!(
                "epoch {}/{} - loss={:.4} - mae={:.4}",
                p.epoch, p.epochs, metrics.mse, metrics.mae
            );
        }
    };
    let report = session
        .train(None, Some(&mut print_epoch))
        .map_err(|err| err.to_string())?;

    for item in &report.samples.reasons {
        println!("skipped {}: {}", item.name, item.reason);
    }
    for item in &report.diverged.reasons {
        println!("diverged on {}: {} (try a lower --learning-rate)", item.name, item.reason);
    }
    if let Some(model) = session.model() {
        println!(
            "{} model: {} updates this run, {} total",
            model.kind, report.applied, model.trained_sample_count
        );
    }
    if let Some(metrics) = report.metrics {
        println!(
            "last epoch: mae={:.3} rmse={:.3} over {} samples",
            metrics.mae, metrics.rmse, metrics.count
        );
    }
    if let Some(fit) = session.evaluate() {
        println!(
            "dataset fit: mae={:.3} rmse={:.3} over {} samples",
            fit.mae, fit.rmse, fit.count
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    kind: Option<ModelKind>,
    epochs: Option<usize>,
    learning_rate: Option<f32>,
    seed: Option<u64>,
    shuffle: bool,
    reset: bool,
    verbosity: Verbosity,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "-v" | "--verbose" => options.verbosity = Verbosity::Verbose,
            "-q" | "--quiet" => options.verbosity = Verbosity::Quiet,
            "--kind" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--kind requires a value".to_string())?;
                options.kind = Some(value.parse::<ModelKind>()?);
            }
            "--epochs" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--epochs requires a value".to_string())?;
                options.epochs = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --epochs value: {value}"))?,
                );
            }
            "--learning-rate" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--learning-rate requires a value".to_string())?;
                options.learning_rate = Some(
                    value
                        .parse::<f32>()
                        .map_err(|_| format!("Invalid --learning-rate value: {value}"))?,
                );
            }
            "--seed" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--seed requires a value".to_string())?;
                options.seed = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| format!("Invalid --seed value: {value}"))?,
                );
            }
            "--shuffle" => options.shuffle = true,
            "--reset" => options.reset = true,
            other => return Err(format!("Unknown argument: {other}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "lipidmeter-train",
        "",
        "Train the stored model on every sample in the dataset.",
        "",
        "Usage:",
        "  lipidmeter-train [options]",
        "",
        "Options:",
        "  --kind <linear|logistic|knn>  Model created when none exists.",
        "  --epochs <n>                  Passes over the dataset.",
        "  --learning-rate <f>           Gradient step size.",
        "  --seed <n>                    Seed weight init (and shuffling).",
        "  --shuffle                     Visit samples in seeded random order.",
        "  --reset                       Discard the current model first.",
        "  -v, --verbose                 Debug logging.",
        "  -q, --quiet                   Warnings only.",
    ]
    .join("\n")
}
