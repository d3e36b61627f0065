//! Inspect, export, import and clear the stored dataset and model.

use std::path::{Path, PathBuf};

use lipidmeter::logging::{self, Verbosity};
use lipidmeter::session::Session;
use lipidmeter::settings;
use lipidmeter::storage::SqliteStore;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Stats,
    ExportModel(PathBuf),
    ImportModel(PathBuf),
    Export(PathBuf),
    Import(PathBuf),
    Clear,
    Reset,
}

fn run() -> Result<(), String> {
    let (command, verbosity) = parse_args(std::env::args().skip(1).collect())?;
    logging::init(verbosity).map_err(|err| err.to_string())?;
    let settings = settings::load_or_default().map_err(|err| err.to_string())?;
    let opened = Session::open_default(&settings).map_err(|err| err.to_string())?;
    for warning in &opened.warnings {
        eprintln!("warning: {warning}");
    }
    let mut session = opened.session;

    match command {
        Command::Stats => print_stats(&session),
        Command::ExportModel(path) => {
            let text = session.export_model().map_err(|err| err.to_string())?;
            write_text(&path, &text)?;
            println!("model written to {}", path.display());
        }
        Command::ImportModel(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
            session.import_model(&text).map_err(|err| err.to_string())?;
            println!("model imported from {}", path.display());
        }
        Command::Export(path) => {
            let text = session.export_document().map_err(|err| err.to_string())?;
            write_text(&path, &text)?;
            println!(
                "{} samples and model written to {}",
                session.dataset().len(),
                path.display()
            );
        }
        Command::Import(path) => {
            let bytes = std::fs::read(&path)
                .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
            let outcome = session
                .import_document(&bytes)
                .map_err(|err| err.to_string())?;
            for item in &outcome.samples.reasons {
                println!("skipped #{} {}: {}", item.index, item.name, item.reason);
            }
            println!(
                "merged {} samples, skipped {}; model {}",
                outcome.samples.processed,
                outcome.samples.skipped,
                if outcome.model_replaced { "replaced" } else { "unchanged" }
            );
        }
        Command::Clear => {
            session.clear_dataset().map_err(|err| err.to_string())?;
            println!("dataset cleared");
        }
        Command::Reset => {
            session.reset_model().map_err(|err| err.to_string())?;
            println!("model reset");
        }
    }
    Ok(())
}

fn print_stats(session: &Session<SqliteStore>) {
    let stats = session.stats();
    println!("samples: {}", stats.count);
    if let (Some(mean), Some(min), Some(max), Some(std)) =
        (stats.label_mean, stats.label_min, stats.label_max, stats.label_std)
    {
        println!("labels: mean={mean:.2} std={std:.2} min={min:.1} max={max:.1}");
    }
    println!("extractor: {}", session.extractor().fingerprint());
    match session.model() {
        Some(model) => println!(
            "model: {} ({} features, {} updates, updated {})",
            model.kind, model.feature_dimension, model.trained_sample_count, model.last_updated
        ),
        None => println!("model: none"),
    }
}

fn write_text(path: &Path, text: &str) -> Result<(), String> {
    std::fs::write(path, text).map_err(|err| format!("Failed to write {}: {err}", path.display()))
}

fn parse_args(args: Vec<String>) -> Result<(Command, Verbosity), String> {
    let mut verbosity = Verbosity::Quiet;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Err(help_text()),
            "-v" | "--verbose" => verbosity = Verbosity::Verbose,
            _ => positional.push(arg),
        }
    }
    let path_arg = |name: &str| -> Result<PathBuf, String> {
        positional
            .get(1)
            .map(PathBuf::from)
            .ok_or_else(|| format!("{name} requires a file path"))
    };
    let command = match positional.first().map(String::as_str) {
        None | Some("stats") => Command::Stats,
        Some("export-model") => Command::ExportModel(path_arg("export-model")?),
        Some("import-model") => Command::ImportModel(path_arg("import-model")?),
        Some("export") => Command::Export(path_arg("export")?),
        Some("import") => Command::Import(path_arg("import")?),
        Some("clear") => Command::Clear,
        Some("reset") => Command::Reset,
        Some(other) => return Err(format!("Unknown command: {other}\n\n{}", help_text())),
    };
    Ok((command, verbosity))
}

fn help_text() -> String {
    [
        "lipidmeter-model",
        "",
        "Manage the stored dataset and model.",
        "",
        "Usage:",
        "  lipidmeter-model [stats]",
        "  lipidmeter-model export-model <file>   Write the model as JSON.",
        "  lipidmeter-model import-model <file>   Replace the model.",
        "  lipidmeter-model export <file>         Write samples and model.",
        "  lipidmeter-model import <file>         Merge samples, adopt the model.",
        "  lipidmeter-model clear                 Remove every sample.",
        "  lipidmeter-model reset                 Forget the model.",
    ]
    .join("\n")
}
