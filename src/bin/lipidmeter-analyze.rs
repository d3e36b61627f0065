//! Estimate the percentage for one or more images with the stored model.

use std::path::PathBuf;

use lipidmeter::logging::{self, Verbosity};
use lipidmeter::session::Session;
use lipidmeter::settings;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    logging::init(options.verbosity).map_err(|err| err.to_string())?;
    let settings = settings::load_or_default().map_err(|err| err.to_string())?;
    let opened = Session::open_default(&settings).map_err(|err| err.to_string())?;
    for warning in &opened.warnings {
        eprintln!("warning: {warning}");
    }
    let session = opened.session;
    if session.model().is_none() {
        eprintln!("warning: no model yet; train one with lipidmeter-train");
    }

    let report = session.analyze_files(&options.images, None, None);

    if options.json {
        let text = serde_json::to_string_pretty(&report.predictions)
            .map_err(|err| format!("Failed to serialize predictions: {err}"))?;
        println!("{text}");
    } else {
        for prediction in &report.predictions {
            match prediction.value {
                Some(value) => println!("{}\t{value:.1}%", prediction.name),
                None => println!("{}\t-", prediction.name),
            }
        }
    }
    for item in &report.images.reasons {
        eprintln!("skipped {}: {}", item.name, item.reason);
    }
    if report.images.processed == 0 {
        return Err("No image could be analyzed".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct CliOptions {
    images: Vec<PathBuf>,
    json: bool,
    verbosity: Verbosity,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut images = Vec::new();
    let mut json = false;
    let mut verbosity = Verbosity::Quiet;
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--json" => json = true,
            "-v" | "--verbose" => verbosity = Verbosity::Verbose,
            other if other.starts_with('-') => {
                return Err(format!("Unknown argument: {other}\n\n{}", help_text()));
            }
            path => images.push(PathBuf::from(path)),
        }
    }
    if images.is_empty() {
        return Err(format!("No images given\n\n{}", help_text()));
    }
    Ok(CliOptions {
        images,
        json,
        verbosity,
    })
}

fn help_text() -> String {
    [
        "lipidmeter-analyze",
        "",
        "Estimate the percentage for each image.",
        "",
        "Usage:",
        "  lipidmeter-analyze [--json] <image>...",
        "",
        "Options:",
        "  --json         Print predictions as JSON.",
        "  -v, --verbose  Debug logging.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_images_and_flags() {
        let args = ["a.png", "--json", "b.png"].iter().map(|s| s.to_string()).collect();
        let options = parse_args(args).unwrap();
        assert!(options.json);
        assert_eq!(options.images.len(), 2);
        assert_eq!(options.verbosity, Verbosity::Quiet);
    }
}
