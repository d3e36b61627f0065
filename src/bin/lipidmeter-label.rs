//! Add labeled images to the stored dataset.
//!
//! `--label` sets the percentage for every image listed after it, so one call
//! can add several groups: `lipidmeter-label --label 20 a.png b.png --label 65 c.png`.

use std::path::PathBuf;

use lipidmeter::logging::{self, Verbosity};
use lipidmeter::session::{LabeledFile, Session};
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
    let mut session = opened.session;

    let files: Vec<LabeledFile> = options
        .images
        .iter()
        .map(|(path, label)| LabeledFile {
            path: path.clone(),
            label: *label,
        })
        .collect();
    let mut print_progress = |p: lipidmeter::session::BatchProgress| {
        if options.verbosity != Verbosity::Quiet {
            eprint!("\r{}/{}", p.processed, p.total);
        }
    };
    let report = session
        .add_labeled_files(&files, None, Some(&mut print_progress))
        .map_err(|err| err.to_string())?;
    if options.verbosity != Verbosity::Quiet {
        eprintln!();
    }
    for item in &report.samples.reasons {
        println!("skipped {}: {}", item.name, item.reason);
    }
    println!(
        "added {} images, skipped {}; dataset holds {} samples",
        report.samples.processed,
        report.samples.skipped,
        session.dataset().len()
    );
    Ok(())
}

#[derive(Debug, Clone)]
struct CliOptions {
    images: Vec<(PathBuf, f32)>,
    verbosity: Verbosity,
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut images = Vec::new();
    let mut label: Option<f32> = None;
    let mut verbosity = Verbosity::Normal;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "-v" | "--verbose" => verbosity = Verbosity::Verbose,
            "-q" | "--quiet" => verbosity = Verbosity::Quiet,
            "--label" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--label requires a value".to_string())?;
                label = Some(
                    value
                        .parse::<f32>()
                        .map_err(|_| format!("Invalid --label value: {value}"))?,
                );
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown argument: {other}\n\n{}", help_text()));
            }
            path => {
                let label = label.ok_or_else(|| format!("No --label given before {path}"))?;
                images.push((PathBuf::from(path), label));
            }
        }
        idx += 1;
    }

    if images.is_empty() {
        return Err(format!("No images given\n\n{}", help_text()));
    }
    Ok(CliOptions { images, verbosity })
}

fn help_text() -> String {
    [
        "lipidmeter-label",
        "",
        "Add labeled images to the stored dataset.",
        "",
        "Usage:",
        "  lipidmeter-label --label <percent> <image>... [--label <percent> <image>...]",
        "",
        "Options:",
        "  --label <percent>  Label (0-100) for the images that follow.",
        "  -v, --verbose      Debug logging.",
        "  -q, --quiet        Warnings only, no progress.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn labels_apply_to_following_images() {
        let options =
            parse_args(args(&["--label", "20", "a.png", "b.png", "--label", "65", "c.png"])).unwrap();
        let labels: Vec<f32> = options.images.iter().map(|(_, l)| *l).collect();
        assert_eq!(labels, vec![20.0, 20.0, 65.0]);
    }

    #[test]
    fn image_before_label_is_an_error() {
        assert!(parse_args(args(&["a.png", "--label", "20"])).is_err());
    }
}
