//! Percentage estimation from images: feature extraction, online regression,
//! weighted k-NN and versioned persistence of what was learned.
/// Platform directories for settings, data and logs.
pub mod app_dirs;
/// Cooperative cancellation for batch operations.
pub mod cancel;
/// Labeled samples and the validating store around them.
pub mod dataset;
/// Pixel buffers, decoding and feature extraction.
pub mod features;
/// Tracing setup for the command line tools.
pub mod logging;
/// Estimators: linear/logistic regression, k-NN and the network engine seam.
pub mod ml;
/// Per-item outcome reports for batch operations.
pub mod report;
/// Session context tying extractor, dataset, model and storage together.
pub mod session;
/// `settings.toml` loading and saving.
pub mod settings;
/// Key-value storage and the persisted document format.
pub mod storage;
/// Label and feature vector checks shared by every entry point.
pub mod validation;
