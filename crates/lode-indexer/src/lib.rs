pub mod build;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod scanner;

pub use build::{build_file, BuildOutcome, FileBuild};
pub use error::IndexerError;
pub use pipeline::JobRunner;
pub use progress::{JobSnapshot, ProgressHub, Subscription};
pub use report::IndexReport;
pub use scanner::{describe_file, diff, scan, ScanDiff, ScanOutcome};
