mod confidence;
mod finding;
mod function;
mod governance;
mod heatmap;
mod record;
mod report;
mod severity;

pub use confidence::Confidence;
pub use finding::Finding;
pub use function::CsfFunction;
pub use governance::{GovernanceAnswer, GovernanceAssessmentEntry};
pub use heatmap::{GovernanceHeatmapEntry, ScanHeatmapEntry};
pub use record::ClassifiedRecord;
pub use report::{Report, ReportSummary};
pub use severity::Severity;
