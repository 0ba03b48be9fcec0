pub mod progress;

pub use progress::{ClassOverview, ClassTotals, ProgressTracker, StudentWeek};
