pub mod status;
pub mod workers;

pub use status::{TrainerStatus, WorkerStatus};
pub use workers::{TrainingCounters, WorkerStats};
