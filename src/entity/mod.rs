pub mod blockdev;
pub mod report;
