//! Local gzip file sink with row-count rotation.

mod naming;
mod session;

pub use naming::FileNaming;
pub use session::{FileSession, ProducedFile, RollingPolicy, WriterStats};
