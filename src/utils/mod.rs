pub mod fs;

pub use fs::{calculate_file_hash, calculate_string_hash, read_snapshot, write_atomic, Snapshot};
