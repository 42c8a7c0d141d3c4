pub mod document;
pub mod inject;
pub mod operations;
pub mod range;
pub mod template;

pub use document::Document;
pub use inject::{compile_pattern, Injection, Injector, InsertionSite, PatternOptions, Placement};
pub use operations::unified_diff;
pub use range::{LineRange, ParseRangeError, Splice};
pub use template::{GroupRef, Template};
