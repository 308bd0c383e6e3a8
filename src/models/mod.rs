pub mod summary;

pub use summary::{PageSummary, PreviewImage};
