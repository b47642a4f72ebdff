pub mod encoder;
pub mod titles;

pub use encoder::{EncodeStats, LinkEncoder};
pub use titles::{TitleIndex, TitleIndexBuilder};
