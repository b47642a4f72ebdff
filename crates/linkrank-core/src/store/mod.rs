//! Durable artifacts: the SQLite title store, the partitioned edge dataset
//! and the adjacency matrix file.

pub(crate) mod binio;
pub mod edges;
pub mod matrix;
pub mod schema;
pub mod titles;

pub use edges::{EdgeDataset, EdgeDatasetWriter, EdgeManifest, PartitionInfo};
pub use matrix::{load_adjacency, load_adjacency_expecting, save_adjacency};
pub use titles::{load_title_index, save_title_index, SqliteTitleCollector};
