pub mod builder;
pub mod sparse;
pub mod transition;

pub use builder::{
    build_parallel, build_sequential, build_streaming, AdjacencyBuilder, AdjacencyStats,
    SharedAccumulator,
};
pub use sparse::AdjacencyMatrix;
pub use transition::TransitionOperator;
