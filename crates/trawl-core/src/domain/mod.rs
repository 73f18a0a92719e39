//! Domain model: ids, networks, tasks and extraction results.

pub mod ids;
pub mod network;
pub mod result;
pub mod task;

pub use ids::TaskId;
pub use network::{Network, UnknownNetwork};
pub use result::{
    AccountResult, ExtractionResult, PostDetailsResult, PostListItem, PostListResult,
};
pub use task::{
    AccountTaskConfig, ExtractionTask, PostDetailsTaskConfig, PostListTaskConfig, TaskConfig,
    TaskKind,
};
