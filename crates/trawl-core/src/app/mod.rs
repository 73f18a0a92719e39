//! App - アプリケーション層
//!
//! ports を組み合わせてキューの操作を実装する。
//!
//! # 主要コンポーネント
//! - **TaskServiceBuilder**: TaskService の構築とワイヤリング
//! - **TaskService**: register / acquire / complete / fail
//! - **TaskProcessingLoop**: acquire→extract→persist→fan-out→complete
//! - **FanOut**: post list から POST_DETAILS task を作る
//! - **http**: axum の Router
//! - **seed**: アカウント URL から初期 task を作る

pub mod builder;
pub mod fanout;
pub mod http;
pub mod persist;
pub mod seed;
pub mod service;
pub mod worker_loop;

pub use self::builder::{BuildError, TaskServiceBuilder};
pub use self::fanout::{FanOut, FanOutReport};
pub use self::http::router;
pub use self::persist::ResultPersister;
pub use self::service::TaskService;
pub use self::worker_loop::{LoopStep, TaskProcessingLoop};
