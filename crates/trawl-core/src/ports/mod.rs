//! Ports - 抽象化レイヤー
//!
//! 外部のもの（task の保存先、結果の保存先、抽出処理、時刻、ID）への
//! インターフェースを定義する。実装は `queue` / `impls` にある。

pub mod clock;
pub mod extractor;
pub mod id_generator;
pub mod result_sink;
pub mod task_store;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::extractor::Extractor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::result_sink::{
    AccountRecord, PostDetailsRecord, PostListItemRecord, RawResultRecord, ResultSink,
};
pub use self::task_store::{TaskFilter, TaskStore};
