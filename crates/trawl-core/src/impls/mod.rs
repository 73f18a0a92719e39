//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **MemorySink**: プロセス内の ResultSink
//! - **JsonDirSink**: ディレクトリに JSON を書き出す ResultSink
//! - **FixtureExtractor**: 保存済み JSON を返す Extractor
//!
//! task store の実装は `queue` にある。

pub mod fixture_extractor;
pub mod json_sink;
pub mod memory_sink;

pub use self::fixture_extractor::FixtureExtractor;
pub use self::json_sink::JsonDirSink;
pub use self::memory_sink::MemorySink;
