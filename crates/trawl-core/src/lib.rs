//! trawl-core
//!
//! Task lease queue for distributed scraping workers.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, network, task, result）
//! - **queue**: status と lease の状態遷移、store の実装（memory / json file / postgres）
//! - **ports**: 抽象化レイヤー（TaskStore, ResultSink, Extractor, Clock, IdGenerator）
//! - **app**: TaskService, 処理ループ, fan-out, HTTP, seed
//! - **impls**: sink / extractor の実装
//! - **config**: TOML 設定
//! - **observability**: status ごとの件数
//! - **error**: エラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
