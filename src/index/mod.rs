pub mod builder;
pub mod metadata;

use thiserror::Error;

use crate::core::{IndexDocument, RecordId};
use crate::query::ConjunctionQuery;
use crate::stats::IndexStats;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index is full ({0} documents)")]
    Capacity(usize),
}

/// 索引层抽象：协调器与重建器只依赖这个契约。
///
/// ## 契约（重要）
/// - 所有字段按原文精确匹配（keyword 分析），不切词、不归一化。
/// - `upsert` 覆盖同 ID 的旧文档；`delete` 未知 ID 视为成功。
/// - `search` 返回全部命中，每个 ID 恰好一次；顺序由实现决定，不承诺排序。
/// - 多个 ID 上的并发调用必须安全。
pub trait SearchIndex: Send + Sync {
    fn upsert(&self, id: &RecordId, doc: &IndexDocument) -> Result<(), IndexError>;
    fn delete(&self, id: &RecordId) -> Result<(), IndexError>;
    fn search(&self, query: &ConjunctionQuery) -> Result<Vec<RecordId>, IndexError>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> IndexStats;

    /// 存活文档的可序列化镜像（只用于离线检查）
    fn snapshot(&self) -> IndexSnapshot;
}

pub use builder::{BuildError, IndexBuilder};
pub use metadata::{IndexSnapshot, MetadataIndex};
