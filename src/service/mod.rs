//! 一致性协调器
//!
//! 每条记录同时存在两种表示：权威的存储文件 + 派生的索引文档，
//! 两者只通过复合 ID 关联。这里固定每种操作对存储/索引的调用顺序：
//!
//! - Write：先写文件，再 upsert 索引。索引失败不回滚文件（未索引但已存储，直到下次重建）。
//! - Delete：先删文件，再删索引文档。索引失败留下悬挂文档（直到下次重建）。
//! - 谓词读：索引求交 -> 逐个命中回读文件。
//!
//! 同一 ID 的 Write/Delete 在分片锁内串行，文件与索引文档总是来自同一次写入。
//! 按需重建持有 rebuild gate 写锁，期间没有变更在途。

pub mod locks;
pub mod request;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};

use crate::config::{Config, HydrationPolicy};
use crate::core::{validate_segment, IndexDocument, Record, RecordId};
use crate::error::{Result, StoreError};
use crate::index::{IndexBuilder, MetadataIndex, SearchIndex};
use crate::query::ConjunctionQuery;
use crate::stats::{RebuildStats, StatusReport};
use crate::storage::{RecordFiles, SnapshotStore};

pub use locks::StripedLocks;
pub use request::{DeleteRequest, ListRequest, ReadRequest, WriteRequest};

/// 默认使用内嵌的 `MetadataIndex`；按需重建时用 `S::default()` 构造新索引
pub struct Store<S = MetadataIndex> {
    datapath: PathBuf,
    files: RecordFiles,
    index: ArcSwap<S>,
    snapshots: SnapshotStore,
    locks: StripedLocks,
    rebuild_gate: RwLock<()>,
    hydration: HydrationPolicy,
    last_rebuild: Mutex<Option<RebuildStats>>,
}

impl Store {
    pub fn open(cfg: &Config) -> Result<Self> {
        Self::open_with(cfg)
    }
}

impl<S: SearchIndex + Default> Store<S> {
    /// 打开存储并在返回前完成一次全量重建：
    /// 1) 删除旧索引目录（索引状态不跨进程保留）
    /// 2) 遍历存储重建索引
    /// 3) 写首个快照（best-effort）
    pub fn open_with(cfg: &Config) -> Result<Self> {
        cfg.validate()
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;

        let snapshots = SnapshotStore::in_dir(&cfg.index_dir());
        snapshots.discard().map_err(|e| {
            StoreError::Internal(format!("remove {}: {e}", snapshots.dir().display()))
        })?;

        let files = RecordFiles::open(&cfg.datapath)?;
        let index = S::default();
        let stats = IndexBuilder::new(files.root().to_path_buf()).rebuild_into(&index)?;

        let store = Self {
            datapath: cfg.datapath.clone(),
            files,
            index: ArcSwap::from_pointee(index),
            snapshots,
            locks: StripedLocks::new(cfg.lock_stripes),
            rebuild_gate: RwLock::new(()),
            hydration: cfg.hydration,
            last_rebuild: Mutex::new(Some(stats)),
        };
        if let Err(e) = store.flush_snapshot() {
            tracing::warn!("Initial index snapshot failed: {}", e);
        }
        tracing::info!(
            "Store ready at {} ({} records indexed)",
            store.datapath.display(),
            store.index.load().len()
        );
        Ok(store)
    }

    pub fn datapath(&self) -> &Path {
        &self.datapath
    }

    pub fn read(&self, req: &ReadRequest) -> Result<Vec<Record>> {
        if let Some(key) = req.key.as_deref().filter(|k| !k.is_empty()) {
            let id = RecordId::new(&req.database, &req.table, key)?;
            return Ok(vec![self.files.read(&id)?]);
        }

        // 空 `where` 与缺省等价，不提供整表扫描
        let Some(predicates) = req.predicates.as_ref().filter(|p| !p.is_empty()) else {
            return Err(StoreError::InvalidArgument(
                "read needs either a key or where predicates".to_string(),
            ));
        };
        validate_segment("database", &req.database)?;
        validate_segment("table", &req.table)?;

        let query = ConjunctionQuery::from_where(&req.database, &req.table, predicates);
        let hits = self.index.load().search(&query)?;
        tracing::debug!(
            "read {}/{} where {:?}: {} hits",
            req.database,
            req.table,
            predicates,
            hits.len()
        );

        let window = hits
            .into_iter()
            .skip(req.offset.unwrap_or(0))
            .take(req.limit.unwrap_or(usize::MAX));

        let mut records = Vec::new();
        for id in window {
            match self.files.read(&id) {
                Ok(rec) => records.push(rec),
                Err(StoreError::NotFound(_)) if self.hydration == HydrationPolicy::SkipStale => {
                    tracing::warn!("index hit {} has no backing file, skipping", id);
                }
                Err(StoreError::NotFound(msg)) => {
                    tracing::warn!("index hit {} has no backing file", id);
                    return Err(StoreError::NotFound(msg));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    pub fn write(&self, database: &str, table: &str, record: &Record) -> Result<()> {
        let id = RecordId::new(database, table, &record.key)?;
        let _gate = self.rebuild_gate.read();
        let _guard = self.locks.lock(&id);

        self.files.write(&id, record)?;

        let doc = IndexDocument::project(database, table, record);
        if let Err(e) = self.index.load().upsert(&id, &doc) {
            // 文件已提交，不回滚：记录保持 已存储/未索引 直到下次重建
            tracing::error!("could not index record metadata for {}: {}", id, e);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn delete(&self, database: &str, table: &str, key: &str) -> Result<()> {
        let id = RecordId::new(database, table, key)?;
        let _gate = self.rebuild_gate.read();
        let _guard = self.locks.lock(&id);

        self.files.delete(&id)?;

        if let Err(e) = self.index.load().delete(&id) {
            tracing::error!("could not remove record {} from index: {}", id, e);
            return Err(e.into());
        }
        Ok(())
    }

    /// 接口保留但不实现：总是成功且无结果
    pub fn list(&self, _req: &ListRequest) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    pub fn databases(&self) -> Result<Vec<String>> {
        self.files.databases()
    }

    pub fn tables(&self, database: &str) -> Result<Vec<String>> {
        self.files.tables(database)
    }

    /// 按需全量重建：在新索引上构建完成后原子切换，失败时保留旧索引
    pub fn reindex(&self) -> Result<RebuildStats> {
        let stats = {
            let _gate = self.rebuild_gate.write();
            let fresh = S::default();
            let stats = IndexBuilder::new(self.files.root().to_path_buf()).rebuild_into(&fresh)?;
            self.index.store(Arc::new(fresh));
            stats
        };
        *self.last_rebuild.lock() = Some(stats.clone());

        if let Err(e) = self.flush_snapshot() {
            tracing::warn!("Index snapshot after rebuild failed: {}", e);
        }
        Ok(stats)
    }

    pub fn flush_snapshot(&self) -> Result<()> {
        let snap = self.index.load().snapshot();
        self.snapshots
            .write_atomic(&snap)
            .map_err(StoreError::internal)
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            datapath: self.datapath.display().to_string(),
            index: self.index.load().stats(),
            last_rebuild: self.last_rebuild.lock().clone(),
        }
    }
}
