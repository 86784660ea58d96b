use std::path::{Path, PathBuf};
use std::time::Instant;

use ignore::WalkBuilder;
use thiserror::Error;

use crate::core::{IndexDocument, Record, RecordId};
use crate::index::SearchIndex;
use crate::stats::RebuildStats;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: ignore::Error,
    },

    #[error("unexpected layout at {path}: expected <database>/<table>/<key>, found {depth} segment(s)")]
    UnexpectedLayout { path: PathBuf, depth: usize },

    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 从存储根全量重建索引（存储为唯一权威）
///
/// 深度优先遍历 `databases/`，每个普通文件必须恰好位于
/// `<database>/<table>/<key>`；其他深度视为致命错误。
/// 某条记录 upsert 失败时放弃该 table 目录下剩余的兄弟记录，继续下一个 table。
pub struct IndexBuilder {
    root: PathBuf,
}

impl IndexBuilder {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn rebuild_into(&self, index: &dyn SearchIndex) -> Result<RebuildStats, BuildError> {
        let started = Instant::now();
        let mut stats = RebuildStats::default();
        let mut skipped_table: Option<PathBuf> = None;

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = entry.map_err(|source| BuildError::Walk {
                root: self.root.clone(),
                source,
            })?;
            let path = entry.path();

            if let Some(skip) = skipped_table.as_deref() {
                if path.starts_with(skip) {
                    continue;
                }
                skipped_table = None;
            }

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let (id, table_dir) = self.locate(path)?;
            let record = read_record(path)?;
            let doc = IndexDocument::project(id.database(), id.table(), &record);

            match index.upsert(&id, &doc) {
                Ok(()) => {
                    stats.indexed += 1;
                    tracing::debug!("indexed record {}", id);
                }
                Err(e) => {
                    tracing::error!(
                        "could not index record {}: {}; skipping rest of {}",
                        id,
                        e,
                        table_dir.display()
                    );
                    stats.skipped_tables += 1;
                    skipped_table = Some(table_dir);
                }
            }
        }

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Index rebuild: indexed={} skipped_tables={} elapsed={}ms",
            stats.indexed,
            stats.skipped_tables,
            stats.elapsed_ms
        );
        Ok(stats)
    }

    /// 文件路径 -> (RecordId, 所在 table 目录)
    fn locate(&self, path: &Path) -> Result<(RecordId, PathBuf), BuildError> {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let segments: Vec<&str> = rel
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        let depth = rel.components().count();

        let layout_err = || BuildError::UnexpectedLayout {
            path: path.to_path_buf(),
            depth,
        };
        if depth != 3 || segments.len() != 3 {
            return Err(layout_err());
        }
        let id = RecordId::new(segments[0], segments[1], segments[2]).map_err(|_| layout_err())?;
        let table_dir = path.parent().map(Path::to_path_buf).ok_or_else(layout_err)?;
        Ok((id, table_dir))
    }
}

fn read_record(path: &Path) -> Result<Record, BuildError> {
    let data = std::fs::read(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Record::decode(&data).map_err(|source| BuildError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Field;
    use crate::index::{IndexError, IndexSnapshot, MetadataIndex};
    use crate::query::ConjunctionQuery;
    use crate::stats::IndexStats;
    use crate::storage::RecordFiles;

    fn put(files: &RecordFiles, db: &str, table: &str, key: &str, email: &str) {
        let id = RecordId::new(db, table, key).unwrap();
        let rec = Record::new(key).with_field("email", Field::string(email));
        files.write(&id, &rec).unwrap();
    }

    /// 对指定 key 拒绝 upsert，其余委托给真实索引
    struct RejectKey {
        inner: MetadataIndex,
        key: &'static str,
    }

    impl SearchIndex for RejectKey {
        fn upsert(&self, id: &RecordId, doc: &IndexDocument) -> Result<(), IndexError> {
            if id.key() == self.key {
                return Err(IndexError::Capacity(self.inner.len()));
            }
            self.inner.upsert(id, doc)
        }

        fn delete(&self, id: &RecordId) -> Result<(), IndexError> {
            self.inner.delete(id)
        }

        fn search(&self, query: &ConjunctionQuery) -> Result<Vec<RecordId>, IndexError> {
            self.inner.search(query)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }

        fn stats(&self) -> IndexStats {
            self.inner.stats()
        }

        fn snapshot(&self) -> IndexSnapshot {
            self.inner.snapshot()
        }
    }

    #[test]
    fn rebuild_indexes_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let files = RecordFiles::open(dir.path()).unwrap();
        put(&files, "d1", "t1", "a", "a@x.com");
        put(&files, "d1", "t2", "b", "b@x.com");
        put(&files, "d2", "t1", ".hidden", "h@x.com");

        let idx = MetadataIndex::new();
        let stats = IndexBuilder::new(files.root().to_path_buf())
            .rebuild_into(&idx)
            .unwrap();

        assert_eq!(stats.indexed, 3);
        assert_eq!(stats.skipped_tables, 0);
        let q = ConjunctionQuery::for_table("d2", "t1").and_field("email", "h@x.com");
        assert_eq!(idx.search(&q).unwrap()[0].key(), ".hidden");
    }

    #[test]
    fn failed_upsert_skips_rest_of_table_only() {
        let dir = tempfile::tempdir().unwrap();
        let files = RecordFiles::open(dir.path()).unwrap();
        put(&files, "d", "t1", "a", "a@x.com");
        put(&files, "d", "t1", "b", "b@x.com");
        put(&files, "d", "t1", "c", "c@x.com");
        put(&files, "d", "t2", "d", "d@x.com");

        let idx = RejectKey {
            inner: MetadataIndex::new(),
            key: "b",
        };
        let stats = IndexBuilder::new(files.root().to_path_buf())
            .rebuild_into(&idx)
            .unwrap();

        // 按文件名排序：a 成功，b 失败，c 被跳过，t2 照常
        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.skipped_tables, 1);
        let t1 = idx.search(&ConjunctionQuery::for_table("d", "t1")).unwrap();
        assert_eq!(t1.iter().map(|id| id.key()).collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(idx.search(&ConjunctionQuery::for_table("d", "t2")).unwrap().len(), 1);
    }

    #[test]
    fn file_at_wrong_depth_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let files = RecordFiles::open(dir.path()).unwrap();
        put(&files, "d", "t", "a", "a@x.com");
        std::fs::write(files.root().join("d").join("loose"), b"{}").unwrap();

        let err = IndexBuilder::new(files.root().to_path_buf())
            .rebuild_into(&MetadataIndex::new())
            .unwrap_err();
        assert!(matches!(err, BuildError::UnexpectedLayout { depth: 2, .. }));
    }

    #[test]
    fn undecodable_record_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let files = RecordFiles::open(dir.path()).unwrap();
        let table = files.root().join("d").join("t");
        std::fs::create_dir_all(&table).unwrap();
        std::fs::write(table.join("broken"), b"not json").unwrap();

        let err = IndexBuilder::new(files.root().to_path_buf())
            .rebuild_into(&MetadataIndex::new())
            .unwrap_err();
        assert!(matches!(err, BuildError::Decode { .. }));
    }
}
