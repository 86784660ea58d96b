use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::core::{Record, RecordId};
use crate::error::{Result, StoreError};

pub const DATABASES_DIR: &str = "databases";
pub const STAGING_DIR: &str = "tmp";

/// 按文件持久化记录：`<datapath>/databases/<db>/<table>/<key>`
///
/// 写入先落到 `<datapath>/tmp` 的 staging 文件，再 rename 覆盖目标，
/// 读者不会看到半写的记录。不提供跨进程锁。
pub struct RecordFiles {
    root: PathBuf,
    staging: PathBuf,
}

impl RecordFiles {
    pub fn open(datapath: &Path) -> Result<Self> {
        let root = datapath.join(DATABASES_DIR);
        let staging = datapath.join(STAGING_DIR);

        match fs::metadata(&root) {
            Ok(md) if !md.is_dir() => {
                return Err(StoreError::Internal(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                create_private_dir_all(&root).map_err(|e| {
                    StoreError::Internal(format!("create {}: {e}", root.display()))
                })?;
            }
            Err(e) => {
                return Err(StoreError::Internal(format!("stat {}: {e}", root.display())));
            }
        }
        create_private_dir_all(&staging)
            .map_err(|e| StoreError::Internal(format!("create {}: {e}", staging.display())))?;
        let purged = purge_staging(&staging)
            .map_err(|e| StoreError::Internal(format!("clear {}: {e}", staging.display())))?;
        if purged > 0 {
            tracing::warn!(
                "Removed {} leftover staging file(s) from {}",
                purged,
                staging.display()
            );
        }

        Ok(Self { root, staging })
    }

    /// `databases/` 目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, id: &RecordId) -> PathBuf {
        self.root.join(id.relative_path())
    }

    pub fn read(&self, id: &RecordId) -> Result<Record> {
        let path = self.path_of(id);
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!("record {id}")));
            }
            Err(e) => return Err(StoreError::Internal(format!("read {id}: {e}"))),
        };
        Record::decode(&data).map_err(|e| StoreError::Internal(format!("decode {id}: {e}")))
    }

    pub fn write(&self, id: &RecordId, record: &Record) -> Result<()> {
        let bytes = record
            .encode()
            .map_err(|e| StoreError::Internal(format!("encode {id}: {e}")))?;

        let path = self.path_of(id);
        if let Some(parent) = path.parent() {
            create_private_dir_all(parent)
                .map_err(|e| StoreError::Internal(format!("create namespace for {id}: {e}")))?;
        }

        // staging 与目标在同一 datapath 下，rename 为原子替换
        let mut tmp = tempfile::Builder::new()
            .prefix(".rec-")
            .tempfile_in(&self.staging)
            .map_err(|e| StoreError::Internal(format!("stage {id}: {e}")))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::Internal(format!("write {id}: {e}")))?;
        tmp.persist(&path)
            .map_err(|e| StoreError::Internal(format!("persist {id}: {}", e.error)))?;
        Ok(())
    }

    pub fn delete(&self, id: &RecordId) -> Result<()> {
        match fs::remove_file(self.path_of(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("record {id}")))
            }
            Err(e) => Err(StoreError::Internal(format!("delete {id}: {e}"))),
        }
    }

    pub fn databases(&self) -> Result<Vec<String>> {
        list_dirs(&self.root)
            .map_err(|e| StoreError::Internal(format!("read database directory: {e}")))
    }

    pub fn tables(&self, database: &str) -> Result<Vec<String>> {
        crate::core::validate_segment("database", database)?;
        match list_dirs(&self.root.join(database)) {
            Ok(v) => Ok(v),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("database {database}")))
            }
            Err(e) => Err(StoreError::Internal(format!(
                "read tables of {database}: {e}"
            ))),
        }
    }
}

/// 清掉上次崩溃遗留在 staging 的半成品（只删普通文件）
fn purge_staging(staging: &Path) -> std::io::Result<usize> {
    let mut purged = 0;
    for ent in fs::read_dir(staging)? {
        let ent = ent?;
        if !ent.file_type()?.is_file() {
            continue;
        }
        match fs::remove_file(ent.path()) {
            Ok(()) => purged += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(purged)
}

/// 非递归列出子目录名（排序）；普通文件与非 UTF-8 名字忽略
fn list_dirs(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for ent in fs::read_dir(dir)? {
        let ent = ent?;
        if !ent.file_type()?.is_dir() {
            continue;
        }
        if let Ok(name) = ent.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(unix)]
fn create_private_dir_all(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir_all(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}
