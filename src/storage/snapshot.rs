use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::index::IndexSnapshot;

/// 索引文件 Header
const MAGIC: u32 = 0x5EC5_0001;
const VERSION_CURRENT: u32 = 1;
const STATE_COMMITTED: u32 = 0x0000_0001;
const STATE_INCOMPLETE: u32 = 0xFFFF_FFFF;
const HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 4; // magic + version + state + data_len + checksum

pub const SNAPSHOT_FILE: &str = "index.db";

/// 索引快照的原子存储
///
/// 落盘流程：
/// 1) 写 index.db.tmp 的 INCOMPLETE header（len/checksum 先置 0）
/// 2) `bincode::serialize_into(file)` 流式写 body，边写边算 checksum / data_len
/// 3) seek 回开头覆盖 COMMITTED header
/// 4) fsync(tmpfile)
/// 5) rename(tmp, target)
/// 6) fsync(dir)
///
/// 快照只用于离线检查，服务启动时整个目录会被删除后重建。
pub struct SnapshotStore {
    path: PathBuf,
}

struct SimpleChecksum {
    hash: u32,
    pending: [u8; 4],
    pending_len: usize,
}

impl SimpleChecksum {
    fn new() -> Self {
        Self {
            hash: 0,
            pending: [0u8; 4],
            pending_len: 0,
        }
    }

    fn update(&mut self, mut data: &[u8]) {
        if self.pending_len > 0 {
            let need = 4 - self.pending_len;
            let take = need.min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];

            if self.pending_len == 4 {
                self.process_chunk(self.pending);
                self.pending_len = 0;
                self.pending = [0u8; 4];
            }
        }

        let mut chunks = data.chunks_exact(4);
        for chunk in &mut chunks {
            self.process_chunk([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        let rest = chunks.remainder();
        if !rest.is_empty() {
            self.pending[..rest.len()].copy_from_slice(rest);
            self.pending_len = rest.len();
        }
    }

    fn finalize(mut self) -> u32 {
        if self.pending_len > 0 {
            let mut buf = [0u8; 4];
            buf[..self.pending_len].copy_from_slice(&self.pending[..self.pending_len]);
            self.process_chunk(buf);
        }
        self.hash
    }

    fn process_chunk(&mut self, chunk: [u8; 4]) {
        self.hash = self.hash.wrapping_add(u32::from_le_bytes(chunk));
        self.hash = self.hash.rotate_left(7);
    }
}

struct ChecksumWriter<'a, W: Write> {
    inner: &'a mut W,
    checksum: SimpleChecksum,
    bytes: u64,
}

impl<'a, W: Write> ChecksumWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            checksum: SimpleChecksum::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> (u64, u32) {
        (self.bytes, self.checksum.finalize())
    }
}

impl<'a, W: Write> Write for ChecksumWriter<'a, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.checksum.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn header(state: u32, data_len: u32, checksum: u32) -> [u8; HEADER_SIZE] {
    let mut h = [0u8; HEADER_SIZE];
    h[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    h[4..8].copy_from_slice(&VERSION_CURRENT.to_le_bytes());
    h[8..12].copy_from_slice(&state.to_le_bytes());
    h[12..16].copy_from_slice(&data_len.to_le_bytes());
    h[16..20].copy_from_slice(&checksum.to_le_bytes());
    h
}

impl SnapshotStore {
    /// `dir` 为索引目录（`<datapath>/index`）
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(SNAPSHOT_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    /// 删除整个索引目录（不存在视为成功）
    pub fn discard(&self) -> std::io::Result<()> {
        match std::fs::remove_dir_all(self.dir()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// 加载快照（校验 magic/version/state/checksum）；任何不一致返回 None
    pub fn load_if_valid(&self) -> anyhow::Result<Option<IndexSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = std::fs::read(&self.path)?;
        if data.len() < HEADER_SIZE {
            tracing::warn!("Snapshot too small, ignoring");
            return Ok(None);
        }

        let magic = u32::from_le_bytes(data[0..4].try_into()?);
        let version = u32::from_le_bytes(data[4..8].try_into()?);
        let state = u32::from_le_bytes(data[8..12].try_into()?);
        let data_len = u32::from_le_bytes(data[12..16].try_into()?) as usize;
        let stored_checksum = u32::from_le_bytes(data[16..20].try_into()?);

        if magic != MAGIC {
            tracing::warn!("Snapshot magic mismatch: {:#x} != {:#x}", magic, MAGIC);
            return Ok(None);
        }
        if version != VERSION_CURRENT {
            tracing::warn!(
                "Snapshot version mismatch: {} != {}",
                version,
                VERSION_CURRENT
            );
            return Ok(None);
        }
        if state != STATE_COMMITTED {
            tracing::warn!("Snapshot state INCOMPLETE, ignoring");
            return Ok(None);
        }

        let body = &data[HEADER_SIZE..];
        if body.len() != data_len {
            tracing::warn!("Snapshot data length mismatch");
            return Ok(None);
        }

        let computed = simple_checksum(body);
        if computed != stored_checksum {
            tracing::warn!(
                "Snapshot checksum mismatch: {} != {}",
                computed,
                stored_checksum
            );
            return Ok(None);
        }

        match bincode::deserialize::<IndexSnapshot>(body) {
            Ok(snap) => Ok(Some(snap)),
            Err(e) => {
                tracing::warn!("Snapshot deserialize failed: {}", e);
                Ok(None)
            }
        }
    }

    /// 原子写入快照
    pub fn write_atomic(&self, snap: &IndexSnapshot) -> anyhow::Result<()> {
        std::fs::create_dir_all(self.dir())?;

        let tmp_path = self.path.with_extension("db.tmp");

        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&header(STATE_INCOMPLETE, 0, 0))?;

        let (data_len_u64, checksum) = {
            let mut cw = ChecksumWriter::new(&mut file);
            bincode::serialize_into(&mut cw, snap)?;
            cw.finish()
        };

        let data_len: u32 = data_len_u64
            .try_into()
            .map_err(|_| anyhow::anyhow!("Snapshot too large (>{} bytes)", u32::MAX))?;

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header(STATE_COMMITTED, data_len, checksum))?;
        file.sync_all()?;

        std::fs::rename(&tmp_path, &self.path)?;

        if let Ok(dir) = std::fs::File::open(self.dir()) {
            let _ = dir.sync_all();
        }

        tracing::info!(
            "Snapshot written: {} docs, {} bytes",
            snap.docs.len(),
            HEADER_SIZE + data_len as usize
        );
        Ok(())
    }
}

/// 简单校验和（非加密，仅用于完整性检测）
fn simple_checksum(data: &[u8]) -> u32 {
    let mut c = SimpleChecksum::new();
    c.update(data);
    c.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Field, IndexDocument, Record, RecordId};

    fn sample() -> IndexSnapshot {
        let rec = Record::new("k").with_field("email", Field::string("a@x.com"));
        IndexSnapshot {
            built_at_ns: 42,
            docs: vec![(
                RecordId::new("d", "t", "k").unwrap(),
                IndexDocument::project("d", "t", &rec),
            )],
        }
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::in_dir(&dir.path().join("index"));
        assert!(store.load_if_valid().unwrap().is_none());

        store.write_atomic(&sample()).unwrap();
        let loaded = store.load_if_valid().unwrap().unwrap();
        assert_eq!(loaded.built_at_ns, 42);
        assert_eq!(loaded.docs, sample().docs);
        assert!(!store.path().with_extension("db.tmp").exists());
    }

    #[test]
    fn corrupted_body_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::in_dir(&dir.path().join("index"));
        store.write_atomic(&sample()).unwrap();

        let mut data = std::fs::read(store.path()).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        std::fs::write(store.path(), &data).unwrap();
        assert!(store.load_if_valid().unwrap().is_none());

        std::fs::write(store.path(), b"short").unwrap();
        assert!(store.load_if_valid().unwrap().is_none());
    }

    #[test]
    fn discard_removes_directory_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::in_dir(&dir.path().join("index"));
        store.discard().unwrap();
        store.write_atomic(&sample()).unwrap();
        store.discard().unwrap();
        assert!(!dir.path().join("index").exists());
    }

    #[test]
    fn checksum_is_independent_of_write_chunking() {
        let data: Vec<u8> = (0u8..=250).collect();
        let mut split = SimpleChecksum::new();
        split.update(&data[..3]);
        split.update(&data[3..10]);
        split.update(&data[10..]);
        assert_eq!(split.finalize(), simple_checksum(&data));
    }
}
