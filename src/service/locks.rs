use parking_lot::{Mutex, MutexGuard};
use xxhash_rust::xxh3::xxh3_64;

use crate::core::RecordId;

/// 按复合 ID 分片的互斥锁表
///
/// 同一 ID 永远落在同一分片，Write/Delete 的 文件+索引 两步在分片锁内完成。
/// 不同 ID 撞到同一分片只影响吞吐。
pub struct StripedLocks {
    stripes: Box<[Mutex<()>]>,
}

impl StripedLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stripes.len()
    }

    pub fn stripe_of(&self, id: &RecordId) -> usize {
        (xxh3_64(id.to_string().as_bytes()) % self.stripes.len() as u64) as usize
    }

    pub fn lock(&self, id: &RecordId) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(id)].lock()
    }
}
