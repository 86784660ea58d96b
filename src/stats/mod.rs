use std::fmt;

use serde::{Deserialize, Serialize};

/// 索引规模统计
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// 存活文档数
    pub doc_count: usize,
    /// 已删除但 DocId 未回收的槽位
    pub tombstones: usize,
    /// 不同字段路径数
    pub field_count: usize,
    /// 不同 (字段, 值) term 数
    pub distinct_terms: usize,
    /// 所有 posting 中的 DocId 总数
    pub postings_total: u64,
    /// posting 序列化后的估算大小（字节）
    pub postings_bytes: u64,
}

/// 一次全量重建的结果
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildStats {
    pub indexed: usize,
    /// upsert 失败后被放弃剩余记录的 table 目录数
    pub skipped_tables: usize,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub datapath: String,
    pub index: IndexStats,
    pub last_rebuild: Option<RebuildStats>,
}

fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           recstore Index Report                  ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ datapath: {:>38} ║", self.datapath)?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Metadata index:                                  ║")?;
        writeln!(
            f,
            "║   documents:    {:>10}                       ║",
            self.index.doc_count
        )?;
        writeln!(
            f,
            "║   tombstones:   {:>10}                       ║",
            self.index.tombstones
        )?;
        writeln!(
            f,
            "║   fields:       {:>10}                       ║",
            self.index.field_count
        )?;
        writeln!(
            f,
            "║   terms:        {:>10}                       ║",
            self.index.distinct_terms
        )?;
        writeln!(
            f,
            "║   postings:     {:>10}  ({:>10})          ║",
            self.index.postings_total,
            human_bytes(self.index.postings_bytes)
        )?;
        if let Some(r) = &self.last_rebuild {
            writeln!(f, "╠──────────────────────────────────────────────────╣")?;
            writeln!(f, "║ Last rebuild:                                    ║")?;
            writeln!(f, "║   indexed:      {:>10}                       ║", r.indexed)?;
            writeln!(
                f,
                "║   skipped tbl:  {:>10}                       ║",
                r.skipped_tables
            )?;
            writeln!(
                f,
                "║   elapsed:      {:>8}ms                       ║",
                r.elapsed_ms
            )?;
        }
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}
