use std::collections::HashMap;

use parking_lot::RwLock;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::core::{IndexDocument, RecordId};
use crate::index::{IndexError, SearchIndex};
use crate::query::{metadata_field_path, ConjunctionQuery, DATABASE_FIELD, TABLE_FIELD};
use crate::stats::IndexStats;

type DocId = u32;

/// field path -> 原文值 -> posting
type Postings = HashMap<String, HashMap<String, RoaringBitmap>>;

#[derive(Clone, Debug)]
struct DocSlot {
    id: RecordId,
    doc: IndexDocument,
}

#[derive(Debug, Default)]
struct Inner {
    ids: HashMap<RecordId, DocId>,
    /// DocId -> 文档；删除后留 None，墓碑过多时整体压缩
    docs: Vec<Option<DocSlot>>,
    postings: Postings,
}

/// 墓碑数达到该值且占 docs 一半以上时压缩
const COMPACT_MIN_TOMBSTONES: usize = 64;

/// 索引快照：按 DocId 顺序保存存活文档，用于离线检查
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub built_at_ns: u64,
    pub docs: Vec<(RecordId, IndexDocument)>,
}

/// 内嵌的精确匹配倒排索引（RoaringBitmap posting）
///
/// 纯内存、可丢弃：内容总能从存储重建，永远不是权威数据。
#[derive(Debug, Default)]
pub struct MetadataIndex {
    inner: RwLock<Inner>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        *self.inner.write() = Inner::default();
    }

    pub fn from_snapshot(snap: IndexSnapshot) -> Result<Self, IndexError> {
        let idx = Self::new();
        for (id, doc) in &snap.docs {
            idx.upsert(id, doc)?;
        }
        Ok(idx)
    }
}

fn now_ns() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn terms_of(doc: &IndexDocument) -> Vec<(String, String)> {
    let mut terms = Vec::with_capacity(doc.metadata.len() + 2);
    terms.push((DATABASE_FIELD.to_string(), doc.database.clone()));
    terms.push((TABLE_FIELD.to_string(), doc.table.clone()));
    for (name, field) in &doc.metadata {
        terms.push((metadata_field_path(name), field.value.clone()));
    }
    terms
}

impl Inner {
    fn add_terms(&mut self, doc_id: DocId, terms: &[(String, String)]) {
        for (field, value) in terms {
            self.postings
                .entry(field.clone())
                .or_default()
                .entry(value.clone())
                .or_default()
                .insert(doc_id);
        }
    }

    fn remove_terms(&mut self, doc_id: DocId, terms: &[(String, String)]) {
        for (field, value) in terms {
            let Some(values) = self.postings.get_mut(field) else {
                continue;
            };
            if let Some(bm) = values.get_mut(value) {
                bm.remove(doc_id);
                if bm.is_empty() {
                    values.remove(value);
                }
            }
            if values.is_empty() {
                self.postings.remove(field);
            }
        }
    }

    fn terms_of_slot(&self, doc_id: DocId) -> Vec<(String, String)> {
        match self.docs.get(doc_id as usize) {
            Some(Some(slot)) => terms_of(&slot.doc),
            _ => Vec::new(),
        }
    }

    fn tombstones(&self) -> usize {
        self.docs.len() - self.ids.len()
    }

    /// 按原顺序重新编号存活文档，丢弃全部墓碑
    fn compact(&mut self) {
        let live: Vec<DocSlot> = std::mem::take(&mut self.docs)
            .into_iter()
            .flatten()
            .collect();
        self.ids.clear();
        self.postings = Postings::default();
        for (n, slot) in live.into_iter().enumerate() {
            let doc_id = n as DocId;
            self.add_terms(doc_id, &terms_of(&slot.doc));
            self.ids.insert(slot.id.clone(), doc_id);
            self.docs.push(Some(slot));
        }
    }
}

impl SearchIndex for MetadataIndex {
    fn upsert(&self, id: &RecordId, doc: &IndexDocument) -> Result<(), IndexError> {
        let terms = terms_of(doc);
        let mut g = self.inner.write();

        let doc_id = match g.ids.get(id).copied() {
            Some(existing) => {
                let old = g.terms_of_slot(existing);
                g.remove_terms(existing, &old);
                existing
            }
            None => {
                let next: DocId = g
                    .docs
                    .len()
                    .try_into()
                    .map_err(|_| IndexError::Capacity(g.ids.len()))?;
                if next == DocId::MAX {
                    return Err(IndexError::Capacity(g.ids.len()));
                }
                g.docs.push(None);
                g.ids.insert(id.clone(), next);
                next
            }
        };

        g.add_terms(doc_id, &terms);
        g.docs[doc_id as usize] = Some(DocSlot {
            id: id.clone(),
            doc: doc.clone(),
        });
        Ok(())
    }

    fn delete(&self, id: &RecordId) -> Result<(), IndexError> {
        let mut g = self.inner.write();
        let Some(doc_id) = g.ids.remove(id) else {
            return Ok(());
        };
        let old = g.terms_of_slot(doc_id);
        g.remove_terms(doc_id, &old);
        g.docs[doc_id as usize] = None;

        let tombstones = g.tombstones();
        if tombstones >= COMPACT_MIN_TOMBSTONES && tombstones * 2 >= g.docs.len() {
            tracing::debug!(
                "compacting index: {} tombstones of {} slots",
                tombstones,
                g.docs.len()
            );
            g.compact();
        }
        Ok(())
    }

    fn search(&self, query: &ConjunctionQuery) -> Result<Vec<RecordId>, IndexError> {
        let g = self.inner.read();

        let mut lists: Vec<&RoaringBitmap> = Vec::with_capacity(query.clauses().len());
        for clause in query.clauses() {
            match g
                .postings
                .get(&clause.field)
                .and_then(|values| values.get(&clause.value))
            {
                Some(bm) => lists.push(bm),
                None => return Ok(Vec::new()),
            }
        }

        // 从最短 posting 开始求交
        lists.sort_by_key(|bm| bm.len());
        let Some((first, rest)) = lists.split_first() else {
            return Ok(Vec::new());
        };
        let mut acc = (*first).clone();
        for bm in rest {
            acc &= *bm;
            if acc.is_empty() {
                break;
            }
        }

        Ok(acc
            .iter()
            .filter_map(|doc_id| g.docs.get(doc_id as usize)?.as_ref())
            .map(|slot| slot.id.clone())
            .collect())
    }

    fn len(&self) -> usize {
        self.inner.read().ids.len()
    }

    fn stats(&self) -> IndexStats {
        let g = self.inner.read();
        let mut distinct_terms = 0usize;
        let mut postings_total = 0u64;
        let mut postings_bytes = 0u64;
        for values in g.postings.values() {
            distinct_terms += values.len();
            for bm in values.values() {
                postings_total += bm.len();
                postings_bytes += bm.serialized_size() as u64;
            }
        }
        IndexStats {
            doc_count: g.ids.len(),
            tombstones: g.tombstones(),
            field_count: g.postings.len(),
            distinct_terms,
            postings_total,
            postings_bytes,
        }
    }

    fn snapshot(&self) -> IndexSnapshot {
        let g = self.inner.read();
        IndexSnapshot {
            built_at_ns: now_ns(),
            docs: g
                .docs
                .iter()
                .flatten()
                .map(|s| (s.id.clone(), s.doc.clone()))
                .collect(),
        }
    }
}
