//! Memory service: agent-facing `save_memory` / `qdrant_find` tools.
//!
//! Wraps a [`MemoryRepository`] and an embedding provider to give agents a
//! namespaced scratch-and-recall store. `save_memory` stores a tagged memory
//! and eagerly computes its embedding (best-effort: embedding failures never
//! fail the save); `recall` performs ANN search scored by cosine similarity
//! against the query embedding, falling back to full-text search when
//! embeddings are disabled ([`NullEmbeddingProvider`] returns empty vectors).

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AccessorId, Memory, MemoryQuery, MemoryTier, MemoryType};
use crate::domain::ports::MemoryRepository;

use super::embedding_service::EmbeddingService;

/// A memory scored against a recall query.
#[derive(Debug, Clone)]
pub struct RecalledMemory {
    pub memory: Memory,
    pub score: f32,
}

/// Report produced by a maintenance sweep.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub expired_pruned: u64,
    pub promoted: usize,
}

/// Service backing the `save_memory` / `qdrant_find` agent tools.
pub struct MemoryService {
    repository: Arc<dyn MemoryRepository>,
    embeddings: Arc<EmbeddingService>,
}

impl MemoryService {
    pub fn new(repository: Arc<dyn MemoryRepository>, embeddings: Arc<EmbeddingService>) -> Self {
        Self { repository, embeddings }
    }

    /// `save_memory(content, type, tags[])`.
    ///
    /// Always written at `Working` tier; promotion to `Episodic`/`Semantic`
    /// happens only through [`Self::run_maintenance`] once accessed by
    /// multiple distinct accessors.
    pub async fn save_memory(
        &self,
        content: impl Into<String>,
        memory_type: MemoryType,
        tags: Vec<String>,
        source: AccessorId,
    ) -> DomainResult<Memory> {
        let content = content.into();
        let key = Uuid::new_v4().to_string();
        let mut memory = Memory::working(&key, &content)
            .with_type(memory_type)
            .with_source(source.to_string());
        for tag in tags {
            memory = memory.with_tag(tag);
        }
        if let Ok(vector) = self.embeddings.embed_single(&content).await {
            if !vector.is_empty() {
                memory = memory.with_embedding(vector);
            }
        }
        self.repository.store(&memory).await?;
        Ok(memory)
    }

    /// `qdrant_find(query, limit)` - approximate-nearest-neighbour recall.
    ///
    /// Scores every candidate memory by cosine similarity against the
    /// query's embedding. When the embedding provider is disabled (empty
    /// query vector), falls back to the repository's full-text search.
    pub async fn qdrant_find(
        &self,
        query: &str,
        namespace: Option<&str>,
        limit: usize,
        accessor: AccessorId,
    ) -> DomainResult<Vec<RecalledMemory>> {
        let query_vector = self.embeddings.embed_single(query).await.unwrap_or_default();

        let candidates = if query_vector.is_empty() {
            self.repository.search(query, namespace, limit).await?
        } else {
            let mut mq = MemoryQuery::new().limit(limit.saturating_mul(4).max(limit));
            if let Some(ns) = namespace {
                mq = mq.namespace(ns);
            }
            self.repository.query(mq).await?
        };

        let mut scored: Vec<RecalledMemory> = candidates
            .into_iter()
            .map(|memory| {
                let score = memory
                    .cosine_similarity(&query_vector)
                    .unwrap_or_else(|| if query_vector.is_empty() { 1.0 } else { 0.0 });
                RecalledMemory { memory, score }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);

        for hit in &scored {
            let mut memory = hit.memory.clone();
            memory.record_access(accessor.clone());
            self.repository.update(&memory).await?;
        }

        Ok(scored)
    }

    /// Expire stale working/episodic memories and promote ones accessed by
    /// enough distinct accessors. Intended to be driven by
    /// [`super::memory_decay_daemon::MemoryDecayDaemon`] on a fixed interval.
    pub async fn run_maintenance(&self, min_distinct_accessors_for_promotion: usize) -> DomainResult<MaintenanceReport> {
        let expired_pruned = self.repository.prune_expired().await?;

        let mut promoted = 0;
        for tier in [MemoryTier::Working, MemoryTier::Episodic] {
            for mut memory in self.repository.list_by_tier(tier).await? {
                if memory.distinct_accessor_count() >= min_distinct_accessors_for_promotion
                    && memory.promote().is_ok()
                {
                    self.repository.update(&memory).await?;
                    promoted += 1;
                }
            }
        }

        Ok(MaintenanceReport { expired_pruned, promoted })
    }
}
