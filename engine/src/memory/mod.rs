//! Vector Memory System
//!
//! Persistent learning and context retention. Similarity search runs over a
//! bag-of-words TF-IDF model with no external model dependency. The full
//! state (memories, patterns, vocabulary, IDF scores) round-trips through a
//! single JSON slot behind the `MemoryBackend` trait.

pub mod store;

use crate::decision::{ActionType, ExecutionPlan};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use store::MemoryBackend;
use tracing::{info, warn};

/// Hard cap on retained task memories (oldest evicted first)
const MAX_MEMORIES: usize = 1000;

/// Hard cap on retained patterns (lowest success rate evicted first)
const MAX_PATTERNS: usize = 100;

/// Patterns at or below this success rate are pruned
const MIN_PATTERN_SUCCESS: f64 = 0.5;

/// Minimum embedding vector length
const MIN_EMBEDDING_LEN: usize = 100;

/// A persisted record of one completed task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMemory {
    pub id: String,
    pub instruction: String,
    pub plan_summary: String,
    pub success: bool,
    pub timestamp: i64,
    pub result_summary: String,
    pub embedding: Vec<f64>,
}

/// A learned, reusable fragment
///
/// `success_rate` is a running weighted average over `usage_count` uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub code: Option<String>,
    pub description: String,
    pub success_rate: f64,
    pub usage_count: u64,
}

/// Result of a pattern query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternReport {
    pub query: String,
    pub patterns: Vec<Pattern>,
    pub total_patterns: usize,
    pub avg_success_rate: f64,
}

/// Aggregate counters over the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_memories: usize,
    pub successful_tasks: usize,
    pub patterns_learned: usize,
    pub vocabulary_size: usize,
}

/// On-disk shape of the memory slot
///
/// Field names and entry-list maps match the blob format of earlier hosts,
/// so an existing slot keeps loading. A missing slot is empty state.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(default)]
    memories: Vec<TaskMemory>,
    #[serde(default)]
    patterns: Vec<Pattern>,
    #[serde(default)]
    vocabulary: Vec<(String, usize)>,
    #[serde(default)]
    idf_scores: Vec<(String, f64)>,
}

/// TF-IDF backed task memory and pattern store
pub struct VectorMemory {
    backend: Arc<dyn MemoryBackend>,
    memories: Vec<TaskMemory>,
    patterns: Vec<Pattern>,
    vocabulary: HashMap<String, usize>,
    idf_scores: HashMap<String, f64>,
}

impl VectorMemory {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self {
            backend,
            memories: Vec::new(),
            patterns: Vec::new(),
            vocabulary: HashMap::new(),
            idf_scores: HashMap::new(),
        }
    }

    /// Load persisted state from the backend.
    ///
    /// A missing slot yields empty state. A malformed blob is discarded with
    /// a warning rather than failing initialization; the store is rebuilt
    /// from subsequent outcomes.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        if let Some(blob) = self.backend.load().await? {
            match serde_json::from_str::<PersistedState>(&blob) {
                Ok(state) => {
                    self.memories = state.memories;
                    self.patterns = state.patterns;
                    self.vocabulary = state.vocabulary.into_iter().collect();
                    self.idf_scores = state.idf_scores.into_iter().collect();
                }
                Err(e) => {
                    warn!(error = %e, "discarding malformed memory blob");
                }
            }
        }

        info!(memories = self.memories.len(), "memory initialized");
        Ok(())
    }

    /// Record the outcome of a completed task.
    ///
    /// Embeds the instruction, appends a `TaskMemory`, learns patterns from
    /// the plan when the task succeeded, enforces the retention caps, and
    /// persists the full state. Persistence is best-effort: a failing save
    /// is logged and swallowed.
    pub async fn store_outcome(
        &mut self,
        task_id: &str,
        instruction: &str,
        plan: &ExecutionPlan,
        result_summary: &str,
        success: bool,
    ) {
        let embedding = self.generate_embedding(instruction);

        self.memories.push(TaskMemory {
            id: task_id.to_string(),
            instruction: instruction.to_string(),
            plan_summary: plan.description.clone(),
            success,
            timestamp: chrono::Utc::now().timestamp_millis(),
            result_summary: result_summary.to_string(),
            embedding,
        });

        if success {
            self.update_patterns(plan);
        }

        if self.memories.len() > MAX_MEMORIES {
            let excess = self.memories.len() - MAX_MEMORIES;
            self.memories.drain(..excess);
        }

        if let Err(e) = self.persist().await {
            warn!(error = %e, "memory persist failed");
        }
    }

    /// Rank all stored memories by cosine similarity to the instruction and
    /// return the top `k`. Ties keep store order. Empty store yields an
    /// empty result.
    pub fn find_similar_tasks(&mut self, instruction: &str, k: usize) -> Vec<TaskMemory> {
        if self.memories.is_empty() {
            return Vec::new();
        }

        let query = self.generate_embedding(instruction);

        let mut scored: Vec<(usize, f64)> = self
            .memories
            .iter()
            .enumerate()
            .map(|(i, m)| (i, cosine_similarity(&query, &m.embedding)))
            .collect();

        // Stable sort: equal similarities keep insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .map(|(i, _)| self.memories[i].clone())
            .collect()
    }

    /// All learned patterns.
    pub fn get_patterns(&self) -> Vec<Pattern> {
        self.patterns.clone()
    }

    /// Patterns usable as component templates.
    pub fn get_component_patterns(&self) -> Vec<Pattern> {
        self.patterns
            .iter()
            .filter(|p| p.kind == "component")
            .cloned()
            .collect()
    }

    /// Report the patterns whose description contains `query`
    /// (case-insensitive), with their average success rate.
    pub fn analyze_patterns(&self, query: &str) -> PatternReport {
        let needle = query.to_lowercase();
        let relevant: Vec<Pattern> = self
            .patterns
            .iter()
            .filter(|p| p.description.to_lowercase().contains(&needle))
            .cloned()
            .collect();

        let avg_success_rate = if relevant.is_empty() {
            0.0
        } else {
            relevant.iter().map(|p| p.success_rate).sum::<f64>() / relevant.len() as f64
        };

        PatternReport {
            query: query.to_string(),
            patterns: relevant,
            total_patterns: self.patterns.len(),
            avg_success_rate,
        }
    }

    /// Fold one observation into the pattern set.
    ///
    /// Patterns are keyed by (kind, description). The success rate is a
    /// running weighted average; afterwards the set is pruned to rates above
    /// 0.5 and capped at the 100 most successful entries.
    pub fn learn_pattern(&mut self, kind: &str, code: &str, description: &str, success: bool) {
        match self
            .patterns
            .iter_mut()
            .find(|p| p.kind == kind && p.description == description)
        {
            Some(existing) => {
                let total_uses = existing.usage_count + 1;
                let total_success = existing.success_rate * existing.usage_count as f64
                    + if success { 1.0 } else { 0.0 };
                existing.success_rate = total_success / total_uses as f64;
                existing.usage_count = total_uses;
            }
            None => {
                self.patterns.push(Pattern {
                    kind: kind.to_string(),
                    code: Some(code.to_string()),
                    description: description.to_string(),
                    success_rate: if success { 1.0 } else { 0.0 },
                    usage_count: 1,
                });
            }
        }

        self.patterns.retain(|p| p.success_rate > MIN_PATTERN_SUCCESS);

        if self.patterns.len() > MAX_PATTERNS {
            self.patterns
                .sort_by(|a, b| b.success_rate.total_cmp(&a.success_rate));
            self.patterns.truncate(MAX_PATTERNS);
        }
    }

    /// Extract patterns from the write/generate steps of a successful plan.
    fn update_patterns(&mut self, plan: &ExecutionPlan) {
        for step in &plan.steps {
            if !matches!(
                step.action_type,
                ActionType::FileWrite | ActionType::GenerateComponent
            ) {
                continue;
            }

            let payload = step
                .params
                .get("content")
                .or_else(|| step.params.get("result"))
                .and_then(|v| v.as_str());

            if let Some(code) = payload {
                let kind = step.action_type.as_str().to_string();
                let description = step.description.clone();
                self.learn_pattern(&kind, code, &description, true);
            }
        }
    }

    /// Write the full state to the backend slot.
    pub async fn persist(&self) -> Result<(), EngineError> {
        let mut vocabulary: Vec<(String, usize)> = self
            .vocabulary
            .iter()
            .map(|(w, &i)| (w.clone(), i))
            .collect();
        vocabulary.sort_by_key(|(_, i)| *i);

        let mut idf_scores: Vec<(String, f64)> = self
            .idf_scores
            .iter()
            .map(|(w, &s)| (w.clone(), s))
            .collect();
        idf_scores.sort_by_key(|(w, _)| self.vocabulary.get(w).copied().unwrap_or(usize::MAX));

        let state = PersistedState {
            memories: self.memories.clone(),
            patterns: self.patterns.clone(),
            vocabulary,
            idf_scores,
        };

        let blob = serde_json::to_string(&state)?;
        self.backend.save(&blob).await
    }

    /// Aggregate counters for monitoring.
    pub fn get_stats(&self) -> MemoryStats {
        MemoryStats {
            total_memories: self.memories.len(),
            successful_tasks: self.memories.iter().filter(|m| m.success).count(),
            patterns_learned: self.patterns.len(),
            vocabulary_size: self.vocabulary.len(),
        }
    }

    /// Embed text into the TF-IDF vector space.
    ///
    /// The vocabulary grows monotonically as new tokens appear (queries
    /// included). IDF scores are computed lazily, once, the first time an
    /// embedding is requested while memories exist; until then every token
    /// weighs idf=1.
    fn generate_embedding(&mut self, text: &str) -> Vec<f64> {
        let words = tokenize(text);

        for word in &words {
            if !self.vocabulary.contains_key(word) {
                let idx = self.vocabulary.len();
                self.vocabulary.insert(word.clone(), idx);
            }
        }

        if self.idf_scores.is_empty() && !self.memories.is_empty() {
            self.calculate_idf();
        }

        let len = self.vocabulary.len().max(MIN_EMBEDDING_LEN);
        let mut embedding = vec![0.0; len];
        let total = words.len() as f64;

        for word in &words {
            if let Some(&idx) = self.vocabulary.get(word) {
                if idx < embedding.len() {
                    let count = words.iter().filter(|w| *w == word).count() as f64;
                    let tf = count / total;
                    let idf = self.idf_scores.get(word).copied().unwrap_or(1.0);
                    embedding[idx] = tf * idf;
                }
            }
        }

        normalize(embedding)
    }

    /// Score every vocabulary word by inverse document frequency over the
    /// stored memories: ln(total / (containing + 1)).
    fn calculate_idf(&mut self) {
        let doc_count = self.memories.len() as f64;
        let docs: Vec<Vec<String>> = self
            .memories
            .iter()
            .map(|m| tokenize(&m.instruction))
            .collect();

        for word in self.vocabulary.keys() {
            let docs_with_word = docs.iter().filter(|d| d.contains(word)).count() as f64;
            let idf = (doc_count / (docs_with_word + 1.0)).ln();
            self.idf_scores.insert(word.clone(), idf);
        }
    }
}

/// Cosine similarity over the common prefix of two vectors.
///
/// Norms are accumulated over that prefix only; if either prefix norm is
/// zero the similarity is zero.
pub(crate) fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let min_len = a.len().min(b.len());

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for i in 0..min_len {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// L2-normalize; a zero vector stays zero.
fn normalize(mut vector: Vec<f64>) -> Vec<f64> {
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm != 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// Lowercase, strip non-word characters to spaces, split on whitespace,
/// drop tokens of length <= 2.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .filter(|w| w.len() > 2)
        .map(str::to_string)
        .collect()
}
