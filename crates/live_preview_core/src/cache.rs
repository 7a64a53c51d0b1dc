//! Per-slot cache of rendered chunk fragments.
//!
//! Each pass re-partitions the whole document, but the tokens of untouched
//! blocks come out identical, so a chunk is only handed to the renderer when
//! it differs from what occupied the same slot during the previous pass.

use crate::chunk::Chunk;
use crate::env::RenderEnvironment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether `next` must be rendered again instead of reusing the fragment of `previous`.
///
/// Fence tokens carry highlighter output in their `attrs`, which would make
/// every code block look changed; those attrs are left out of the comparison.
/// Everything else is compared structurally and in order. A chunk that moved
/// to another slot counts as changed.
pub fn should_rerender(previous: &Chunk, next: &Chunk) -> bool {
    if previous.slot() != next.slot() {
        return true;
    }
    let (previous, next) = (previous.tokens(), next.tokens());
    previous.len() != next.len()
        || previous
            .iter()
            .zip(next)
            .any(|(a, b)| !a.eq_ignoring_volatile(b))
}

/// Counters of one render pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub rendered: usize,
    pub reused: usize,
}

#[derive(Debug)]
struct CacheEntry {
    chunk: Chunk,
    html: String,
}

#[derive(Debug, Default)]
pub struct ChunkCache {
    entries: Vec<Option<CacheEntry>>,
    /// Footnote numbering the cached fragments were rendered with.
    footnotes: Option<HashMap<String, usize>>,
    stats: CacheStats,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pass against the environment of the freshly tokenized body.
    ///
    /// Fragments embed footnote numbers, so a renumbering invalidates all of them.
    pub fn begin_pass(&mut self, env: &RenderEnvironment) {
        self.stats = CacheStats::default();
        if self.footnotes.as_ref() != Some(env.footnotes()) {
            if !self.entries.is_empty() {
                tracing::debug!("Footnote numbering changed, dropping cached fragments");
            }
            self.entries.clear();
            self.footnotes = Some(env.footnotes().clone());
        }
    }

    /// Returns the fragment of `chunk`, rendering it only when its slot changed.
    pub fn fragment<F>(&mut self, chunk: Chunk, render: F) -> String
    where
        F: FnOnce(&mut Chunk) -> String,
    {
        let slot = chunk.slot();

        if let Some(Some(entry)) = self.entries.get(slot) {
            if !should_rerender(&entry.chunk, &chunk) {
                self.stats.reused += 1;
                return entry.html.clone();
            }
        }

        let mut chunk = chunk;
        let html = render(&mut chunk);
        self.stats.rendered += 1;

        if self.entries.len() <= slot {
            self.entries.resize_with(slot + 1, || None);
        }
        self.entries[slot] = Some(CacheEntry {
            chunk,
            html: html.clone(),
        });

        html
    }

    /// Drop the slots past the end of the document and return the pass counters.
    pub fn finish_pass(&mut self, chunk_count: usize) -> CacheStats {
        self.entries.truncate(chunk_count);
        tracing::trace!(
            rendered = self.stats.rendered,
            reused = self.stats.reused,
            "Finished render pass"
        );
        self.stats
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.footnotes = None;
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
