//! Lexical similarity edges: TF-IDF cosine over identifier tokens.
//!
//! Vectors keep only discriminative terms (document frequency and IDF
//! bounded), similarities are accumulated through a postings index so
//! the cost tracks shared terms rather than all fragment pairs, and
//! each fragment keeps only its top-k neighbours. Raw cosine is
//! clamped into a per-language weight band: name overlap means more in
//! dynamic languages than in typed ones, where the semantic family
//! already caught the real references.

use std::collections::BTreeMap;

use crate::config::lang_profile;
use crate::edges::{push_edge, Edge, EdgeBuilder, EdgeContext};
use crate::tokenize::{extract_identifier_list, TokenProfile};
use crate::types::Fragment;

/// Clamp a raw cosine into the language band shared by both endpoints.
/// Returns 0 below the similarity floor.
fn clamp_weight(raw: f64, src_path: &str, dst_path: &str, min_similarity: f64) -> f64 {
    if raw < min_similarity {
        return 0.0;
    }
    let src = lang_profile(src_path.rsplit('.').next().unwrap_or(""));
    let dst = lang_profile(dst_path.rsplit('.').next().unwrap_or(""));
    let lex_min = src.lexical_min.max(dst.lexical_min);
    let lex_max = src.lexical_max.max(dst.lexical_max);
    let normalized = (raw - min_similarity) / (1.0 - min_similarity);
    lex_min + normalized * (lex_max - lex_min)
}

pub struct LexicalEdgeBuilder;

impl EdgeBuilder for LexicalEdgeBuilder {
    fn id(&self) -> &'static str {
        "similarity"
    }

    fn build(&self, fragments: &[Fragment], ctx: &EdgeContext<'_>) -> Vec<Edge> {
        let lexical = &ctx.config.lexical;
        let n_docs = fragments.len();
        if n_docs < 2 {
            return Vec::new();
        }

        // Term lists and document frequencies
        let term_lists: Vec<Vec<String>> = fragments
            .iter()
            .map(|f| extract_identifier_list(&f.content, TokenProfile::from_path(f.path())))
            .collect();

        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for terms in &term_lists {
            let mut seen: BTreeMap<&str, ()> = BTreeMap::new();
            for term in terms {
                seen.entry(term).or_insert(());
            }
            for (term, _) in seen {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let max_df = ((n_docs as f64 * lexical.max_df_ratio) as usize).max(1);
        let idf = |df: usize| ((n_docs as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0;

        // L2-normalized TF-IDF vectors over the surviving terms
        let mut vectors: Vec<BTreeMap<&str, f64>> = Vec::with_capacity(n_docs);
        for terms in &term_lists {
            let mut tf: BTreeMap<&str, usize> = BTreeMap::new();
            for term in terms {
                *tf.entry(term).or_insert(0) += 1;
            }
            let mut vec: BTreeMap<&str, f64> = BTreeMap::new();
            for (term, count) in tf {
                let df = doc_freq.get(term).copied().unwrap_or(0);
                if df == 0 || df > max_df {
                    continue;
                }
                let term_idf = idf(df);
                if term_idf < lexical.min_idf {
                    continue;
                }
                vec.insert(term, count as f64 * term_idf);
            }
            let norm = vec.values().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                for value in vec.values_mut() {
                    *value /= norm;
                }
            }
            vectors.push(vec);
        }

        // Postings: term -> (fragment index, weight); long lists skipped
        let mut postings: BTreeMap<&str, Vec<(usize, f64)>> = BTreeMap::new();
        for (i, vec) in vectors.iter().enumerate() {
            for (&term, &weight) in vec {
                postings.entry(term).or_default().push((i, weight));
            }
        }

        let mut dots: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for list in postings.values() {
            if list.len() > lexical.max_postings {
                continue;
            }
            for (a, &(i, wi)) in list.iter().enumerate() {
                for &(j, wj) in &list[a + 1..] {
                    let pair = if i < j { (i, j) } else { (j, i) };
                    *dots.entry(pair).or_insert(0.0) += wi * wj;
                }
            }
        }

        // Per-fragment neighbour candidates, then top-k
        let mut neighbours: BTreeMap<usize, Vec<(f64, usize)>> = BTreeMap::new();
        for (&(i, j), &sim) in &dots {
            if sim < lexical.min_similarity {
                continue;
            }
            let forward = clamp_weight(sim, fragments[i].path(), fragments[j].path(), lexical.min_similarity);
            let backward = clamp_weight(sim, fragments[j].path(), fragments[i].path(), lexical.min_similarity)
                * lexical.backward_factor;
            if forward > 0.0 {
                neighbours.entry(i).or_default().push((forward, j));
            }
            if backward > 0.0 {
                neighbours.entry(j).or_default().push((backward, i));
            }
        }

        let mut edges = Vec::new();
        for (i, mut candidates) in neighbours {
            candidates.sort_by(|a, b| {
                b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1))
            });
            for (weight, j) in candidates.into_iter().take(lexical.top_k_neighbors) {
                push_edge(&mut edges, "similarity", &fragments[i].id, &fragments[j].id, weight, None);
            }
        }
        edges
    }
}
