//! Decode and aggregation policy shared by the tasks.
//!
//! Everything here is pure: it turns raw per-position scores plus token
//! offsets into words, entities, answer spans and pooled vectors.

use crate::api::{Entity, PoolingStrategy};
use crate::error::{Result, TaskError};
use std::cmp::Ordering;
use std::ops::Range;

/// The background ("no entity") class.
pub const BACKGROUND_LABEL: &str = "O";

/// Numerically stable softmax, computed in `f64`.
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f64> = logits.iter().map(|&l| f64::from(l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest element. The first wins on ties.
pub fn argmax(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

/// Drop a `B-` / `I-` prefix.
pub fn strip_bio(label: &str) -> &str {
    label
        .strip_prefix("B-")
        .or_else(|| label.strip_prefix("I-"))
        .unwrap_or(label)
}

/// One classified non-special token.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledToken {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f64,
    /// The token continues the previous word.
    pub continuation: bool,
}

/// A word: a token plus the continuation tokens following it.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub start: usize,
    pub end: usize,
    /// Prediction of the first sub-token.
    pub label: String,
    pub score: f64,
}

/// Group consecutive tokens into words. The span is the union of the
/// sub-token offsets; the label and score are the first sub-token's.
pub fn group_words(tokens: &[LabeledToken]) -> Vec<Word> {
    let mut words: Vec<Word> = Vec::new();
    for token in tokens {
        match words.last_mut() {
            Some(word) if token.continuation => {
                word.start = word.start.min(token.start);
                word.end = word.end.max(token.end);
            }
            _ => words.push(Word {
                start: token.start,
                end: token.end,
                label: token.label.clone(),
                score: token.score,
            }),
        }
    }
    words
}

fn entity(text: &str, start: usize, end: usize, label: &str, score: f64) -> Result<Entity> {
    let slice = text.get(start..end).ok_or_else(|| {
        TaskError::Inference(format!(
            "entity span {}..{} is not a valid slice of a {}-byte text",
            start,
            end,
            text.len()
        ))
    })?;
    Ok(Entity {
        text: slice.to_string(),
        start,
        end,
        label: label.to_string(),
        score,
    })
}

/// `none` strategy: one entity per raw token.
pub fn aggregate_none(text: &str, tokens: &[LabeledToken]) -> Result<Vec<Entity>> {
    tokens
        .iter()
        .map(|t| entity(text, t.start, t.end, strip_bio(&t.label), t.score))
        .collect()
}

/// Merge consecutive words whose labels agree once the BIO prefix is
/// dropped. The merged score is the mean of the word scores.
pub fn merge_words(text: &str, words: &[Word]) -> Result<Vec<Entity>> {
    let mut groups: Vec<(usize, usize, &str, f64, usize)> = Vec::new();
    for word in words {
        let label = strip_bio(&word.label);
        match groups.last_mut() {
            Some((_, end, l, sum, n)) if *l == label => {
                *end = word.end;
                *sum += word.score;
                *n += 1;
            }
            _ => groups.push((word.start, word.end, label, word.score, 1)),
        }
    }
    groups
        .into_iter()
        .map(|(start, end, label, sum, n)| entity(text, start, end, label, sum / n as f64))
        .collect()
}

/// Drop background-class entities.
pub fn filter_background(entities: Vec<Entity>) -> Vec<Entity> {
    entities
        .into_iter()
        .filter(|e| e.label != BACKGROUND_LABEL)
        .collect()
}

/// `simple` strategy: group, merge, then drop the background class.
pub fn aggregate_simple(text: &str, tokens: &[LabeledToken]) -> Result<Vec<Entity>> {
    Ok(filter_background(merge_words(text, &group_words(tokens))?))
}

/// Span-selection limits, already resolved to concrete values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanLimits {
    pub max_answers: usize,
    pub max_answer_length: usize,
    pub max_candidates: usize,
    pub min_score: f64,
}

/// A selected span over input positions, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredSpan {
    pub start: usize,
    pub end: usize,
    pub score: f64,
}

impl ScoredSpan {
    fn overlaps(&self, other: &ScoredSpan) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Choose answer spans from start/end logits.
///
/// Candidates are `(s, e)` pairs inside `positions` with `s <= e` and at
/// most `max_answer_length` tokens, ranked by `start[s] + end[e]` (earlier
/// start, then shorter span, on ties). The top `max_candidates` are scored
/// as `softmax(start)[s] * softmax(end)[e]` over `positions`, filtered by
/// `min_score`, then picked greedily without overlap. The result is sorted
/// by descending score.
pub fn select_spans(
    start_logits: &[f32],
    end_logits: &[f32],
    positions: Range<usize>,
    limits: SpanLimits,
) -> Result<Vec<ScoredSpan>> {
    let (start_slice, end_slice) = start_logits
        .get(positions.clone())
        .zip(end_logits.get(positions.clone()))
        .ok_or_else(|| {
            TaskError::Inference(format!(
                "span logits cover {}/{} positions, need {}",
                start_logits.len(),
                end_logits.len(),
                positions.end
            ))
        })?;
    let start_probs = softmax(start_slice);
    let end_probs = softmax(end_slice);
    let offset = positions.start;

    let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
    for s in positions.clone() {
        let last = positions.end.min(s.saturating_add(limits.max_answer_length));
        for e in s..last {
            candidates.push((start_logits[s] + end_logits[e], s, e));
        }
    }
    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then(a.1.cmp(&b.1))
            .then((a.2 - a.1).cmp(&(b.2 - b.1)))
    });
    candidates.truncate(limits.max_candidates);

    let mut selected: Vec<ScoredSpan> = Vec::new();
    for (_, s, e) in candidates {
        if selected.len() >= limits.max_answers {
            break;
        }
        let span = ScoredSpan {
            start: s,
            end: e,
            score: start_probs[s - offset] * end_probs[e - offset],
        };
        if span.score < limits.min_score {
            continue;
        }
        if selected.iter().any(|chosen| chosen.overlaps(&span)) {
            continue;
        }
        selected.push(span);
    }
    selected.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.start.cmp(&b.start))
            .then((a.end - a.start).cmp(&(b.end - b.start)))
    });
    Ok(selected)
}

/// Reduce per-token vectors to one vector.
///
/// `mean` and `max` skip positions flagged in `special`; if every position
/// is special they fall back to all positions.
pub fn pool(vectors: &[Vec<f32>], special: &[bool], strategy: PoolingStrategy) -> Result<Vec<f32>> {
    let first = vectors
        .first()
        .ok_or_else(|| TaskError::Inference("encoder returned no vectors".to_string()))?;
    if strategy == PoolingStrategy::Cls {
        return Ok(first.clone());
    }

    let mut selected: Vec<&Vec<f32>> = vectors
        .iter()
        .zip(special.iter().chain(std::iter::repeat(&false)))
        .filter(|(_, is_special)| !**is_special)
        .map(|(v, _)| v)
        .collect();
    if selected.is_empty() {
        selected = vectors.iter().collect();
    }
    let dim = first.len();
    if selected.iter().any(|v| v.len() != dim) {
        return Err(TaskError::Inference(
            "encoder returned vectors of differing sizes".to_string(),
        ));
    }

    let pooled = match strategy {
        PoolingStrategy::Mean => {
            let mut acc = vec![0.0f32; dim];
            for v in &selected {
                for (a, x) in acc.iter_mut().zip(v.iter()) {
                    *a += x;
                }
            }
            let n = selected.len() as f32;
            acc.into_iter().map(|a| a / n).collect()
        }
        PoolingStrategy::Max => {
            let mut acc = vec![f32::NEG_INFINITY; dim];
            for v in &selected {
                for (a, x) in acc.iter_mut().zip(v.iter()) {
                    *a = a.max(*x);
                }
            }
            acc
        }
        PoolingStrategy::Cls => first.clone(),
    };
    Ok(pooled)
}
