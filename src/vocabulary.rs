//! Bidirectional token-string ↔ id table over a dense id space.

use crate::error::{Result, TaskError};
use std::collections::HashMap;
use std::path::Path;

/// Token-string ↔ id mapping with ids dense in `[0, len)` and an optional
/// unknown-token fallback.
///
/// The unknown token is optional at construction so that small hand-built
/// vocabularies can be used; looking up an absent string without a fallback
/// is reported as [`TaskError::VocabularyInvariant`].
#[derive(Debug, Clone)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: Vec<String>,
    unk_id: Option<u32>,
}

impl Vocabulary {
    /// Build a vocabulary where each token's id is its position.
    ///
    /// Duplicate tokens are rejected since they would break the dense
    /// bijection.
    pub fn from_tokens<I, S>(tokens: I, unk_token: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id_to_token: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let mut token_to_id = HashMap::with_capacity(id_to_token.len());
        for (id, token) in id_to_token.iter().enumerate() {
            if token_to_id.insert(token.clone(), id as u32).is_some() {
                return Err(TaskError::Config(format!(
                    "Duplicate vocabulary entry '{}'",
                    token
                )));
            }
        }
        let unk_id = token_to_id.get(unk_token).copied();
        Ok(Self {
            token_to_id,
            id_to_token,
            unk_id,
        })
    }

    /// Build a vocabulary from an explicit token → id map. Ids must cover
    /// `[0, len)` exactly once.
    pub fn from_map(map: HashMap<String, u32>, unk_token: &str) -> Result<Self> {
        let mut id_to_token = vec![None; map.len()];
        for (token, &id) in &map {
            let slot = id_to_token.get_mut(id as usize).ok_or_else(|| {
                TaskError::Config(format!(
                    "Vocabulary id {} for '{}' is outside the dense range [0, {})",
                    id,
                    token,
                    map.len()
                ))
            })?;
            if slot.replace(token.clone()).is_some() {
                return Err(TaskError::Config(format!("Duplicate vocabulary id {}", id)));
            }
        }
        // Every slot is filled: map.len() entries landed on distinct in-range ids.
        let id_to_token = id_to_token.into_iter().flatten().collect();
        let unk_id = map.get(unk_token).copied();
        Ok(Self {
            token_to_id: map,
            id_to_token,
            unk_id,
        })
    }

    /// Read a line-per-token `vocab.txt` file (BERT format).
    pub fn from_txt_file(path: impl AsRef<Path>, unk_token: &str) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TaskError::Config(format!(
                "Failed to read vocabulary '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_tokens(contents.lines().map(|l| l.trim_end_matches('\r')), unk_token)
    }

    /// Read a JSON `{ "token": id, ... }` vocabulary file.
    pub fn from_json_file(path: impl AsRef<Path>, unk_token: &str) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TaskError::Config(format!(
                "Failed to read vocabulary '{}': {}",
                path.display(),
                e
            ))
        })?;
        let map: HashMap<String, u32> = serde_json::from_str(&contents).map_err(|e| {
            TaskError::Config(format!(
                "Invalid vocabulary JSON '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_map(map, unk_token)
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    /// The unknown-token id, if the vocabulary defines one.
    pub fn unk_id(&self) -> Option<u32> {
        self.unk_id
    }

    /// Exact lookup without fallback.
    pub fn get_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Exact reverse lookup.
    pub fn get_token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    /// Lookup with unknown-token fallback.
    pub fn id_or_unk(&self, token: &str) -> Result<u32> {
        self.get_id(token).or(self.unk_id).ok_or_else(|| {
            TaskError::VocabularyInvariant(format!(
                "token '{}' not in vocabulary and no unknown token is defined",
                token
            ))
        })
    }

    /// Map token strings to ids, substituting the unknown id for absent ones.
    pub fn ids_of<'a, I>(&self, tokens: I) -> Result<Vec<u32>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        tokens.into_iter().map(|t| self.id_or_unk(t)).collect()
    }

    /// Map ids back to token strings. Fails for ids outside `[0, len)`.
    pub fn strings_of(&self, ids: &[u32]) -> Result<Vec<String>> {
        ids.iter()
            .map(|&id| {
                self.get_token(id).map(str::to_string).ok_or_else(|| {
                    TaskError::VocabularyInvariant(format!(
                        "id {} outside vocabulary range [0, {})",
                        id,
                        self.len()
                    ))
                })
            })
            .collect()
    }
}
