//! WordPiece tokenization for BERT-style encoders.
//!
//! Input is lower-cased and split on whitespace. Each word is looked up
//! whole first, then split by greedy longest-prefix matching where every
//! piece after the first carries the `##` continuation marker. A position
//! where no prefix matches emits a single `[UNK]` and advances one character.
//! The sequence is framed by `[CLS]` / `[SEP]` and capped at [`MAX_TOKENS`].

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Maximum sequence length including `[CLS]` and `[SEP]`.
pub const MAX_TOKENS: usize = 512;

const CLS: &str = "[CLS]";
const SEP: &str = "[SEP]";
const UNK: &str = "[UNK]";
const CONTINUATION: &str = "##";

/// Id used for `[UNK]` when the vocabulary does not list it (BERT uncased).
const DEFAULT_UNK_ID: u32 = 100;

pub struct WordPieceTokenizer {
    vocab: HashMap<String, u32>,
    cls_id: u32,
    sep_id: u32,
    unk_id: u32,
}

impl WordPieceTokenizer {
    /// Build from an in-memory vocabulary. `[CLS]` and `[SEP]` must be present.
    pub fn new(vocab: HashMap<String, u32>) -> Result<Self> {
        let special = |token: &str| {
            vocab
                .get(token)
                .copied()
                .ok_or_else(|| Error::Parse(format!("vocabulary is missing {token}")))
        };
        let cls_id = special(CLS)?;
        let sep_id = special(SEP)?;
        let unk_id = vocab.get(UNK).copied().unwrap_or(DEFAULT_UNK_ID);

        Ok(Self {
            vocab,
            cls_id,
            sep_id,
            unk_id,
        })
    }

    /// Load a `vocab.txt` (one token per line, id = line number).
    pub fn from_file(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| Error::InvalidInput(format!("non UTF-8 path: {}", path.display())))?;
        let vocab = tokenizers::models::wordpiece::WordPiece::read_file(path_str)
            .map_err(|e| Error::Parse(format!("failed to read vocabulary {}: {e}", path.display())))?
            .into_iter()
            .collect::<HashMap<String, u32>>();

        tracing::debug!(path = %path.display(), size = vocab.len(), "vocabulary loaded");
        Self::new(vocab)
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Tokenize `text` into ids, framed by `[CLS]` ... `[SEP]`.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut ids = vec![self.cls_id];
        let lowered = text.to_lowercase();

        'words: for word in lowered.split_whitespace() {
            for id in self.encode_word(word) {
                if ids.len() >= MAX_TOKENS - 1 {
                    break 'words;
                }
                ids.push(id);
            }
        }

        ids.push(self.sep_id);
        ids
    }

    fn encode_word(&self, word: &str) -> Vec<u32> {
        if let Some(&id) = self.vocab.get(word) {
            return vec![id];
        }

        let chars: Vec<char> = word.chars().collect();
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let mut end = chars.len();
            let mut matched = None;

            while start < end {
                let sub: String = chars[start..end].iter().collect();
                let candidate = if start > 0 {
                    format!("{CONTINUATION}{sub}")
                } else {
                    sub
                };
                if let Some(&id) = self.vocab.get(&candidate) {
                    matched = Some(id);
                    break;
                }
                end -= 1;
            }

            match matched {
                Some(id) => {
                    pieces.push(id);
                    start = end;
                }
                None => {
                    pieces.push(self.unk_id);
                    start += 1;
                }
            }
        }

        pieces
    }
}
