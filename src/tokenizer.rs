//! Tokenizer support using HuggingFace tokenizers

use crate::{Error, Result};
use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::debug;

/// Side on which a batch is padded to a common length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingSide {
    Left,
    Right,
}

/// The parts of `tokenizer_config.json` that affect batch encoding
#[derive(Debug, Default, Deserialize)]
struct TokenizerSettings {
    #[serde(default)]
    padding_side: Option<PaddingSide>,
}

/// A padded batch of prompts
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEncoding {
    /// `[batch, max_input_len]`
    pub input_ids: Array2<i32>,
    /// Unpadded length of each row
    pub input_lengths: Array1<i32>,
}

impl BatchEncoding {
    pub fn batch_size(&self) -> usize {
        self.input_ids.nrows()
    }

    pub fn max_input_len(&self) -> usize {
        self.input_ids.ncols()
    }
}

/// Wrapper around HuggingFace tokenizer
pub struct ModelTokenizer {
    tokenizer: Tokenizer,
    padding_side: PaddingSide,
}

impl ModelTokenizer {
    /// Load tokenizer from a model directory
    ///
    /// Reads `tokenizer.json`; `tokenizer_config.json`, when present, picks the
    /// padding side. Batches are left-padded otherwise.
    pub fn from_dir(model_dir: impl AsRef<Path>) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !tokenizer_path.exists() {
            return Err(Error::Tokenizer(format!(
                "No tokenizer.json found in {}",
                model_dir.display()
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::Tokenizer(format!("Failed to load tokenizer.json: {}", e)))?;
        // Padding is applied by encode_batch
        tokenizer.with_padding(None);

        let settings_path = model_dir.join("tokenizer_config.json");
        let settings: TokenizerSettings = if settings_path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&settings_path)?)?
        } else {
            TokenizerSettings::default()
        };
        let padding_side = settings.padding_side.unwrap_or(PaddingSide::Left);
        debug!("Tokenizer padding side: {:?}", padding_side);

        Ok(Self {
            tokenizer,
            padding_side,
        })
    }

    /// Override the padding side
    pub fn with_padding_side(mut self, padding_side: PaddingSide) -> Self {
        self.padding_side = padding_side;
        self
    }

    pub fn padding_side(&self) -> PaddingSide {
        self.padding_side
    }

    /// Encode text to token IDs with special tokens
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::Tokenizer(format!("Encoding failed: {}", e)))?;

        Ok(encoding.get_ids().to_vec())
    }

    /// Encode a batch of prompts, padding every row to the longest with `pad_id`
    pub fn encode_batch(&self, texts: &[String], pad_id: u32) -> Result<BatchEncoding> {
        if texts.is_empty() {
            return Err(Error::Tokenizer("cannot encode an empty batch".to_string()));
        }

        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| Error::Tokenizer(format!("Batch encoding failed: {}", e)))?;

        let rows: Vec<&[u32]> = encodings.iter().map(|e| e.get_ids()).collect();
        let max_len = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        if max_len == 0 {
            return Err(Error::Tokenizer("every prompt encoded to zero tokens".to_string()));
        }

        let pad = to_i32(pad_id)?;
        let mut input_ids = Array2::from_elem((rows.len(), max_len), pad);
        let mut input_lengths = Array1::zeros(rows.len());

        for (i, row) in rows.iter().enumerate() {
            let offset = match self.padding_side {
                PaddingSide::Left => max_len - row.len(),
                PaddingSide::Right => 0,
            };
            for (j, &id) in row.iter().enumerate() {
                input_ids[[i, offset + j]] = to_i32(id)?;
            }
            input_lengths[i] = to_i32(row.len() as u32)?;
        }

        Ok(BatchEncoding {
            input_ids,
            input_lengths,
        })
    }

    /// Decode token IDs to text
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| Error::Tokenizer(format!("Decoding failed: {}", e)))
    }

    /// Get vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    /// Look up a token's id
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    /// Get EOS token ID if available
    pub fn eos_token_id(&self) -> Option<u32> {
        ["</s>", "<eop>", "<|endoftext|>"]
            .iter()
            .find_map(|t| self.tokenizer.token_to_id(t))
    }

    /// Get PAD token ID if available
    pub fn pad_token_id(&self) -> Option<u32> {
        ["<pad>", "<|pad|>"]
            .iter()
            .find_map(|t| self.tokenizer.token_to_id(t))
    }
}

fn to_i32(id: u32) -> Result<i32> {
    i32::try_from(id).map_err(|_| Error::Tokenizer(format!("token id {} overflows i32", id)))
}
