//! Prompt template for the cleaning model

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Placeholder replaced with the chunk text
pub const TEXT_PLACEHOLDER: &str = "{text}";

const ARABIC_CORPUS_PROMPT: &str = r#"You are an Arabic linguist preparing a dialectal Arabic corpus for language model pre-training.
Clean and normalize the text below. Reply with the cleaned text only: no commentary, no explanations, no headings.

Rules:
1. Orthography: normalize alif maqsura (ى) to ya (ي) except where the word requires it; strip tashkeel and tatweel; reduce laughter such as "ههههه" to "ههه"; collapse repeated punctuation ("!!!", "؟؟؟") to a single mark; drop timestamps, HTML, emojis, text art and social media artifacts.
2. Spelling: fix typos and common misspellings; prefer the most common variant of a word.
3. Punctuation: add missing periods, commas and question marks; split run-on sentences.
4. Content: remove filler that carries no meaning ("آآآ", "امممم", stuttered "يعني"); keep transliterated foreign words but spell them consistently.

Never translate the dialect into Modern Standard Arabic and never remove dialect words or expressions.

Text:
{text}"#;

/// Prompt with a `{text}` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: ARABIC_CORPUS_PROMPT.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Use `template`, which must contain `{text}`
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(TEXT_PLACEHOLDER) {
            bail!("prompt template has no {TEXT_PLACEHOLDER} placeholder");
        }
        Ok(Self { template })
    }

    /// Read a template from `path`
    pub fn from_file(path: &Path) -> Result<Self> {
        let template = fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
        Self::new(template).with_context(|| format!("Invalid prompt file: {}", path.display()))
    }

    /// Substitute the chunk text
    pub fn render(&self, text: &str) -> String {
        self.template.replacen(TEXT_PLACEHOLDER, text, 1)
    }
}
