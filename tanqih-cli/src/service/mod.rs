//! Cleaning service backends

pub mod gemini;
pub mod prompt;

pub use gemini::GeminiService;
pub use prompt::PromptTemplate;
