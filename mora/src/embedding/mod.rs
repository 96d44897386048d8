//! Text embedding providers used for retrieval and ingestion

mod gemini;
mod ollama;
mod openai;
mod provider;

pub use gemini::GeminiEmbedder;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use provider::{create_provider, EmbeddingProvider, ProviderConfig};
