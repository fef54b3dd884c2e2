//! LLM provider implementations

mod anthropic;
mod factory;
mod http_client;
mod instrumented;
mod openai;

pub use anthropic::AnthropicProvider;
pub use factory::{LlmProviderConfig, LlmProviderFactory, ProviderKind};
pub use http_client::{sse_data_lines, ByteStream, HttpClient, HttpClientTrait, SseDataStream};
pub use instrumented::InstrumentedProvider;
pub use openai::OpenAiProvider;
