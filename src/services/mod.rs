pub mod bmi;
pub mod error;
pub mod extract;
pub mod groq; // Upstream chat-completion provider
pub mod prompts;
pub mod relay;

pub use groq::{CompletionProvider, GroqClient};
pub use relay::{HttpRelayClient, ProviderRelay, RelayClient};
