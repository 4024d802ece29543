pub mod client;
pub mod parser;
pub mod prompts;
pub mod requester;
pub mod types;

#[cfg(feature = "providers")]
pub mod gemini;
#[cfg(feature = "providers")]
pub mod groq;

pub use client::*;
pub use parser::*;
pub use requester::*;
pub use types::*;

#[cfg(feature = "providers")]
pub use gemini::GeminiClient;
#[cfg(feature = "providers")]
pub use groq::GroqClient;
