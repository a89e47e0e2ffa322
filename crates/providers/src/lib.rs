//! Remote model client for emissary.
//!
//! One backend: an Azure-hosted OpenAI chat-completions deployment,
//! implementing the `emissary_core::Provider` trait.

pub mod azure_openai;

pub use azure_openai::AzureOpenAiProvider;
