//! External collaborators
//!
//! - Temporary media hosting (upload)
//! - Language model (creative commentary)

pub mod llm_client;
pub mod upload_client;

pub use llm_client::{CompletionOptions, LanguageModel, LlmError, OpenRouterClient};
pub use upload_client::{LitterboxUploader, UploadError, UploadService, UploadTtl, UploadedMedia};
