//! # doctalk-session
//!
//! Time-bounded chat sessions on top of [`doctalk_rag`].
//!
//! ## Overview
//!
//! - [`SessionStore`] — shared registry of sessions with idle-time eviction
//! - [`Session`] — one session's index, document names and conversation
//! - [`AnswerSynthesizer`] — turns a question and retrieved passages into an answer
//! - [`DocChat`] — upload, re-upload, chat, export and end-session operations
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `gemini` | Gemini `generateContent` synthesizer over `reqwest` |
//! | `openai` | Enables the OpenAI embedding provider in `doctalk-rag` |
//! | `onnx` | Enables the local ONNX embedding provider in `doctalk-rag` |
//! | `full` | All of the above |

pub mod chat;
pub mod config;
pub mod error;
pub mod prompt;
pub mod session;
pub mod store;
pub mod synthesizer;

#[cfg(feature = "gemini")]
pub mod gemini;

pub use chat::{ChatReply, DocChat, DocChatBuilder, UploadReceipt};
pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::{Result, SessionError};
pub use session::{Session, SessionSnapshot, Turn};
pub use store::SessionStore;
pub use synthesizer::{
    AnswerSynthesizer, ContextPassage, ExtractiveSynthesizer, NO_INFORMATION_REPLY, Synthesis,
    SynthesisRequest, cited_sources,
};

#[cfg(feature = "gemini")]
pub use gemini::GeminiSynthesizer;
