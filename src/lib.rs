//! Translate the English localization file shipped inside Minecraft mod
//! archives into Korean with Gemini, and repackage each mod with the
//! translated file alongside the original.

pub mod archive;
pub mod config;
pub mod error;
pub mod jsonc;
pub mod locator;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod translation;

pub use error::{PipelineError, Result};
pub use pipeline::{CancelFlag, Pipeline, PipelineOptions, RunSummary};
pub use translation::{GeminiTranslator, KeyPolicy, Translator};
