// src/agent/mod.rs
pub mod event_extractor;
pub mod title_summarizer;

pub use event_extractor::EventExtractor;
pub use title_summarizer::TitleSummarizer;
