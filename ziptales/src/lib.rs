// Library interface for ziptales modules
// This allows tests and the binaries to import modules

pub mod article;
pub mod credibility;
pub mod ingestion;
pub mod llm;
pub mod news;
pub mod profile;
pub mod server;
pub mod store;
pub mod votes;
