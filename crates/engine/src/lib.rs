pub mod config;
pub mod error;
pub mod novelty;
pub mod orchestrator;
pub mod prompt;
pub mod recommend;
pub mod safety;
pub mod sanitize;
pub mod selector;
pub mod stop;
pub mod synthesis;
pub mod title;
pub mod types;
