pub mod agent;
pub mod config;
pub mod gemini;
pub mod loader;
pub mod output;
pub mod prompts;
pub mod runner;
pub mod search;
pub mod server;
pub mod session;
pub mod web;
