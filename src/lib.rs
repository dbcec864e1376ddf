//! Tokenizer visualizer: compare how different tokenizers split text, chat
//! conversations and JSONL datasets.

pub mod batch;
pub mod cli;
pub mod color;
pub mod config;
pub mod error;
pub mod jsonl;
pub mod manager;
pub mod metrics;
pub mod repository;
pub mod shape;
pub mod tokenizer;
pub mod ui;
