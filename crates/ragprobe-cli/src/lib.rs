//! Command line support for ragprobe
//!
//! Persistence of corpora, datasets and reports, and terminal rendering of
//! run summaries.

mod io;
mod ui;


pub use io::{load_corpus, load_dataset, read_jsonl, save_dataset, write_json, write_jsonl};
pub use ui::{
    format_generation, format_retrieval, format_synthesis, format_validation, print_generation,
    print_retrieval, print_synthesis, print_validation,
};

// Re-export core types
pub use ragprobe_core::{Error, Result};
