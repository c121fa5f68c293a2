pub mod engine;

pub use engine::{
    generate_prompt, Answer, PaperRef, RagEngine, RagError, RetrievedChunk, Retriever,
};
