pub mod augment;
pub mod context;
pub mod retrieval;

pub use augment::Augmenter;
pub use context::{ citation, citations, RetrievedChunk, RetrievedContext };
pub use retrieval::{ HttpRetriever, RetrievalError, RetrievalRequest, Retriever };
