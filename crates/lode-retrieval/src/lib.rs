pub mod engine;
pub mod error;
pub mod multimodal;

pub use engine::{SearchEngine, SearchRequest, SearchResponse, SearchResultItem};
pub use error::RetrievalError;
pub use multimodal::MultimodalRequest;
