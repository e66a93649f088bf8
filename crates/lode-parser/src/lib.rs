pub mod chunker;
pub mod detect;
pub mod error;
pub mod media;
pub mod metadata;
pub mod office;
pub mod text;

mod dispatch;

pub use chunker::{chunk_text, has_paragraph_markers};
pub use detect::{decode_text, is_binary, title_from_text};
pub use dispatch::{ContentParser, ParserOptions};
pub use error::ParserError;
pub use media::MediaDecoder;
pub use metadata::{extract_metadata, file_times};
pub use office::{DocumentExtractor, ExtractedPage};
