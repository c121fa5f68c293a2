pub mod chunker;
pub mod citations;
pub mod extractor;
pub mod sections;

pub use chunker::{ChunkStrategy, Chunker, TextChunk};
pub use citations::{find_arxiv_citations, ArxivCitation};
pub use extractor::{ExtractError, ExtractedPaper, PaperMetadata, PdfExtractor};
pub use sections::{classify_header, split_sections, Section, UNKNOWN_SECTION};
