pub mod arxiv;
pub mod semantic_scholar;
pub mod traits;

pub use arxiv::ArxivProvider;
pub use semantic_scholar::SemanticScholarProvider;
pub use traits::{CandidateSource, CitationSource, ProviderError};
