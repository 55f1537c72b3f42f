//! # Paper storage
//!
//! The download manager never touches the filesystem directly. It asks a
//! [`PaperStore`] whether a file exists and hands it complete PDFs to write.
//!
//! - [`FsPaperStore`]: the watched directory, written atomically through a
//!   temporary `.part` file that is only linked into place when complete
//! - [`InMemoryPaperStore`]: map-backed store for tests, with write failure
//!   injection
//!
//! A store never deletes or replaces a PDF. The only file it replaces is
//! non-PDF metadata written through [`PaperStore::replace`].
//!
//! ```no_run
//! use ai_paper_updater::repositories::{FsPaperStore, PaperStore};
//!
//! # async fn example() -> ai_paper_updater::Result<()> {
//! let store = FsPaperStore::open("pdfDatabase").await?;
//! if !store.exists("2301.07041v1.pdf").await? {
//!     store.write_new("2301.07041v1.pdf", b"%PDF-1.5 ...").await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod fs;
pub mod memory;

pub use fs::FsPaperStore;
pub use memory::InMemoryPaperStore;

use crate::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Whether [`PaperStore::write_new`] placed the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// A file with that name appeared first and was left untouched
    AlreadyExists,
}

/// Existence checks and atomic writes for the paper directory
#[async_trait]
pub trait PaperStore: Send + Sync + Debug {
    /// Returns the name of the store for logging
    fn name(&self) -> &'static str;

    /// Whether a final file named `name` is present
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Write `bytes` as `name`, all or nothing, never overwriting
    async fn write_new(&self, name: &str, bytes: &[u8]) -> Result<WriteOutcome>;

    /// Replace a metadata file atomically
    async fn replace(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Names of the PDFs currently present, sorted
    async fn list_pdfs(&self) -> Result<Vec<String>>;

    /// Remove temporary files left behind by interrupted writes
    async fn sweep_partials(&self) -> Result<usize>;
}

/// Temporary files are hidden and end in `.part`
pub(crate) fn is_partial(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".part")
}

pub(crate) fn is_pdf(name: &str) -> bool {
    !name.starts_with('.')
        && std::path::Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
