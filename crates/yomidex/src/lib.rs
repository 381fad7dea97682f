pub mod catalog;
pub mod filter;
pub mod handlers;
pub mod index;
pub mod source;
pub mod thumbs;

pub use catalog::{Catalog, LoadError, Snapshot};
pub use filter::SearchFilter;
pub use handlers::{AppState, reload_and_enrich, router};
pub use index::{DEFAULT_SUGGESTION_LIMIT, MatchMode, TagIndex};
pub use source::{Source, SourceError};
pub use thumbs::{OembedLookup, ThumbnailLookup, ThumbnailStore};
