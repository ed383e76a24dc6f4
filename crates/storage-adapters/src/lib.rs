//! # storage-adapters
//!
//! Persistence and media adapters: the SQLite repositories, the local image
//! cache, object storage (local directory or Supabase) and the remote fetcher
//! used by the image resolver.

pub mod http_fetch;
pub mod placeholder;

#[cfg(feature = "db-sqlite")]
pub mod sqlite;

#[cfg(feature = "media-local")]
pub mod local_media;

#[cfg(feature = "media-supabase")]
pub mod supabase;

pub use http_fetch::ReqwestFetcher;
pub use placeholder::{load_or_render, render_placeholder};

#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "media-local")]
pub use local_media::{LocalBlobStorage, LocalImageCache};

#[cfg(feature = "media-supabase")]
pub use supabase::SupabaseStorage;
