//! txtindex - an incremental, line-level semantic index for folders of text
//! files.
//!
//! Every non-empty line of every `.txt` file becomes one chunk, embedded with
//! a sentence-transformer model and stored in a
//! [redb](https://github.com/cberner/redb) collection. A checksum per file is
//! kept in a JSON state file so later runs only re-embed what changed, and
//! files that disappear are soft-deleted rather than erased.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use txtindex::{
//!     Collection,
//!     IndexConfig,
//!     ModelManager,
//!     StateStore,
//!     VectorStore,
//!     incremental,
//!     ingestion,
//! };
//!
//! let config = IndexConfig::new(Path::new("/tmp/txtindex"), "docs");
//! let state_store = StateStore::new(&config.state_file_path);
//! let prior = state_store.load().unwrap();
//!
//! let reconciliation =
//!     incremental::reconcile(Path::new("notes"), &prior, &config).unwrap();
//!
//! let collection =
//!     Collection::open(&config.db_path, &config.collection_name).unwrap();
//! let mut store = VectorStore::new(collection, ModelManager::new());
//! ingestion::apply(&mut store, &reconciliation).unwrap();
//! state_store.save(&reconciliation.state).unwrap();
//!
//! for r in store.similarity_search("what did I plan for monday?", 3).unwrap() {
//!     println!("{:.4} {}", r.distance, r.text);
//! }
//! ```

pub mod checksum;
pub mod chunk_id;
pub mod chunking;
pub mod collection;
pub mod config;
pub mod data_dir;
pub mod embedding;
pub mod error;
pub mod incremental;
pub mod ingestion;
pub mod model_manager;
pub mod search;
pub mod state;
pub mod vector_store;
pub mod walker;

pub use chunk_id::ChunkId;
pub use collection::Collection;
pub use config::{DecodePolicy, IndexConfig};
pub use data_dir::DataDir;
pub use embedding::{Embedder, HashingEmbedder};
pub use error::{Error, Result};
pub use model_manager::ModelManager;
pub use state::{DocumentRecord, IndexState, StateStore};
pub use vector_store::{RetrievalResult, VectorStore};
