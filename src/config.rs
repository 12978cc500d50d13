use std::path::{Path, PathBuf};

/// Version tag embedded in the state file name and in chunk metadata.
pub const INDEX_VERSION: &str = "v1";

pub const DEFAULT_COLLECTION: &str = "docs";

/// What to do with a `.txt` file that is not valid UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DecodePolicy {
    /// Abort the run before any state is saved.
    #[default]
    Fail,
    /// Log a warning and leave the file's state record untouched.
    Skip,
}

/// Settings for one index, passed explicitly to every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub index_version: String,
    pub db_path: PathBuf,
    pub collection_name: String,
    pub state_file_path: PathBuf,
    pub decode_policy: DecodePolicy,
}

impl IndexConfig {
    /// Config with defaults derived from the database directory and
    /// collection name.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use txtindex::config::IndexConfig;
    ///
    /// let config = IndexConfig::new(Path::new("/data"), "docs");
    /// assert_eq!(
    ///     config.state_file_path,
    ///     Path::new("/data/docs.state-v1.json")
    /// );
    /// ```
    pub fn new(db_path: &Path, collection_name: &str) -> Self {
        Self {
            index_version: INDEX_VERSION.to_string(),
            db_path: db_path.to_path_buf(),
            collection_name: collection_name.to_string(),
            state_file_path: default_state_file(
                db_path,
                collection_name,
                INDEX_VERSION,
            ),
            decode_policy: DecodePolicy::default(),
        }
    }

    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file_path = path;
        self
    }

    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }
}

fn default_state_file(
    db_path: &Path,
    collection_name: &str,
    index_version: &str,
) -> PathBuf {
    db_path.join(format!("{collection_name}.state-{index_version}.json"))
}
