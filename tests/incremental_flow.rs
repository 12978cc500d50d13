use std::path::Path;

use txtindex::{
    Collection,
    HashingEmbedder,
    IndexConfig,
    IndexState,
    StateStore,
    VectorStore,
    incremental,
    ingestion::{self, IngestReport},
};

struct Fixture {
    docs: tempfile::TempDir,
    _db: tempfile::TempDir,
    config: IndexConfig,
    store: VectorStore<HashingEmbedder>,
}

impl Fixture {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let docs = tempfile::tempdir()?;
        let db = tempfile::tempdir()?;
        let config = IndexConfig::new(db.path(), "docs");
        let collection = Collection::open(&config.db_path, &config.collection_name)?;
        let store = VectorStore::new(collection, HashingEmbedder::default());
        Ok(Self {
            docs,
            _db: db,
            config,
            store,
        })
    }

    /// Reopen the collection, as a new process would.
    fn reopen(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let collection =
            Collection::open(&self.config.db_path, &self.config.collection_name)?;
        self.store = VectorStore::new(collection, HashingEmbedder::default());
        Ok(())
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.docs.path().join(name)
    }

    fn doc_id(&self, name: &str) -> String {
        self.path(name).to_string_lossy().to_string()
    }

    /// One build run: load state, reconcile, apply, save.
    fn build(
        &mut self,
    ) -> Result<(incremental::Reconciliation, IngestReport), Box<dyn std::error::Error>>
    {
        let state_store = StateStore::new(&self.config.state_file_path);
        let prior = state_store.load()?;
        let reconciliation =
            incremental::reconcile(self.docs.path(), &prior, &self.config)?;
        let report = ingestion::apply(&mut self.store, &reconciliation)?;
        state_store.save(&reconciliation.state)?;
        Ok((reconciliation, report))
    }

    fn state(&self) -> Result<IndexState, Box<dyn std::error::Error>> {
        Ok(StateStore::new(&self.config.state_file_path).load()?)
    }
}

fn write(path: &Path, text: &str) {
    std::fs::write(path, text).unwrap();
}

#[test]
fn hello_world_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let mut fx = Fixture::new()?;
    write(&fx.path("a.txt"), "hello\n\nworld\n");

    // First run chunks both non-empty lines with their original numbers.
    let (rec, report) = fx.build()?;
    let texts: Vec<&str> = rec.chunks.iter().map(|c| c.text.as_str()).collect();
    let lines: Vec<usize> = rec.chunks.iter().map(|c| c.metadata.line).collect();
    assert_eq!(texts, ["hello", "world"]);
    assert_eq!(lines, [1, 3]);
    assert_eq!(report.chunks_added, 2);

    let results = fx.store.similarity_search("hello", 3)?;
    assert_eq!(results[0].text, "hello");
    assert!(results.len() <= 3);
    for pair in results.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }

    // Rerun with identical bytes.
    let (rec, report) = fx.build()?;
    assert!(rec.chunks.is_empty());
    assert_eq!(report.chunks_added, 0);
    assert_eq!(fx.store.count()?, 2);

    // Delete the file.
    let checksum = fx.state()?.get(&fx.doc_id("a.txt")).unwrap().checksum.clone();
    std::fs::remove_file(fx.path("a.txt"))?;
    let (rec, _) = fx.build()?;
    assert!(rec.chunks.is_empty());

    let state = fx.state()?;
    let record = state.get(&fx.doc_id("a.txt")).unwrap();
    assert!(record.deleted);
    assert_eq!(record.checksum, checksum);
    assert!(fx.store.similarity_search("hello", 3)?.is_empty());
    Ok(())
}

#[test]
fn changed_file_is_fully_reembedded() -> Result<(), Box<dyn std::error::Error>> {
    let mut fx = Fixture::new()?;
    write(&fx.path("notes.txt"), "alpha\nbeta\n");
    write(&fx.path("other.txt"), "gamma\n");
    fx.build()?;
    let before = fx.state()?.get(&fx.doc_id("notes.txt")).unwrap().checksum.clone();

    write(&fx.path("notes.txt"), "alpha\nbeta\ndelta\n");
    let (rec, report) = fx.build()?;

    // Every current line of the changed file, none of the untouched one.
    let texts: Vec<&str> = rec.chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["alpha", "beta", "delta"]);
    assert_eq!(report.documents_changed, 1);
    assert_eq!(report.documents_unchanged, 1);
    assert_eq!(fx.store.count()?, 4);

    let after = fx.state()?.get(&fx.doc_id("notes.txt")).unwrap().checksum.clone();
    assert_ne!(before, after);
    Ok(())
}

#[test]
fn state_file_survives_reload_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let mut fx = Fixture::new()?;
    write(&fx.path("a.txt"), "one\n");
    write(&fx.path("b.txt"), "two\n");
    fx.build()?;

    let store = StateStore::new(&fx.config.state_file_path);
    let before = std::fs::read(store.path())?;
    store.save(&store.load()?)?;
    assert_eq!(before, std::fs::read(store.path())?);
    Ok(())
}

#[test]
fn nested_folders_and_non_txt_files() -> Result<(), Box<dyn std::error::Error>> {
    let mut fx = Fixture::new()?;
    std::fs::create_dir_all(fx.path("sub/deeper"))?;
    write(&fx.path("sub/deeper/n.TXT"), "nested line\n");
    write(&fx.path("readme.md"), "ignored\n");

    let (_, report) = fx.build()?;
    assert_eq!(report.documents_added, 1);
    assert_eq!(fx.store.count()?, 1);

    let results = fx.store.similarity_search("nested", 1)?;
    assert_eq!(results[0].text, "nested line");
    Ok(())
}

#[test]
fn restored_file_is_searchable_again() -> Result<(), Box<dyn std::error::Error>> {
    let mut fx = Fixture::new()?;
    write(&fx.path("a.txt"), "hello\n");
    fx.build()?;

    std::fs::remove_file(fx.path("a.txt"))?;
    fx.build()?;
    assert!(fx.store.similarity_search("hello", 1)?.is_empty());

    write(&fx.path("a.txt"), "hello\n");
    let (_, report) = fx.build()?;
    assert_eq!(report.documents_added, 1);
    assert!(!fx.state()?.get(&fx.doc_id("a.txt")).unwrap().deleted);
    assert_eq!(fx.store.similarity_search("hello", 1)?[0].text, "hello");
    assert_eq!(fx.store.count()?, 1);
    Ok(())
}

#[test]
fn interrupted_reset_is_repaired_by_next_build() -> Result<(), Box<dyn std::error::Error>> {
    let mut fx = Fixture::new()?;
    write(&fx.path("a.txt"), "hello\n\nworld\n");
    fx.build()?;

    // The run stops right after the collection is dropped.
    let state_store = StateStore::new(&fx.config.state_file_path);
    ingestion::reset(&state_store, fx.state()?, &fx.config)?;
    fx.reopen()?;
    assert_eq!(fx.store.count()?, 0);

    let (_, report) = fx.build()?;
    assert_eq!(report.documents_added, 1);
    assert_eq!(fx.store.count()?, 2);
    assert_eq!(fx.store.similarity_search("hello", 1)?[0].text, "hello");
    Ok(())
}
