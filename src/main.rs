use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use txtindex::{
    Collection,
    DataDir,
    Error,
    HashingEmbedder,
    IndexConfig,
    IndexState,
    ModelManager,
    Result,
    StateStore,
    VectorStore,
    collection::MetadataMatch,
    embedding::{Embedder, use_fake_embeddings},
    incremental,
    ingestion,
    search,
};

mod cli;

use cli::{BuildArgs, Cli, Command, IndexLocation, QueryArgs, StatusArgs};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("TXTINDEX_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let model = cli.model.as_deref();
    match cli.command {
        Command::Build(args) => cmd_build(&args, model),
        Command::Query(args) => cmd_query(&args, model),
        Command::Status(args) => cmd_status(&args),
        Command::Completions(args) => {
            args.generate();
            Ok(())
        }
    }
}

/// The neural model, or the hashing embedder when fake embeddings are
/// requested through the environment. The model is loaded here so a broken
/// model fails the command before any index work starts.
fn select_embedder(model: Option<&str>) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() {
        info!("using hashing embedder");
        return Ok(Box::new(HashingEmbedder::default()));
    }
    let mut manager = match model {
        Some(id) => ModelManager::with_model_id(id.to_string()),
        None => ModelManager::new(),
    };
    manager.load()?;
    Ok(Box::new(manager))
}

fn index_config(
    location: &IndexLocation,
    state_file: Option<&std::path::Path>,
) -> Result<IndexConfig> {
    let data_dir = DataDir::resolve(location.db_path.as_deref())?;
    let mut config = IndexConfig::new(data_dir.root(), &location.collection);
    if let Some(path) = state_file {
        config = config.with_state_file(path.to_path_buf());
    }
    Ok(config)
}

fn cmd_build(args: &BuildArgs, model: Option<&str>) -> Result<()> {
    let config = index_config(&args.location, args.state_file.as_deref())?
        .with_decode_policy(args.on_invalid_utf8);
    let state_store = StateStore::new(&config.state_file_path);
    let embedder = select_embedder(model)?;

    let prior = match state_store.load() {
        Ok(state) => state,
        Err(e @ Error::CorruptState { .. }) if args.reset => {
            warn!("{e}; starting from an empty state");
            IndexState::new()
        }
        Err(e) => return Err(e),
    };

    let prior = if args.reset {
        prior.into_all_deleted()
    } else {
        prior
    };

    // Scan before touching the index so a bad folder fails harmlessly.
    let reconciliation = incremental::reconcile(&args.from, &prior, &config)?;
    if args.reset {
        ingestion::reset(&state_store, prior, &config)?;
    }

    let collection =
        Collection::open(&config.db_path, &config.collection_name)?;
    let mut store = VectorStore::new(collection, embedder);
    let report = ingestion::apply(&mut store, &reconciliation)?;
    state_store.save(&reconciliation.state)?;

    println!(
        "Indexed {} chunks from {} new and {} changed documents",
        report.chunks_added, report.documents_added, report.documents_changed
    );
    println!(
        "Unchanged: {}, removed: {}, skipped: {}",
        report.documents_unchanged,
        report.documents_removed,
        report.documents_skipped
    );
    println!(
        "Index size: {} chunks ({} searchable)",
        store.count()?,
        store.count_live()?
    );
    Ok(())
}

fn cmd_query(args: &QueryArgs, model: Option<&str>) -> Result<()> {
    let config = index_config(&args.location, None)?;
    let collection =
        Collection::open(&config.db_path, &config.collection_name)?;
    let mut store = VectorStore::new(collection, select_embedder(model)?);

    let results = search::execute_query(&mut store, &args.question, args.k)?;

    if args.json {
        search::format_json(&results, &args.question)?;
    } else {
        search::format_human(&results);
    }
    Ok(())
}

#[derive(Serialize)]
struct Status {
    db_path: String,
    collection: String,
    state_file: String,
    documents: usize,
    live_documents: usize,
    deleted_documents: usize,
    chunks: usize,
    searchable_chunks: usize,
}

fn cmd_status(args: &StatusArgs) -> Result<()> {
    let config = index_config(&args.location, args.state_file.as_deref())?;
    let state = StateStore::new(&config.state_file_path).load()?;
    let collection =
        Collection::open(&config.db_path, &config.collection_name)?;
    let deleted = serde_json::Value::Bool(true);
    let hidden = MetadataMatch {
        key: "deleted",
        value: &deleted,
    };

    let status = Status {
        db_path: config.db_path.display().to_string(),
        collection: config.collection_name.clone(),
        state_file: config.state_file_path.display().to_string(),
        documents: state.len(),
        live_documents: state.live_count(),
        deleted_documents: state.deleted_count(),
        chunks: collection.len()?,
        searchable_chunks: collection.count_excluding(hidden)?,
    };

    if args.json {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        println!("Data directory: {}", status.db_path);
        println!("Collection: {}", status.collection);
        println!("State file: {}", status.state_file);
        println!(
            "Documents: {} ({} live, {} deleted)",
            status.documents, status.live_documents, status.deleted_documents
        );
        println!(
            "Chunks: {} ({} searchable)",
            status.chunks, status.searchable_chunks
        );
    }
    Ok(())
}
