use clap::Parser;
use kdam::{BarExt, tqdm};
use ragindex::{
    ConfigDb,
    DataDir,
    Error,
    Result,
    citations::{DEFAULT_CITATION_DISPLAY_LIMIT, format_citations},
    cli::{
        AskArgs,
        Cli,
        Command,
        ConfigAction,
        IndexArgs,
        SearchArgs,
        StatusArgs,
    },
    config::{ConfigOverrides, RetrievalConfig},
    embedding::{EmbeddingBackend, fake_embeddings_enabled},
    model_manager,
    pipeline::{self, ExtractiveSynthesizer},
    retry::RetryPolicy,
    search::{self, Retriever},
    vector_index::{VectorIndex, VectorSearch},
};
use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "RAGINDEX_LOG";

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var(LOG_ENV_VAR) {
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

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    let base = ConfigOverrides {
        model_id: cli.model.clone(),
        ..ConfigOverrides::default()
    };

    match cli.command {
        Command::Index(args) => {
            cmd_index(&data_dir, &config_db, base, &args)?;
        }
        Command::Search(args) => {
            cmd_search(&data_dir, &config_db, base, &args)?;
        }
        Command::Ask(args) => cmd_ask(&data_dir, &config_db, base, &args)?,
        Command::Status(args) => {
            cmd_status(&data_dir, &config_db, base, &args)?;
        }
        Command::Config { action } => {
            cmd_config(&data_dir, &config_db, base, action)?;
        }
        Command::Mcp(args) => {
            let config = RetrievalConfig::resolve(
                &data_dir,
                &config_db,
                &ConfigOverrides {
                    index_path: args.index_path,
                    ..base
                },
            )?;
            ragindex::mcp::run_mcp(&config)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn load_backend(config: &RetrievalConfig) -> Result<EmbeddingBackend> {
    EmbeddingBackend::from_env(&config.model_id, &RetryPolicy::default())
}

fn cmd_index(
    data_dir: &DataDir,
    config_db: &ConfigDb,
    base: ConfigOverrides,
    args: &IndexArgs,
) -> Result<()> {
    let config = RetrievalConfig::resolve(
        data_dir,
        config_db,
        &ConfigOverrides {
            chunk_size: args.chunk_size,
            chunk_overlap: args.chunk_overlap,
            index_path: args.index_path.clone(),
            ..base
        },
    )?;
    let chunking = config.chunking()?;
    let mut backend = load_backend(&config)?;

    eprintln!("Indexing {}...", args.path.display());
    let mut bar: Option<kdam::Bar> = None;
    let summary = pipeline::rebuild_index(
        &args.path,
        &config.index_path,
        &chunking,
        &mut backend,
        args.batch_size,
        |done, total| {
            let pb = bar.get_or_insert_with(|| {
                tqdm!(total = total, desc = "Embedding", unit = " chunks")
            });
            pb.update_to(done).ok();
        },
    );
    if let Some(mut pb) = bar {
        pb.refresh().ok();
        eprintln!();
    }
    let summary = summary?;

    println!(
        "Indexed {} chunks from {} documents into {}",
        summary.chunks,
        summary.documents,
        config.index_path.display()
    );
    Ok(())
}

fn open_retriever(
    config: &RetrievalConfig,
) -> Result<Retriever<EmbeddingBackend>> {
    if !VectorIndex::exists(&config.index_path) {
        return Err(Error::MissingIndex(config.index_path.clone()));
    }
    let mut retriever = Retriever::new(load_backend(config)?);
    retriever.load_index(&config.index_path)?;
    Ok(retriever)
}

fn cmd_search(
    data_dir: &DataDir,
    config_db: &ConfigDb,
    base: ConfigOverrides,
    args: &SearchArgs,
) -> Result<()> {
    let config = RetrievalConfig::resolve(
        data_dir,
        config_db,
        &ConfigOverrides {
            top_k: args.count,
            similarity_threshold: args.threshold,
            index_path: args.index_path.clone(),
            ..base
        },
    )?;
    let mut retriever = open_retriever(&config)?;

    let results = retriever.retrieve(
        &args.query,
        config.top_k,
        config.similarity_threshold,
    )?;

    if args.json {
        search::format_json(&results)?;
    } else {
        search::format_human(&results);
    }
    Ok(())
}

fn cmd_ask(
    data_dir: &DataDir,
    config_db: &ConfigDb,
    base: ConfigOverrides,
    args: &AskArgs,
) -> Result<()> {
    let config = RetrievalConfig::resolve(
        data_dir,
        config_db,
        &ConfigOverrides {
            top_k: args.count,
            similarity_threshold: args.threshold,
            index_path: args.index_path.clone(),
            ..base
        },
    )?;
    let mut retriever = open_retriever(&config)?;

    let answer = pipeline::answer(
        &mut retriever,
        &mut ExtractiveSynthesizer::default(),
        &args.question,
        &config.search_params(),
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.text);
    println!();
    println!("Confidence: {:.4}", answer.confidence);
    let sources =
        format_citations(&answer.citations, DEFAULT_CITATION_DISPLAY_LIMIT);
    if !sources.is_empty() {
        println!("Sources:");
        for line in sources {
            println!("  - {line}");
        }
    }
    Ok(())
}

fn cmd_status(
    data_dir: &DataDir,
    config_db: &ConfigDb,
    base: ConfigOverrides,
    args: &StatusArgs,
) -> Result<()> {
    let config = RetrievalConfig::resolve(data_dir, config_db, &base)?;
    let fake = fake_embeddings_enabled();
    let model_cached = !fake && model_manager::is_cached(&config.model_id);

    let index = if VectorIndex::exists(&config.index_path) {
        Some(VectorIndex::load(&config.index_path))
    } else {
        None
    };

    if args.json {
        let index_json = match &index {
            Some(Ok(index)) => serde_json::json!({
                "chunks": index.len(),
                "dimension": index.dimension(),
                "model": index.model_id(),
            }),
            Some(Err(e)) => serde_json::json!({ "error": e.to_string() }),
            None => serde_json::Value::Null,
        };
        let status = serde_json::json!({
            "data_dir": data_dir.root(),
            "config": config,
            "model_cached": model_cached,
            "fake_embeddings": fake,
            "index": index_json,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Data directory: {}", data_dir.root().display());
    println!(
        "Model: {} ({})",
        config.model_id,
        if fake {
            "hash embeddings in use"
        } else if model_cached {
            "cached"
        } else {
            "not downloaded"
        }
    );
    println!("Index: {}", config.index_path.display());
    match index {
        Some(Ok(index)) => {
            println!("  Chunks: {}", index.len());
            println!("  Dimension: {}", index.dimension());
            println!("  Built with: {}", index.model_id());
        }
        Some(Err(e)) => println!("  Unreadable: {e}"),
        None => println!("  Not built yet"),
    }
    Ok(())
}

fn cmd_config(
    data_dir: &DataDir,
    config_db: &ConfigDb,
    base: ConfigOverrides,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { json } => {
            let config = RetrievalConfig::resolve(data_dir, config_db, &base)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("model_id = {}", config.model_id);
                println!("chunk_size = {}", config.chunk_size);
                println!("chunk_overlap = {}", config.chunk_overlap);
                println!("top_k = {}", config.top_k);
                println!(
                    "similarity_threshold = {}",
                    config.similarity_threshold
                );
                println!("index_path = {}", config.index_path.display());
            }
        }
        ConfigAction::Set { key, value } => {
            let mut candidate =
                RetrievalConfig::resolve(data_dir, config_db, &base)?;
            candidate.apply_setting(&key, &value)?;
            candidate.validate()?;
            config_db.set_setting(&key, &value)?;
            println!("Set {key} = {value}");
        }
        ConfigAction::Clear { key: Some(key) } => {
            if RetrievalConfig::clear_setting(data_dir, config_db, &key)? {
                println!("Cleared {key}");
            } else {
                println!("{key} was not set");
            }
        }
        ConfigAction::Clear { key: None } => {
            let settings = config_db.list_settings()?;
            for (key, _) in &settings {
                config_db.remove_setting(key)?;
            }
            println!("Cleared {} setting(s)", settings.len());
        }
    }
    Ok(())
}
