//! sketch - conversational cloud-architecture diagram generator

mod config;
mod session;

use clap::Parser;
use std::sync::Arc;

use sketch_agent::{
    ControllerConfig, PythonExecutor, PythonValidator, ProviderGenerator, QdrantRetriever,
    Retriever, TurnController, catalog,
};
use sketch_ai::{EmbeddingModel, Model, providers::OpenAIProvider};

/// sketch - turn natural-language requests into cloud architecture diagrams
#[derive(Parser, Debug)]
#[command(name = "sketch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat model to use (default: gpt-4o-mini)
    #[arg(short, long)]
    model: Option<String>,

    /// Embedding model for documentation lookups
    #[arg(long)]
    embedding_model: Option<String>,

    /// Conversation thread to use (defaults to a fresh thread)
    #[arg(short, long)]
    thread: Option<String>,

    /// Run in non-interactive mode with a single request
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Resume a previous thread by id
    #[arg(long)]
    resume: Option<String>,

    /// List saved sessions
    #[arg(long)]
    sessions: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Directory for rendered diagram images
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Build the documentation index from a directory of symbol catalogs
    #[arg(long)]
    index_catalog: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Retriever used when no vector store is configured. Lookups return
/// nothing, so repair rounds proceed without documentation hints.
struct NullRetriever;

#[async_trait::async_trait]
impl Retriever for NullRetriever {
    async fn lookup(&self, _error: &str) -> sketch_agent::Result<String> {
        Ok(String::new())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("sketch=debug")
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // List sessions and exit
    if args.sessions {
        return list_sessions();
    }

    // Load config file and merge CLI args (CLI takes precedence)
    let mut cfg = config::Config::load();
    if let Some(model) = args.model {
        cfg.model = model;
    }
    if let Some(embedding_model) = args.embedding_model {
        cfg.embedding_model = embedding_model;
    }
    if let Some(output_dir) = args.output_dir {
        cfg.output_dir = Some(output_dir);
    }

    let Some(api_key) = cfg.openai_api_key() else {
        eprintln!("Error: No API key found");
        eprintln!();
        eprintln!("Set your API key with: export OPENAI_API_KEY=your-key");
        eprintln!("Or add it to config file: sketch --init-config");
        std::process::exit(1);
    };

    let provider = Arc::new(OpenAIProvider::new(api_key));
    let model = Model::new(&cfg.model, &cfg.api_base_url);
    let embedding_model = EmbeddingModel::new(
        &cfg.embedding_model,
        &cfg.api_base_url,
        cfg.embedding_dimensions,
    );

    // Ingestion mode: build the documentation index and exit
    if let Some(ref catalog_dir) = args.index_catalog {
        return index_catalog(&cfg, provider, embedding_model, catalog_dir).await;
    }

    let retriever: Arc<dyn Retriever> = match cfg.qdrant_url() {
        Some(url) => Arc::new(QdrantRetriever::new(
            url,
            cfg.qdrant_api_key(),
            &cfg.collection,
            provider.clone(),
            embedding_model,
        )),
        None => {
            eprintln!("Note: no qdrant_url configured, documentation lookups disabled");
            Arc::new(NullRetriever)
        }
    };

    let mut controller = TurnController::new(
        ControllerConfig {
            max_attempts: cfg.max_attempts,
        },
        Arc::new(ProviderGenerator::new(provider, model)),
        Arc::new(PythonValidator::new(&cfg.python_bin)),
        Arc::new(PythonExecutor::new(&cfg.python_bin, cfg.images_dir())),
        retriever,
    );

    // Resolve the thread: --resume requires an existing session, --thread
    // opens or creates one, otherwise a fresh thread is minted.
    let (thread_id, mut session) = if let Some(ref thread_id) = args.resume {
        match session::SessionManager::load(thread_id) {
            Ok((session, conversation)) => {
                println!(
                    "Resuming thread {} ({} messages)",
                    thread_id,
                    conversation.messages.len()
                );
                controller.restore(thread_id.clone(), conversation);
                (thread_id.clone(), session)
            }
            Err(e) => {
                eprintln!("Error loading session: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        let thread_id = args
            .thread
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (session, conversation) = session::SessionManager::open(&thread_id, &cfg.model)?;
        controller.restore(thread_id.clone(), conversation);
        (thread_id, session)
    };

    // Non-interactive mode
    if let Some(command) = args.command {
        return run_turn(&mut controller, &mut session, &thread_id, &command).await;
    }

    run_interactive(&mut controller, &mut session, &thread_id, &cfg.model).await
}

/// Run one turn, print its outcome, and persist the new messages
async fn run_turn(
    controller: &mut TurnController,
    session: &mut session::SessionManager,
    thread_id: &str,
    input: &str,
) -> anyhow::Result<()> {
    let before = controller
        .conversation(thread_id)
        .map(|c| c.messages.len())
        .unwrap_or(0);

    let outcome = controller.invoke(input, thread_id).await?;

    for message in &outcome.messages[before..] {
        session.append_message(message)?;
    }
    if let Some(conversation) = controller.conversation(thread_id) {
        session.append_fragments(conversation)?;
    }

    println!("{}", outcome.narrative);
    if let Some(ref image) = outcome.image_location {
        println!("\n[Diagram saved to {}]", image.display());
    }

    Ok(())
}

async fn run_interactive(
    controller: &mut TurnController,
    session: &mut session::SessionManager,
    thread_id: &str,
    model_id: &str,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        let thread_short = &thread_id[..thread_id.len().min(8)];
        eprintln!("sketch ({}) thread: {}", model_id, thread_short);
        eprintln!("Type your request, or /exit to quit.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/exit" || input == "/quit" {
            break;
        }

        println!();
        if let Err(e) = run_turn(controller, session, thread_id, input).await {
            eprintln!("Error: {}", e);
        }
        println!();
    }

    Ok(())
}

/// Load symbol catalogs, embed them, and upsert into the vector store
async fn index_catalog(
    cfg: &config::Config,
    provider: Arc<OpenAIProvider>,
    embedding_model: EmbeddingModel,
    catalog_dir: &str,
) -> anyhow::Result<()> {
    let Some(qdrant_url) = cfg.qdrant_url() else {
        eprintln!("Error: indexing requires qdrant_url in config or QDRANT_URL");
        std::process::exit(1);
    };

    let documents = catalog::load_documents(std::path::Path::new(catalog_dir))?;
    if documents.is_empty() {
        eprintln!("No catalog documents found in {}", catalog_dir);
        std::process::exit(1);
    }
    println!("Loaded {} documents from {}", documents.len(), catalog_dir);

    let retriever = QdrantRetriever::new(
        qdrant_url,
        cfg.qdrant_api_key(),
        &cfg.collection,
        provider,
        embedding_model,
    );
    retriever.ensure_collection().await?;
    retriever.upsert(&documents).await?;
    println!(
        "Indexed {} documents into collection '{}'",
        documents.len(),
        cfg.collection
    );

    Ok(())
}

fn list_sessions() -> anyhow::Result<()> {
    match session::SessionManager::list_sessions() {
        Ok(sessions) => {
            if sessions.is_empty() {
                println!("No saved sessions found.");
                println!(
                    "Sessions are stored in: {}",
                    session::SessionManager::sessions_dir().display()
                );
            } else {
                println!("Saved sessions:\n");
                println!("{:<38} {:<20} {:<8} Model", "Thread", "Created", "Msgs");
                println!("{}", "-".repeat(80));
                for s in sessions {
                    println!(
                        "{:<38} {:<20} {:<8} {}",
                        s.thread_id,
                        s.created_at_display(),
                        s.message_count,
                        s.model
                    );
                }
                println!("\nResume with: sketch --resume <thread-id>");
            }
        }
        Err(e) => {
            eprintln!("Error listing sessions: {}", e);
        }
    }
    Ok(())
}
