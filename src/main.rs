use revu::cli::{Cli, Commands, ConfigAction};
use revu::config::Config;
use revu::document::ParserRegistry;
use revu::embedding::FastEmbedProvider;
use revu::error::{Result, RevuError};
use revu::llm::OllamaClient;
use revu::session::{Capabilities, ReviewService, UserInput};
use revu::storage::StorageManager;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Chat { ingest } => {
            let config = load_config(cli.config)?;
            let rt = tokio::runtime::Runtime::new().map_err(|e| RevuError::Io {
                source: e,
                context: "Failed to create tokio runtime".to_string(),
            })?;
            rt.block_on(cmd_chat(config, ingest))?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("revu=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn cmd_chat(config: Config, ingest: Vec<std::path::PathBuf>) -> Result<()> {
    tracing::info!("Starting review chat session");

    let data_dir = expand_path(&config.storage.data_dir)?;
    let storage = Arc::new(StorageManager::new(data_dir)?);

    let embedder = Arc::new(FastEmbedProvider::new(&config.embedding.model)?);

    let generation = Arc::new(OllamaClient::with_base_url(
        &config.llm.endpoint,
        &config.llm.model,
        Duration::from_secs(config.llm.timeout_secs),
    )?);

    if !generation.is_available().await {
        println!(
            "⚠ The generation service at {} is not answering. Start it before beginning a \
             review; configuration and uploads still work.",
            config.llm.endpoint
        );
    }

    let caps = Capabilities {
        embedder,
        generation,
        parsers: Arc::new(ParserRegistry::with_defaults()),
        ocr: None,
        synthesizer: None,
    };

    let mut service = ReviewService::new(caps, storage, config);
    let session_id = service.create_session();

    for path in ingest {
        upload_file(&mut service, &session_id, &path).await?;
    }

    println!(
        "Chat with Revu. Type \":upload <file>\" to add a document, \":quit\" to exit.\n\
         Try \"show settings\", \"set difficulty to hard\", or \"start review\"."
    );

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        let read = stdin.lock().read_line(&mut line).map_err(|e| RevuError::Io {
            source: e,
            context: "Failed to read from stdin".to_string(),
        })?;
        if read == 0 {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" || line == ":q" {
            break;
        }
        if let Some(path) = line.strip_prefix(":upload ") {
            upload_file(&mut service, &session_id, std::path::Path::new(path.trim())).await?;
            continue;
        }

        let reply = service
            .handle_utterance(&session_id, UserInput::Utterance(line.to_string()))
            .await?;
        println!("{}\n", reply.text);
    }

    println!("Goodbye!");
    Ok(())
}

async fn upload_file(
    service: &mut ReviewService,
    session_id: &uuid::Uuid,
    path: &std::path::Path,
) -> Result<()> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let bytes = std::fs::read(path).map_err(|e| RevuError::Io {
        source: e,
        context: format!("Failed to read document: {}", path.display()),
    })?;

    let reply = service
        .handle_utterance(session_id, UserInput::Upload { filename, bytes })
        .await?;
    println!("{}\n", reply.text);

    Ok(())
}

fn cmd_config(config_path: Option<std::path::PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| RevuError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = Config::default_path()?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RevuError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'revu config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}

fn expand_path(path: &std::path::Path) -> Result<std::path::PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RevuError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| RevuError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
