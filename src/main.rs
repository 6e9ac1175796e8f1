//! parley CLI entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use parley::agent::llm::Provider;
use parley::agent::Message;
use parley::chat::{ChatRequest, ChatService, RequestScope};
use parley::config::Config;
use parley::extraction::{DocxExtractor, ExtractionOptions, MultimodalExtractor, PdfExtractor, TextExtractor};
use parley::ui;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Conversation orchestration core for a multi-tenant AI chat service")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.parley/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message, or chat interactively
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: Option<String>,

        /// OpenAI or Gemini
        #[arg(short, long, default_value = "Gemini")]
        provider: Provider,

        /// Mode name selecting the model
        #[arg(long)]
        mode: Option<String>,

        #[arg(short, long, default_value_t = 0.5)]
        temperature: f32,

        /// Chat id used for the project lookup
        #[arg(long)]
        chat_id: Option<String>,

        /// Custom persona replacing the default instruction
        #[arg(long)]
        system_prompt: Option<String>,

        #[arg(long, default_value = "local")]
        user: String,

        #[arg(long, default_value = "local")]
        tenant: String,
    },

    /// Start the HTTP chat server
    Serve {
        /// Port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Extract the text of a PDF or Word file
    Extract {
        file: PathBuf,

        /// Character cap
        #[arg(long)]
        max_chars: Option<usize>,

        /// Request page markers (PDF)
        #[arg(long)]
        pages: bool,
    },

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => parley::config::load_from(path)?,
        None => parley::config::load()?,
    };

    match cli.command {
        Commands::Chat {
            message,
            provider,
            mode,
            temperature,
            chat_id,
            system_prompt,
            user,
            tenant,
        } => {
            let service = ChatService::from_config(config)?;
            let scope = RequestScope::new(user, tenant);
            let template = ChatRequest {
                messages: Vec::new(),
                provider,
                mode,
                temperature,
                chat_id,
                system_prompt,
            };

            match message {
                Some(msg) => {
                    let mut request = template;
                    request.messages.push(Message::user(msg));
                    let reply = service.handle(request, &scope).await?;
                    println!("\n{}", reply.content);
                    tracing::debug!("{} tokens", reply.tokens);
                }
                None => run_interactive(&service, template, &scope).await?,
            }
        }

        Commands::Serve { port, host } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            ui::print_step(&format!(
                "Starting chat server on {}:{}",
                config.server.host, config.server.port
            ));
            parley::server::serve(config).await?;
        }

        Commands::Extract { file, max_chars, pages } => {
            run_extract(&config, &file, max_chars, pages).await?;
        }

        Commands::Status => {
            println!("parley status\n");
            println!("Config:     {:?}", cli.config.unwrap_or_else(parley::config::config_path));
            println!("OpenAI:     {} (default model {})", ui::key_status(&config.openai.api_key), config.openai.default_model);
            println!("Gemini:     {} (default model {})", ui::key_status(&config.gemini.api_key), config.gemini.default_model);
            println!("Search:     {}", ui::key_status(&config.search.api_key));
            println!("Extraction: {}", ui::key_status(config.extraction_api_key()));
            println!("Uploads:    {:?}", config.storage.upload_dir);
            println!("Documents:  {:?}", config.storage.documents_dir);
            if let Some(projects) = &config.projects_file {
                println!("Projects:   {:?}", projects);
            }
        }
    }

    Ok(())
}

/// Keeps the conversation across turns; every turn is one request.
async fn run_interactive(service: &ChatService, template: ChatRequest, scope: &RequestScope) -> Result<()> {
    use std::io::{self, Write};

    let model = service.config().model_name(template.provider, template.mode.as_deref());
    ui::print_header(template.provider.as_str(), &model);

    let mut history: Vec<Message> = Vec::new();

    loop {
        print!("\x1b[1;34mYou\x1b[0m: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Bye!");
            break;
        }

        if input.is_empty() {
            continue;
        }

        history.push(Message::user(input));
        let mut request = template.clone();
        request.messages = history.clone();

        match service.handle(request, scope).await {
            Ok(reply) => {
                println!("\n\x1b[1;32mBot\x1b[0m: {}\n", reply.content);
                history.push(Message::assistant(reply.content));
            }
            Err(e) => {
                history.pop();
                ui::print_error(&e.to_string());
            }
        }
    }

    Ok(())
}

async fn run_extract(config: &Config, file: &Path, max_chars: Option<usize>, pages: bool) -> Result<()> {
    let bytes = tokio::fs::read(file).await?;
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let engine = MultimodalExtractor::new(&config.extraction, config.extraction_api_key())?;
    let extractor: Box<dyn TextExtractor> = match parley::attachments::extension(&name).as_deref() {
        Some("pdf") => Box::new(PdfExtractor::new(engine)),
        Some("docx") | Some("doc") => Box::new(DocxExtractor::new(engine)),
        _ => anyhow::bail!("unsupported file type: {}", name),
    };

    let mut options = ExtractionOptions {
        max_chars,
        ..ExtractionOptions::default()
    }
    .with_file_name(name);
    options.page_markers = pages;

    let extraction = extractor.extract(&bytes, &options).await?;
    if extraction.is_empty() {
        ui::print_warning(&extraction.text);
        return Ok(());
    }

    println!("{}", extraction.text);
    eprintln!("{}", serde_json::to_string_pretty(&extraction.metadata)?);
    Ok(())
}
