//! wikipoi is a CLI tool that turns MediaWiki pages describing points of interest
//! into structured JSON/CSV and serves them over a small HTTP API.
//!
//! The tool has these commands:
//! 1. `serve` - Runs the HTTP API
//! 2. `page` - Prints a page as structured JSON, location records or table rows
//! 3. `export` - Writes the table of a page or a local `.md` file to CSV
//! 4. `search` - Runs a full text search on the wiki
//! 5. `classify` - Classifies the objects on a photo with a vision model

use std::fs;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use env_logger::Builder;
use llm::LLMProvider;
use log::{LevelFilter, error, info};
use url::Url;

use wikipoi::{
    PageView,
    constants::{DEFAULT_API_URL, DEFAULT_LIST_PAGE, MODEL_API_KEY_ENV_NAME},
    export::export,
    locations::parse_locations,
    parse::parse_document,
    server::{AppState, VisionModels, run_server},
    table::extract_table,
    vision::{
        VisionContext, classify_image, classify_image_with_gate, fetch_image, model_builder,
        prepare_image, rate_limiter,
    },
    wiki::WikiClient,
};

/// A CLI tool to turn MediaWiki location pages into structured data
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The command to execute
    #[command(subcommand)]
    command: Command,

    #[arg(long, short, action = clap::ArgAction::Count, help = "Output v(v...)erbosity: error (0), warn (1), info (2), debug (3), trace (4)", global = true, default_value_t = 2)]
    verbose: u8,

    /// URL of the wiki's api.php endpoint
    #[arg(long, global = true, default_value = DEFAULT_API_URL)]
    api_url: String,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to bind
        #[arg(long, short, default_value_t = 5000)]
        port: u16,
        /// Page holding the table of all locations
        #[arg(long, default_value = DEFAULT_LIST_PAGE)]
        list_page: String,
        /// URL of the vision model, e.g. openai://gpt-5-mini (image classification is off without it)
        #[arg(long, short)]
        model: Option<String>,
        /// URL of the model for the givebox gate (default: --model)
        #[arg(long)]
        gate_model: Option<String>,
        /// Rate limit for model calls: requests per minute (default: no limit)
        #[arg(long, short = 'r')]
        rpm: Option<u32>,
    },
    /// Fetch a page and print it as JSON
    Page {
        /// Name of the wiki page
        #[arg(default_value = DEFAULT_LIST_PAGE)]
        name: String,
        /// View to render: "structured" (default), "locations" or "table"
        #[arg(long, default_value = "structured")]
        view: PageView,
    },
    /// Write the table of a page, or of a local .md file, to CSV
    Export {
        /// Wiki page name, or path to a .md file holding wikitext
        source: String,
        /// Path to output CSV file
        output_file: String,
    },
    /// Full text search on the wiki
    Search {
        /// The search query
        query: String,
    },
    /// Classify the objects on a photo
    #[command(group(ArgGroup::new("image").required(true).args(["path", "url"])))]
    Classify {
        /// Path to the image file
        #[arg(long)]
        path: Option<String>,
        /// URL to download the image from
        #[arg(long)]
        url: Option<String>,
        /// URL of the vision model, e.g. openai://gpt-5-mini
        #[arg(long, short)]
        model: String,
        /// URL of the model for the givebox gate (default: --model)
        #[arg(long)]
        gate_model: Option<String>,
        /// Do not return bounding boxes
        #[arg(long)]
        no_bbox: bool,
        /// Skip the givebox gate
        #[arg(long)]
        no_gate: bool,
        /// Path for the JSON output (default: stdout)
        #[arg(long, short)]
        out: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    Builder::new()
        .filter_level(match cli.verbose {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            3 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        })
        .init();

    let api_url = Url::parse(&cli.api_url).map_err(|e| anyhow::anyhow!("Invalid api url: {}", e))?;
    let wiki = WikiClient::new(api_url)?;

    match cli.command {
        Command::Serve {
            host,
            port,
            list_page,
            model,
            gate_model,
            rpm,
        } => {
            let vision = match model {
                Some(model) => Some(VisionModels {
                    model: build_model(&model)?,
                    gate_model: gate_model.as_deref().map(build_model).transpose()?,
                    rate_limiter: rpm.and_then(rate_limiter),
                }),
                None => {
                    info!("No vision model given, image classification is disabled");
                    None
                }
            };
            let state = AppState {
                index_url: wiki.index_url()?,
                wiki,
                list_page,
                vision,
            };
            run_server(&host, port, state).await
        }
        Command::Page { name, view } => handle_page_command(&wiki, &name, view).await,
        Command::Export {
            source,
            output_file,
        } => export(&wiki, &source, &output_file).await,
        Command::Search { query } => {
            let hits = wiki.search(&query).await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }
        Command::Classify {
            path,
            url,
            model,
            gate_model,
            no_bbox,
            no_gate,
            out,
        } => {
            let source = match (path, url) {
                (Some(path), _) => ImageSource::Path(path),
                (None, Some(url)) => ImageSource::Url(
                    Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid image URL: {}", e))?,
                ),
                (None, None) => anyhow::bail!("Either --path or --url is required"),
            };
            handle_classify_command(source, model, gate_model, !no_bbox, !no_gate, out).await
        }
    }
}

async fn handle_page_command(wiki: &WikiClient, name: &str, view: PageView) -> Result<()> {
    let wikitext = wiki.fetch_wikitext(name).await?;

    let json = match view {
        PageView::Structured => {
            let assembly = parse_document(&wikitext);
            for section_error in &assembly.errors {
                error!("{section_error}");
            }
            serde_json::to_string_pretty(&assembly.document)?
        }
        PageView::Locations => serde_json::to_string_pretty(&parse_locations(&wikitext)?)?,
        PageView::Table => serde_json::to_string_pretty(&extract_table(&wikitext)?)?,
    };

    println!("{json}");
    Ok(())
}

enum ImageSource {
    Path(String),
    Url(Url),
}

async fn handle_classify_command(
    source: ImageSource,
    model: String,
    gate_model: Option<String>,
    use_bbox: bool,
    use_gate: bool,
    out: Option<String>,
) -> Result<()> {
    let bytes = match source {
        ImageSource::Path(path) => {
            fs::read(&path).context(format!("Failed to read image file: {path}"))?
        }
        ImageSource::Url(url) => fetch_image(&url).await?,
    };
    let image = prepare_image(bytes)?;

    let model = build_model(&model)?;
    let gate_model = gate_model.as_deref().map(build_model).transpose()?;
    let ctx = VisionContext {
        model: model.as_ref(),
        gate_model: gate_model
            .as_ref()
            .map(|model| model.as_ref() as &dyn llm::chat::ChatProvider),
        rate_limiter: None,
    };

    let report = if use_gate {
        classify_image_with_gate(&image, use_bbox, &ctx).await?
    } else {
        classify_image(&image, use_bbox, &ctx).await?
    };

    let json = serde_json::to_string_pretty(&report)?;
    match out {
        Some(out) => fs::write(&out, json).context(format!("Failed to write output file: {out}"))?,
        None => println!("{json}"),
    }

    Ok(())
}

fn build_model(model: &str) -> Result<Box<dyn LLMProvider>> {
    let model_url = Url::parse(model).map_err(|e| anyhow::anyhow!("Invalid model URL: {}", e))?;

    let api_key = match std::env::var(MODEL_API_KEY_ENV_NAME) {
        Ok(model_key) => {
            info!("API key is provided via {MODEL_API_KEY_ENV_NAME}");
            Some(model_key)
        }
        Err(err) => {
            info!("{err} while providing api key");
            None
        }
    };

    model_builder(&model_url, api_key)?
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build LLM model: {}", e))
}
