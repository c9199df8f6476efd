//! Downloads documents linked from a document-portal listing page.
//!
//! The default session drives Firefox through geckodriver, which must be
//! running on port 4444 (or wherever `--webdriver-url` points).
//!
//! # Usage
//!
//! ```bash
//! geckodriver &
//! cargo run --bin docfetch -- run                                  # COP-29 page into ./downloads
//! cargo run --bin docfetch -- run saved_page.html my_downloads     # saved listing page
//! cargo run --bin docfetch -- --session http run https://unfccc.int/documents
//! cargo run --bin docfetch -- links --output links.txt             # only collect landing URLs
//! cargo run --bin docfetch -- run links.txt my_downloads           # download from collected links
//! ```

use std::{
    error::Error,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand, ValueEnum};
use docportal_fetch::{
    AssetResolver, CollectedLinks, Config, DocumentReference, Fetch, HttpFetcher, HttpSession,
    ListingSource, PageSession, Pipeline, RunSummary, WebDriverSession,
    config::{
        DEFAULT_BASE_URL, DEFAULT_LANGUAGE, DEFAULT_LISTING_URL, DEFAULT_MARKER,
        DEFAULT_OUTPUT_DIR, DEFAULT_USER_AGENT, DEFAULT_VARIANT_CONTROL, DEFAULT_WEBDRIVER_URL,
    },
    telemetry::init_telemetry,
};
use tracing::info;
use url::Url;

const SIMILAR_LINKS_FILE: &str = "similar_links.txt";

#[derive(Debug, Parser)]
#[command(name = "docfetch", version)]
#[command(about = "Download one language rendition of each document on a listing page")]
struct Cli {
    /// How pages are loaded
    #[arg(long, global = true, value_enum, env = "DOCFETCH_SESSION", default_value_t = SessionKind::Webdriver)]
    session: SessionKind,

    /// WebDriver server for the browser session
    #[arg(long, global = true, env = "DOCFETCH_WEBDRIVER_URL", default_value = DEFAULT_WEBDRIVER_URL)]
    webdriver_url: String,

    /// Show the browser window instead of running headless
    #[arg(long, global = true, env = "DOCFETCH_SHOW_BROWSER")]
    show_browser: bool,

    /// Language label substring to select (case-sensitive)
    #[arg(long, global = true, env = "DOCFETCH_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    language: String,

    /// Anchor text marking links to document landing pages
    #[arg(long, global = true, env = "DOCFETCH_MARKER", default_value = DEFAULT_MARKER)]
    marker: String,

    /// CSS selector of the per-language download control
    #[arg(long, global = true, env = "DOCFETCH_VARIANT_CONTROL", default_value = DEFAULT_VARIANT_CONTROL)]
    variant_control: String,

    /// Origin for relative links in a saved listing file
    #[arg(long, global = true, env = "DOCFETCH_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: Url,

    /// Seconds to wait for each page to finish loading
    #[arg(long, global = true, env = "DOCFETCH_PAGE_TIMEOUT", default_value_t = 10)]
    page_timeout: u64,

    /// Seconds to let a browser page settle after it reports completion
    #[arg(long, global = true, env = "DOCFETCH_SETTLE_DELAY", default_value_t = 3)]
    settle_delay: u64,

    /// Seconds allowed for each document download
    #[arg(long, global = true, env = "DOCFETCH_REQUEST_TIMEOUT", default_value_t = 60)]
    request_timeout: u64,

    #[arg(long, global = true, env = "DOCFETCH_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download the selected variant of every document on the listing
    Run {
        /// Listing page URL, saved .html file, or .txt file of landing URLs
        #[arg(env = "DOCFETCH_LISTING", default_value = DEFAULT_LISTING_URL)]
        listing_source: String,

        /// Directory the documents are written to
        #[arg(env = "DOCFETCH_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Print the final summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Collect landing-page links without downloading anything
    Links {
        /// Listing page URL or saved .html file
        #[arg(env = "DOCFETCH_LISTING", default_value = DEFAULT_LISTING_URL)]
        listing_source: String,

        /// File to write the links to, one per line. Related-looking links
        /// go to `similar_links.txt` next to it when none match.
        #[arg(short, long, default_value = "access_document_links.txt")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SessionKind {
    /// Real browser over WebDriver; runs page scripts
    Webdriver,
    /// Plain HTTP GETs; static markup only
    Http,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config {
            webdriver_url: self.webdriver_url.clone(),
            headless: !self.show_browser,
            language: self.language.clone(),
            marker: self.marker.clone(),
            variant_control: self.variant_control.clone(),
            base_url: self.base_url.clone(),
            page_timeout: Duration::from_secs(self.page_timeout),
            settle_delay: Duration::from_secs(self.settle_delay),
            request_timeout: Duration::from_secs(self.request_timeout),
            user_agent: self.user_agent.clone(),
            ..Config::default()
        };
        if let Command::Run { output_dir, .. } = &self.command {
            config.output_dir = output_dir.clone();
        }
        config
    }

    fn listing_source(&self) -> &str {
        match &self.command {
            Command::Run { listing_source, .. } | Command::Links { listing_source, .. } => {
                listing_source
            }
        }
    }

    /// Everything that can be rejected without touching the network.
    fn prepare(&self) -> docportal_fetch::Result<(Config, ListingSource)> {
        let config = self.config();
        AssetResolver::from_config(&config)
            .check()
            .map_err(|e| docportal_fetch::Error::Usage(e.to_string()))?;
        let listing = ListingSource::parse(self.listing_source())?;
        Ok((config, listing))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_telemetry(cli.verbose);

    let (config, listing) = cli.prepare()?;
    let fetcher = HttpFetcher::new(&config)?;

    match cli.session {
        SessionKind::Webdriver => {
            let session = WebDriverSession::connect(&config).await?;
            let (result, session) = execute(&cli.command, &config, &listing, session, fetcher).await;
            session.quit().await?;
            result
        }
        SessionKind::Http => {
            let session = HttpSession::new(&config)?;
            execute(&cli.command, &config, &listing, session, fetcher).await.0
        }
    }
}

/// Runs the command, handing the session back so a browser can be closed
/// whatever the outcome.
async fn execute<S, F>(
    command: &Command,
    config: &Config,
    listing: &ListingSource,
    session: S,
    fetcher: F,
) -> (Result<(), Box<dyn Error>>, S)
where
    S: PageSession,
    F: Fetch,
{
    let mut pipeline = Pipeline::new(config, session, fetcher);
    let result = match command {
        Command::Run { json, .. } => match pipeline.run(listing).await {
            Ok(summary) => report(&summary, *json),
            Err(e) => Err(e.into()),
        },
        Command::Links { output, .. } => match pipeline.collect_links(listing).await {
            Ok(links) => save_links(&links, output).await,
            Err(e) => Err(e.into()),
        },
    };
    (result, pipeline.into_session())
}

fn report(summary: &RunSummary, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("\nComplete! {summary}");
    }
    Ok(())
}

async fn save_links(links: &CollectedLinks, output: &Path) -> Result<(), Box<dyn Error>> {
    for (index, reference) in links.references.iter().enumerate() {
        info!(index = index + 1, text = %reference.label, url = %reference.landing_url, "link");
    }
    write_urls(&links.references, output).await?;
    println!("Saved {} links to {}", links.references.len(), output.display());

    if !links.similar.is_empty() {
        let similar = output.with_file_name(SIMILAR_LINKS_FILE);
        write_urls(&links.similar, &similar).await?;
        println!(
            "Saved {} similar links to {}",
            links.similar.len(),
            similar.display()
        );
    }
    Ok(())
}

async fn write_urls(references: &[DocumentReference], path: &Path) -> std::io::Result<()> {
    let mut contents = String::new();
    for reference in references {
        contents.push_str(reference.landing_url.as_str());
        contents.push('\n');
    }
    tokio::fs::write(path, contents).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use docportal_fetch::Error as RunError;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("docfetch").chain(args.iter().copied())).unwrap()
    }

    fn http_parts(config: &Config) -> (HttpSession, HttpFetcher) {
        (
            HttpSession::new(config).unwrap(),
            HttpFetcher::new(config).unwrap(),
        )
    }

    #[test]
    fn test_run_positionals_and_options_reach_config() {
        let cli = parse(&[
            "run",
            "https://unfccc.int/documents",
            "cop29_pdfs",
            "--language",
            "French",
            "--page-timeout",
            "20",
            "--settle-delay",
            "1",
            "--show-browser",
        ]);
        let (config, listing) = cli.prepare().unwrap();

        assert_eq!(config.output_dir, PathBuf::from("cop29_pdfs"));
        assert_eq!(config.language, "French");
        assert_eq!(config.page_timeout, Duration::from_secs(20));
        assert_eq!(config.settle_delay, Duration::from_secs(1));
        assert!(!config.headless);
        assert_eq!(
            listing,
            ListingSource::Url(Url::parse("https://unfccc.int/documents").unwrap())
        );
    }

    #[test]
    fn test_run_defaults() {
        let cli = parse(&["run"]);
        assert_eq!(cli.session, SessionKind::Webdriver);
        let (config, listing) = cli.prepare().unwrap();
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(listing, ListingSource::Url(Url::parse(DEFAULT_LISTING_URL).unwrap()));
    }

    #[test]
    fn test_links_keeps_default_output_dir() {
        let cli = parse(&["--session", "http", "links", "https://unfccc.int/event/cop-29", "-o", "out.txt"]);
        assert_eq!(cli.session, SessionKind::Http);
        assert_eq!(cli.config().output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert!(matches!(&cli.command, Command::Links { output, .. } if output == Path::new("out.txt")));
    }

    #[test]
    fn test_invalid_listing_is_usage_error() {
        let cli = parse(&["run", "no_such_page.html"]);
        assert!(matches!(cli.prepare(), Err(RunError::Usage(_))));
    }

    #[test]
    fn test_bad_variant_control_is_usage_error() {
        let cli = parse(&["run", "--variant-control", "select["]);
        assert!(matches!(cli.prepare(), Err(RunError::Usage(_))));
    }

    #[test]
    fn test_non_numeric_timeout_is_rejected() {
        let args = ["docfetch", "run", "--page-timeout", "soon"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[tokio::test]
    async fn test_document_failures_still_complete_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let saved = dir.path().join("listing.html");
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        std::fs::write(
            &saved,
            format!(r#"<a href="http://127.0.0.1:{port}/documents/1">Access document</a>"#),
        )
        .unwrap();
        let out = dir.path().join("downloads");
        let cli = parse(&[
            "--session",
            "http",
            "run",
            saved.to_str().unwrap(),
            out.to_str().unwrap(),
            "--json",
        ]);
        let (config, listing) = cli.prepare().unwrap();
        let (session, fetcher) = http_parts(&config);

        let (result, _) = execute(&cli.command, &config, &listing, session, fetcher).await;
        assert!(result.is_ok());
        assert!(out.is_dir());
    }

    #[tokio::test]
    async fn test_links_writes_similar_links_file() {
        let dir = tempfile::tempdir().unwrap();
        let saved = dir.path().join("listing.html");
        std::fs::write(&saved, r#"<a href="/documents">Documents</a><a href="/">Home</a>"#).unwrap();
        let output = dir.path().join("links.txt");
        let cli = parse(&["links", saved.to_str().unwrap(), "-o", output.to_str().unwrap()]);
        let (config, listing) = cli.prepare().unwrap();
        let (session, fetcher) = http_parts(&config);

        let (result, _) = execute(&cli.command, &config, &listing, session, fetcher).await;
        assert!(result.is_ok());
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "");
        assert_eq!(
            std::fs::read_to_string(dir.path().join(SIMILAR_LINKS_FILE)).unwrap(),
            "https://unfccc.int/documents\n"
        );
    }
}
