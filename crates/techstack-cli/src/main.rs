use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use techstack_client::{ApiConfig, OpportunityClient, OpportunitySource, API_URL_VAR};
use techstack_controller::{ControllerHandle, FetchState, FilterController, PendingFetch};
use techstack_core::{CertType, Domain, FilterSelection, FilterValue, Level, Platform};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "techstack")]
#[command(about = "Find certifications, courses and events by domain, level, type and platform")]
struct Cli {
    /// Search API base URL; overrides TECHSTACK_API_URL.
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply one filter selection and print the results.
    Search(SearchArgs),
    /// List the accepted filter values.
    Options,
    /// Serve the web UI.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(long, default_value_t = Domain::Cloud)]
    domain: Domain,
    #[arg(long, default_value_t = Level::All)]
    level: Level,
    #[arg(long = "type", default_values_t = [CertType::Certifications])]
    types: Vec<CertType>,
    #[arg(long = "platform", default_values_t = [Platform::LinkedIn, Platform::Facebook])]
    platforms: Vec<Platform>,
    /// Free-text search forwarded to the API alongside the filters.
    #[arg(long, default_value = "")]
    search: String,
    /// Print the raw result list as JSON.
    #[arg(long)]
    json: bool,
    /// Show description and expectations for every card.
    #[arg(long)]
    expand_all: bool,
}

impl SearchArgs {
    fn selection(&self) -> FilterSelection {
        FilterSelection {
            domain: self.domain,
            level: self.level,
            cert_types: self.types.iter().copied().collect(),
            platforms: self.platforms.iter().copied().collect(),
        }
    }

    /// Commit the selection and carry the search text into the outgoing query.
    fn begin(&self, controller: &mut FilterController) -> PendingFetch {
        let mut pending = controller.begin_apply();
        pending.query.search = self.search.trim().to_string();
        pending
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr);
    if std::env::var("TECHSTACK_LOG_JSON").ok().as_deref() == Some("1") {
        fmt.json().init();
    } else {
        fmt.init();
    }
}

fn api_config(api_url: Option<String>) -> Result<ApiConfig> {
    ApiConfig::from_lookup(|key| {
        if key == API_URL_VAR {
            if let Some(url) = &api_url {
                return Some(url.clone());
            }
        }
        std::env::var(key).ok()
    })
    .context("loading search API configuration")
}

fn build_client(api_url: Option<String>) -> Result<OpportunityClient> {
    let config = api_config(api_url)?;
    OpportunityClient::new(&config).context("building search API client")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Search(args) => {
            let client = build_client(cli.api_url)?;
            let mut controller = FilterController::new(args.selection());
            let pending = args.begin(&mut controller);
            info!(endpoint = client.endpoint(), search = %pending.query.search, "running search");
            let result = client.fetch(&pending.query).await;
            controller.resolve(pending.seq, result);
            let state = controller.fetch_state().clone();
            info!(count = state.results().len(), failed = state.error_message().is_some(), "search finished");
            if args.json {
                let text = serde_json::to_string_pretty(state.results())
                    .context("serializing results")?;
                println!("{text}");
            } else {
                print!("{}", render_results(controller.applied(), &state, args.expand_all));
            }
            if let FetchState::Error(message) = &state {
                anyhow::bail!("search failed: {message}");
            }
        }
        Commands::Options => {
            print!("{}", render_options());
        }
        Commands::Serve { port } => {
            let client = build_client(cli.api_url)?;
            let port = match port {
                Some(port) => port,
                None => techstack_web::port_from_env().context("reading web port")?,
            };
            info!(endpoint = client.endpoint(), port, "starting web UI");
            let handle = ControllerHandle::new(Arc::new(client));
            techstack_web::serve(techstack_web::AppState::new(handle), port).await?;
        }
    }

    Ok(())
}

fn labels<T: FilterValue>() -> String {
    T::variants().iter().map(|v| v.label()).collect::<Vec<_>>().join(", ")
}

fn render_options() -> String {
    format!(
        "domains:   {}\nlevels:    {}\ntypes:     {}\nplatforms: {}\n",
        labels::<Domain>(),
        labels::<Level>(),
        labels::<CertType>(),
        labels::<Platform>()
    )
}

fn render_results(applied: &FilterSelection, state: &FetchState, expand_all: bool) -> String {
    let mut out = String::new();
    match state {
        FetchState::Error(message) => {
            out.push_str(&format!("error: {message}\n"));
            return out;
        }
        FetchState::Idle | FetchState::Loading => return out,
        FetchState::Success(_) => {}
    }

    let items = state.results();
    out.push_str(&techstack_web::results_heading(items.len()));
    out.push('\n');
    if items.is_empty() {
        out.push_str("Try adjusting your filters to find more results.\n");
        return out;
    }
    out.push_str(&format!(
        "Showing results for {} \u{2022} {}\n\n",
        applied.domain, applied.level
    ));

    for (idx, opp) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", idx + 1, opp.title));
        if let Some(platform) = &opp.platform {
            out.push_str(&format!(
                "   {} \u{2022} {platform}\n",
                opp.source.as_deref().unwrap_or("unknown source")
            ));
        }
        if let Some(label) = &opp.category_label {
            let icon = opp.known_domain().map(|d| d.icon()).unwrap_or_default();
            out.push_str(&format!("   [{icon} {label}]\n"));
        }
        if let Some(url) = opp.dedup_key() {
            out.push_str(&format!("   {url}\n"));
        }
        if let Some(summary) = &opp.summary {
            out.push_str(&format!("   {summary}\n"));
        }
        if expand_all {
            if let Some(description) = &opp.description {
                out.push_str(&format!("   Description: {description}\n"));
            }
            if let Some(expectations) = &opp.expectations {
                out.push_str(&format!("   What to expect: {expectations}\n"));
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use techstack_core::Opportunity;

    #[test]
    fn search_args_parse_repeated_filters() {
        let cli = Cli::parse_from([
            "techstack", "search", "--domain", "ai", "--level", "Entry Level", "--type", "Courses",
            "--type", "Events", "--platform", "Dev.to",
        ]);
        let Commands::Search(args) = cli.command else {
            panic!("expected search command");
        };
        let selection = args.selection();
        assert_eq!(selection.domain, Domain::Ai);
        assert_eq!(selection.level, Level::EntryLevel);
        assert_eq!(selection.cert_type_labels(), vec!["Courses", "Events"]);
        assert_eq!(selection.platform_labels(), vec!["Dev.to"]);
    }

    #[test]
    fn search_defaults_match_initial_selection() {
        let cli = Cli::parse_from(["techstack", "search"]);
        let Commands::Search(args) = cli.command else {
            panic!("expected search command");
        };
        assert_eq!(args.selection(), FilterSelection::default());
    }

    #[test]
    fn search_text_reaches_the_outgoing_query() {
        let cli = Cli::parse_from(["techstack", "search", "--domain", "data", "--search", " spark "]);
        let Commands::Search(args) = cli.command else {
            panic!("expected search command");
        };
        let mut controller = FilterController::new(args.selection());
        let pending = args.begin(&mut controller);
        assert_eq!(pending.query.search, "spark");
        assert_eq!(pending.query.domain, "Data");
        assert!(controller.fetch_state().is_loading());
        assert_eq!(controller.in_flight(), Some(pending.seq));

        let cli = Cli::parse_from(["techstack", "search"]);
        let Commands::Search(args) = cli.command else {
            panic!("expected search command");
        };
        let pending = args.begin(&mut FilterController::new(args.selection()));
        assert_eq!(pending.query.search, "");
    }

    #[test]
    fn unknown_filter_value_is_a_parse_error() {
        assert!(Cli::try_parse_from(["techstack", "search", "--domain", "All"]).is_err());
    }

    #[test]
    fn render_results_lists_cards_and_summary() {
        let state = FetchState::Success(vec![Opportunity {
            title: "CCNA".into(),
            url: Some("https://cisco.example/ccna".into()),
            category_label: Some("Networking".into()),
            platform: Some("Reddit".into()),
            expectations: Some("1+ years".into()),
            ..Default::default()
        }]);
        let text = render_results(&FilterSelection::default(), &state, false);
        assert!(text.starts_with("Found 1 Opportunity\n"));
        assert!(text.contains("Showing results for Cloud \u{2022} All"));
        assert!(text.contains("1. CCNA"));
        assert!(text.contains("unknown source \u{2022} Reddit"));
        assert!(text.contains("https://cisco.example/ccna"));
        assert!(!text.contains("1+ years"));
        assert!(render_results(&FilterSelection::default(), &state, true).contains("1+ years"));
    }

    #[test]
    fn render_results_reports_empty_and_error() {
        let empty = render_results(&FilterSelection::default(), &FetchState::Success(vec![]), false);
        assert!(empty.starts_with("No Results Found"));
        let failed = render_results(
            &FilterSelection::default(),
            &FetchState::Error("Failed to fetch certifications: 503".into()),
            false,
        );
        assert_eq!(failed, "error: Failed to fetch certifications: 503\n");
    }

    #[test]
    fn options_lists_every_vocabulary() {
        let text = render_options();
        assert!(text.contains("Cloud, AI, Developer, Cybersecurity, Data, Networking"));
        assert!(text.contains("All, Entry Level, Associate, Professional, Expert"));
        assert!(text.contains("LinkedIn, Facebook, Reddit, Medium, Dev.to, Devpost"));
    }
}
