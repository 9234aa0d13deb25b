use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use visitor_analytics::dashboard::Dashboard;
use visitor_analytics::date_range::RangeType;
use visitor_analytics::export::ExportError;
use visitor_analytics::filter::FilterCriteria;
use visitor_analytics::reports::ReportGenerator;
use visitor_core::config::{AppConfig, WeekStart};
use visitor_core::source::{EventSource, LocalStore};
use visitor_core::working_set::WorkingSet;

#[derive(Parser)]
#[command(
    name = "visitor-intel",
    about = "Website visitor intelligence: companies, visitors, and lead export",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/visitor-intel/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the owning user id
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// First day of the week for week ranges (sunday or monday)
    #[arg(long, global = true)]
    week_start: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List companies visible under a filter (default)
    Companies {
        #[command(flatten)]
        filter: FilterArgs,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show one company's visitors and their visits
    Sessions {
        /// Company name
        company: String,
        #[command(flatten)]
        filter: FilterArgs,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Export filtered visits as delimited text
    Export {
        /// Output file (default: export.file_name from config)
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// List or delete labels
    Labels {
        #[command(subcommand)]
        action: Option<LabelAction>,
    },

    /// Start the HTTP server
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Args, Default)]
struct FilterArgs {
    /// Date range: all, today, yesterday, thisWeek, lastWeek, lastMonth, thisYear, custom
    #[arg(short, long)]
    range: Option<String>,
    /// Custom range start (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Custom range end (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Location must contain this text
    #[arg(long)]
    location: Option<String>,
    /// Page URL must contain this text
    #[arg(long)]
    page: Option<String>,
    /// Minimum visit duration in seconds
    #[arg(long)]
    min_duration: Option<f64>,
    /// Minimum visits per company
    #[arg(long)]
    min_visits: Option<usize>,
    /// Only companies carrying this label
    #[arg(long)]
    label: Option<String>,
    /// Company name must contain this text
    #[arg(long)]
    company: Option<String>,
}

impl FilterArgs {
    fn to_criteria(&self, config: &AppConfig) -> FilterCriteria {
        let range = self
            .range
            .as_deref()
            .unwrap_or(&config.filters.default_range);
        FilterCriteria {
            range_type: RangeType::parse(range),
            custom_from: self.from,
            custom_to: self.to,
            location_substring: self.location.clone(),
            page_substring: self.page.clone(),
            min_duration_seconds: self.min_duration,
            min_visit_count: self.min_visits,
            label_text: self.label.clone(),
            company_substring: self.company.clone(),
        }
    }
}

#[derive(Subcommand)]
enum LabelAction {
    /// List labels and the distinct label options
    List,
    /// Delete a label by id
    Delete { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "visitor_intel=info,warn".into()),
        )
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    if let Some(user) = &cli.user {
        config.user.id = user.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.data.dir = Some(dir.clone());
    }
    if let Some(week_start) = &cli.week_start {
        config.filters.week_start = match week_start.to_lowercase().as_str() {
            "monday" | "mon" => WeekStart::Monday,
            "sunday" | "sun" => WeekStart::Sunday,
            other => anyhow::bail!("Unknown week start: {}", other),
        };
    }
    config.validate()?;

    match cli.command {
        Some(Commands::Companies { filter, json }) => {
            let dashboard = load_dashboard(&config).await?;
            let aggregate = dashboard.aggregate(&filter.to_criteria(&config));
            if json {
                println!("{}", serde_json::to_string_pretty(&aggregate.companies)?);
            } else {
                print!("{}", ReportGenerator::roster_summary(&aggregate));
            }
        }
        Some(Commands::Sessions {
            company,
            filter,
            json,
        }) => {
            let dashboard = load_dashboard(&config).await?;
            let visitors = dashboard.sessions_for(&company, &filter.to_criteria(&config));
            if json {
                println!("{}", serde_json::to_string_pretty(&visitors)?);
            } else {
                print!("{}", ReportGenerator::visitor_summary(&company, &visitors));
            }
        }
        Some(Commands::Export { out, filter }) => {
            let dashboard = load_dashboard(&config).await?;
            let filtered = dashboard.filtered_events(&filter.to_criteria(&config));
            match dashboard.export_text(&filtered) {
                Ok(text) => {
                    let path = out.unwrap_or_else(|| PathBuf::from(&config.export.file_name));
                    tokio::fs::write(&path, text).await?;
                    println!("Exported {} visits to {}", filtered.len(), path.display());
                }
                Err(ExportError::Empty) => println!("{}", ExportError::Empty),
                Err(e) => return Err(e.into()),
            }
        }
        Some(Commands::Labels { action }) => {
            handle_label_command(action, &config).await?;
        }
        Some(Commands::Serve { host, port }) => {
            if let Some(h) = host {
                config.server.host = h;
            }
            if let Some(p) = port {
                config.server.port = p;
            }
            visitor_server::serve(config).await?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, &config)?;
        }
        None => {
            let dashboard = load_dashboard(&config).await?;
            let criteria = FilterArgs::default().to_criteria(&config);
            print!("{}", ReportGenerator::roster_summary(&dashboard.aggregate(&criteria)));
        }
    }

    Ok(())
}

/// One-shot snapshot of the configured user's events and labels.
async fn load_dashboard(config: &AppConfig) -> Result<Dashboard> {
    let store = LocalStore::open(config).await?;
    let events = store.fetch_events(&config.user.id).await?;
    let labels = store.fetch_labels(&config.user.id).await?;
    let working_set = WorkingSet::load(config.user.id.clone(), events);
    tracing::info!(
        "Loaded {} events and {} labels for user {}",
        working_set.len(),
        labels.len(),
        config.user.id
    );
    Ok(Dashboard::from_config(config, working_set, labels))
}

async fn handle_label_command(action: Option<LabelAction>, config: &AppConfig) -> Result<()> {
    match action {
        Some(LabelAction::List) | None => {
            let dashboard = load_dashboard(config).await?;
            for label in dashboard.labels() {
                println!(
                    "  {:<8} {:<24} {}",
                    label.id, label.company_name, label.label_text
                );
            }
            println!("  Options: {}", dashboard.label_options().join(", "));
        }
        Some(LabelAction::Delete { id }) => {
            let store = LocalStore::open(config).await?;
            store.delete_label(&id).await?;
            println!("Deleted label {}", id);
        }
    }
    Ok(())
}

fn handle_config_command(action: Option<ConfigAction>, config: &AppConfig) -> Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        Some(ConfigAction::Init) => {
            let path = AppConfig::default_path();
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                config.save()?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", AppConfig::default_path().display());
        }
    }
    Ok(())
}
