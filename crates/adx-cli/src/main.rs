//! AdXGuard CLI
//!
//! CLI tool for managing custom blocked patterns against file-backed
//! storage and a file-backed dynamic rule engine.

mod engine;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};

use adx_compiler::{plan, BlockerEvent, CustomBlocker, Notifier, NotifyError, RuleEngine};
use adx_core::config::{BlockerConfig, IdScheme};
use adx_core::entitlement::{EntitlementGate, PaymentMethod};
use adx_core::stats::{blocked_domain, StatsTracker};
use adx_core::types::ResourceType;

use engine::JsonFileEngine;
use state::JsonFileStore;

#[derive(Parser)]
#[command(name = "adx-cli")]
#[command(about = "AdXGuard custom blocking rules and tools")]
struct Cli {
    /// Extension storage file
    #[arg(long, global = true, default_value = "adx-state.json")]
    state: PathBuf,

    /// Installed dynamic rules file
    #[arg(long, global = true, default_value = "adx-rules.json")]
    rules: PathBuf,

    /// Blocker configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Rule id scheme (stable or positional), overrides the config file
    #[arg(long, global = true)]
    id_scheme: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show blocked patterns and their rule ids
    List,

    /// Block a domain or URL pattern
    Add {
        pattern: String,
    },

    /// Unblock a pattern
    Remove {
        pattern: String,
    },

    /// Remove every blocked pattern
    Clear {
        /// Confirm clearing a non-empty list
        #[arg(long)]
        yes: bool,
    },

    /// Reinstall the custom rules from the stored list
    Sync,

    /// Print the compiled rules as JSON
    Rules,

    /// Print the sync plan against the installed rules without applying it
    Plan,

    /// Check whether a URL would be blocked by a custom rule
    Check {
        url: String,

        /// Request resource type
        #[arg(short = 't', long = "type", default_value = "main_frame")]
        resource_type: String,
    },

    /// Show blocked request statistics
    Stats {
        /// Number of websites to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Count a blocked request
    RecordBlock {
        /// URL of the tab the request came from
        #[arg(long)]
        tab_url: Option<String>,

        /// URL of the blocked request
        #[arg(long)]
        request_url: Option<String>,

        #[arg(long, default_value_t = 1)]
        count: u64,
    },

    /// Record a confirmed premium payment
    Activate {
        /// paypal, payhere or manual
        #[arg(long, default_value = "manual")]
        method: String,

        #[arg(long)]
        session_id: Option<String>,
    },
}

/// Logs list changes; there is no other extension context to tell.
struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &BlockerEvent) -> Result<(), NotifyError> {
        let message = serde_json::to_string(event).map_err(|e| NotifyError(e.to_string()))?;
        log::info!("Notify: {}", message);
        Ok(())
    }
}

type Blocker = CustomBlocker<JsonFileStore, JsonFileEngine, LogNotifier>;

struct Context {
    storage: Arc<JsonFileStore>,
    engine: Arc<JsonFileEngine>,
    config: BlockerConfig,
}

impl Context {
    async fn open(cli: &Cli) -> Result<Self, String> {
        let mut config = match &cli.config {
            Some(path) => load_config(path).await?,
            None => BlockerConfig::default(),
        };
        if let Some(scheme) = &cli.id_scheme {
            config.id_scheme = match scheme.to_ascii_lowercase().as_str() {
                "stable" => IdScheme::Stable,
                "positional" => IdScheme::Positional,
                other => return Err(format!("Unknown id scheme '{}'", other)),
            };
        }
        Ok(Self {
            storage: Arc::new(JsonFileStore::new(&cli.state)),
            engine: Arc::new(JsonFileEngine::new(&cli.rules, config.rule_quota)),
            config,
        })
    }

    async fn blocker(&self) -> Result<Blocker, String> {
        CustomBlocker::open(
            self.storage.clone(),
            self.engine.clone(),
            Arc::new(LogNotifier),
            self.config.clone(),
        )
        .await
        .map_err(|e| e.to_string())
    }
}

async fn load_config(path: &Path) -> Result<BlockerConfig, String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    BlockerConfig::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path.display(), e))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let ctx = Context::open(&cli).await?;

    match cli.command {
        Commands::List => cmd_list(&ctx).await,
        Commands::Add { pattern } => cmd_add(&ctx, &pattern).await,
        Commands::Remove { pattern } => cmd_remove(&ctx, &pattern).await,
        Commands::Clear { yes } => cmd_clear(&ctx, yes).await,
        Commands::Sync => cmd_sync(&ctx).await,
        Commands::Rules => cmd_rules(&ctx).await,
        Commands::Plan => cmd_plan(&ctx).await,
        Commands::Check { url, resource_type } => cmd_check(&ctx, &url, &resource_type).await,
        Commands::Stats { top } => cmd_stats(&ctx, top).await,
        Commands::RecordBlock {
            tab_url,
            request_url,
            count,
        } => cmd_record_block(&ctx, tab_url.as_deref(), request_url.as_deref(), count).await,
        Commands::Activate { method, session_id } => cmd_activate(&ctx, &method, session_id).await,
    }
}

async fn cmd_list(ctx: &Context) -> Result<(), String> {
    let blocker = ctx.blocker().await?;
    let entries = blocker.store().entries();
    if entries.is_empty() {
        println!("No blocked patterns");
        return Ok(());
    }

    println!("{} blocked patterns:", entries.len());
    for entry in entries {
        println!("  [{}] {}", entry.rule_id, entry.pattern);
    }
    Ok(())
}

async fn cmd_add(ctx: &Context, pattern: &str) -> Result<(), String> {
    let mut blocker = ctx.blocker().await?;
    let entry = blocker.add(pattern).await.map_err(|e| e.to_string())?;
    println!("Blocked '{}' (rule {})", entry.pattern, entry.rule_id);
    Ok(())
}

async fn cmd_remove(ctx: &Context, pattern: &str) -> Result<(), String> {
    let mut blocker = ctx.blocker().await?;
    let removed = blocker.remove(pattern).await.map_err(|e| e.to_string())?;
    if removed == 0 {
        println!("'{}' was not blocked", pattern);
    } else {
        println!("Unblocked '{}'", pattern);
    }
    Ok(())
}

async fn cmd_clear(ctx: &Context, yes: bool) -> Result<(), String> {
    let mut blocker = ctx.blocker().await?;
    let count = blocker.store().len();
    if count > 0 && !yes {
        return Err(format!(
            "Refusing to clear {} blocked patterns without --yes",
            count
        ));
    }
    blocker.clear().await.map_err(|e| e.to_string())?;
    println!("Cleared {} blocked patterns", count);
    Ok(())
}

async fn cmd_sync(ctx: &Context) -> Result<(), String> {
    let blocker = ctx.blocker().await?;
    let report = blocker.resync().await.map_err(|e| e.to_string())?;
    println!("Synced custom rules");
    println!("  Removed:  {}", report.removed);
    println!("  Added:    {}", report.added);
    Ok(())
}

async fn cmd_rules(ctx: &Context) -> Result<(), String> {
    let blocker = ctx.blocker().await?;
    let json = serde_json::to_string_pretty(&blocker.compiled_rules())
        .map_err(|e| format!("Failed to serialize rules: {}", e))?;
    println!("{}", json);
    Ok(())
}

async fn cmd_plan(ctx: &Context) -> Result<(), String> {
    let blocker = ctx.blocker().await?;
    let installed = ctx.engine.installed_rules().await.map_err(|e| e.to_string())?;
    let sync_plan = plan(&blocker.compiled_rules(), &installed);
    let json = serde_json::to_string_pretty(&sync_plan)
        .map_err(|e| format!("Failed to serialize plan: {}", e))?;
    println!("{}", json);
    Ok(())
}

async fn cmd_check(ctx: &Context, url: &str, resource_type: &str) -> Result<(), String> {
    let blocker = ctx.blocker().await?;
    let resource_type = ResourceType::from_str(resource_type);
    let rules = blocker.compiled_rules();

    match rules.iter().find(|rule| rule.matches(url, resource_type)) {
        Some(rule) => println!(
            "BLOCK  {} ({}) by rule {} '{}'",
            url,
            resource_type.as_str(),
            rule.id,
            rule.url_filter()
        ),
        None => println!("ALLOW  {} ({})", url, resource_type.as_str()),
    }
    Ok(())
}

async fn cmd_stats(ctx: &Context, top: usize) -> Result<(), String> {
    let tracker = StatsTracker::new(ctx.storage.clone());
    let now = Local::now();
    let stats = tracker.current(&now).await.map_err(|e| e.to_string())?;
    let enabled = tracker.blocking_enabled().await.map_err(|e| e.to_string())?;

    println!("Blocking:     {}", if enabled { "on" } else { "off" });
    println!("This month:   {}", stats.monthly);
    for (domain, count) in stats.top_sites(top) {
        println!("  {:>8}  {}", count, domain);
    }
    Ok(())
}

async fn cmd_record_block(
    ctx: &Context,
    tab_url: Option<&str>,
    request_url: Option<&str>,
    count: u64,
) -> Result<(), String> {
    let tracker = StatsTracker::new(ctx.storage.clone());
    let domain = blocked_domain(tab_url, request_url);
    let now = Local::now();

    match tracker
        .record_blocked(domain.as_deref(), count, &now)
        .await
        .map_err(|e| e.to_string())?
    {
        Some(stats) => println!("Recorded; {} blocked this month", stats.monthly),
        None => println!("Blocking is disabled; nothing recorded"),
    }
    Ok(())
}

async fn cmd_activate(ctx: &Context, method: &str, session_id: Option<String>) -> Result<(), String> {
    let method = match method.to_ascii_lowercase().as_str() {
        "paypal" => PaymentMethod::Paypal,
        "payhere" => PaymentMethod::Payhere,
        "manual" => PaymentMethod::Manual,
        other => return Err(format!("Unknown payment method '{}'", other)),
    };

    let gate = EntitlementGate::new(ctx.storage.clone());
    let entitlement = gate
        .activate(method, session_id, Utc::now())
        .await
        .map_err(|e| e.to_string())?;
    println!(
        "Premium active since {}",
        entitlement
            .purchase_date
            .map(|d| d.to_rfc3339())
            .unwrap_or_default()
    );
    Ok(())
}
