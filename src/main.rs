// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use commander_tierlist::{
    load_catalog_csv, AggregationEngine, Config, DeviceFingerprinter, IdentityResolver,
    RankableUnit, SessionContext, SqliteStore, SummaryStats, SyncProtocol, Tier,
    TierListClient, TierStore, VERSION,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::load()?;

    match args.get(1).map(String::as_str) {
        Some("import") => {
            let csv_path = args
                .get(2)
                .ok_or_else(|| anyhow!("usage: commander-tierlist import <catalog.csv>"))?;
            run_import(&config, Path::new(csv_path))?;
        }
        Some("summary") => run_summary(&config)?,
        Some("rank") => {
            let (Some(unit), Some(tier)) = (args.get(2), args.get(3)) else {
                return Err(anyhow!("usage: commander-tierlist rank <unit-key> <tier>"));
            };
            run_rank(&config, unit, tier)?;
        }
        // UI mode (default)
        _ => run_ui_mode(&config)?,
    }

    Ok(())
}

fn run_import(config: &Config, csv_path: &Path) -> Result<()> {
    println!("🗄️  Catalog Import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Loading CSV...");
    let catalog = load_catalog_csv(csv_path)?;
    println!(
        "✓ Loaded {} commanders ({} rankable units)",
        catalog.commanders().len(),
        catalog.unit_count()
    );

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let store = SqliteStore::open(&config.db_path)?;
    println!("✓ Database initialized with WAL mode");

    // 3. Import
    println!("\n💾 Importing catalog...");
    let imported = store.import_catalog(&catalog)?;

    // 4. Verify
    println!("\n🔍 Verifying database...");
    let stored = store.fetch_catalog()?;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if stored.unit_count() >= catalog.unit_count() {
        println!("✅ Imported {} commanders, {} units available", imported, stored.unit_count());
    } else {
        println!(
            "⚠️  Expected {} units, database has {}",
            catalog.unit_count(),
            stored.unit_count()
        );
    }

    Ok(())
}

fn run_summary(config: &Config) -> Result<()> {
    let store = open_existing(config)?;
    let catalog = store.fetch_catalog()?;
    let result = AggregationEngine::compute(&store, &catalog)?;
    let stats = SummaryStats::from_result(&result, store.count_identities()?);

    let name = |unit: Option<RankableUnit>| {
        unit.map(|u| catalog.describe(&u))
            .unwrap_or_else(|| "N/A".to_string())
    };

    println!("📊 Community Tier List (v{})", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Submissions:     {}", stats.total_submissions);
    println!("Highest rated:   {}", name(stats.top_unit));
    println!("Lowest rated:    {}", name(stats.bottom_unit));

    for (tier, tallies) in result.iter() {
        println!("\n{} ({})", tier.display_name(), tier.code());
        if tallies.is_empty() {
            println!("  -");
        }
        for tally in tallies {
            println!(
                "  {:<40} {}/{}",
                catalog.describe(&tally.unit),
                tally.votes,
                tally.total_votes
            );
        }
    }

    Ok(())
}

fn run_rank(config: &Config, unit_key: &str, tier_name: &str) -> Result<()> {
    let unit: RankableUnit = unit_key.parse()?;
    let tier: Tier = tier_name.parse()?;

    let mut client = load_client(config)?;
    let report = client
        .move_to(unit, tier)
        .map_err(|rejected| anyhow!("Move rejected: {}", rejected))?;

    let label = client.catalog().describe(&unit);
    match report.warning {
        Some(warning) => println!("⚠️  {} → {} saved locally only: {}", label, tier, warning),
        None => println!("✓ {} → {} ({:?})", label, tier, report.outcome),
    }

    Ok(())
}

fn open_existing(config: &Config) -> Result<SqliteStore> {
    if !config.db_path.exists() {
        eprintln!("❌ Database not found at {:?}", config.db_path);
        eprintln!("   Run: commander-tierlist import <catalog.csv>");
        return Err(anyhow!("database missing"));
    }
    SqliteStore::open(&config.db_path)
}

fn load_client(config: &Config) -> Result<TierListClient<SqliteStore, DeviceFingerprinter>> {
    let store = open_existing(config)?;
    let fingerprinter = DeviceFingerprinter::for_local_machine();
    let resolver = IdentityResolver::new(
        fingerprinter.clone(),
        &fingerprinter.user_agent,
        fingerprinter.device_info.clone(),
    );
    let session = SessionContext::load(&config.session_path)?;

    TierListClient::load(store, resolver, session, SyncProtocol::new(config.dedup_window()))
        .context("Failed to load tier list")
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    println!("🖥️  Loading Commander Tier List...\n");

    let client = load_client(config)?;
    println!("✓ Loaded {} commanders\n", client.state().total_units());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(client);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin tierlist-server --features server");
    std::process::exit(1);
}
