use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "podesk")]
#[command(about = "Purchase-order desk CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (overrides PODESK_CONFIG)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> local ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Order intake and lifecycle
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },

    /// Delay sweeps
    Scan {
        #[command(subcommand)]
        cmd: ScanCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum OrderCmd {
    /// Create an order from a draft file (line format, or JSON when the path ends in .json)
    Create {
        #[arg(long)]
        file: String,
    },

    /// Approve a pending order (PENDING -> VALIDATED)
    Approve {
        /// Order id (CMD/YYYY/MM/NNNN or CMD-YYYY-MM-NNNN)
        #[arg(long)]
        id: String,

        #[arg(long)]
        by: String,
    },

    /// Reject a pending order (PENDING -> REJECTED)
    Reject {
        #[arg(long)]
        id: String,

        #[arg(long)]
        by: String,

        #[arg(long)]
        reason: String,
    },

    /// Soft-delete an order (status unchanged)
    Delete {
        #[arg(long)]
        id: String,

        #[arg(long)]
        by: String,

        #[arg(long)]
        reason: String,
    },

    /// Record a payment against an order
    Pay {
        #[arg(long)]
        id: String,

        /// Decimal amount, e.g. 1234.56
        #[arg(long)]
        amount: String,

        #[arg(long)]
        by: String,

        #[arg(long)]
        reference: Option<String>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Print an order with its ledger
    Show {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum ScanCmd {
    /// Run one delay sweep now and print the report
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let config_paths = cli.config_paths;

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = podesk_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = podesk_db::status(&pool).await?;
                    println!("db_ok={} has_orders_table={}", s.ok, s.has_orders_table);
                }
                DbCmd::Migrate => {
                    podesk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = podesk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Order { cmd } => match cmd {
            OrderCmd::Create { file } => commands::order::create(&config_paths, &file).await?,
            OrderCmd::Approve { id, by } => {
                commands::order::approve(&config_paths, &id, &by).await?
            }
            OrderCmd::Reject { id, by, reason } => {
                commands::order::reject(&config_paths, &id, &by, &reason).await?
            }
            OrderCmd::Delete { id, by, reason } => {
                commands::order::delete(&config_paths, &id, &by, &reason).await?
            }
            OrderCmd::Pay {
                id,
                amount,
                by,
                reference,
                note,
            } => commands::order::pay(&config_paths, &id, &amount, &by, reference, note).await?,
            OrderCmd::Show { id } => commands::order::show(&config_paths, &id).await?,
        },

        Commands::Scan { cmd } => match cmd {
            ScanCmd::Once => commands::scan::once(&config_paths).await?,
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays `key=value` parseable. Default `warn`.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}
