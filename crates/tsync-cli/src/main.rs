use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tsync")]
#[command(about = "Training sync operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schema status and migrations
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Print the hash and canonical JSON of the merged config layers
    ConfigHash {
        /// YAML layers, later files override earlier ones
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Synchronization passes
    Sync {
        #[command(subcommand)]
        cmd: SyncCmd,
    },

    /// Inspect and repair per-job watermarks
    Watermark {
        #[command(subcommand)]
        cmd: WatermarkCmd,
    },

    /// Failed contact merge requests
    Merge {
        #[command(subcommand)]
        cmd: MergeCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum SyncCmd {
    /// Run one full pass and print every job outcome.
    Run {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Ignore next-attempt times (locks and disabled watermarks still apply)
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum WatermarkCmd {
    /// Print every watermark of a platform
    List {
        #[arg(long)]
        platform: String,
    },

    /// Rewind a watermark to the origin so the next run refetches everything
    Reset {
        #[command(flatten)]
        target: commands::watermark::Target,
    },

    /// Clear the disabled flag
    Enable {
        #[command(flatten)]
        target: commands::watermark::Target,
    },

    /// Stop a job from running until re-enabled
    Disable {
        #[command(flatten)]
        target: commands::watermark::Target,
    },
}

#[derive(Subcommand)]
enum MergeCmd {
    /// List merge requests that failed and wait for an operator
    Failures {
        #[arg(long)]
        platform: String,
    },
    /// Close a failed request once the accounts were fixed by hand; the
    /// rest of its destination's chain applies on the next run
    Resolve {
        #[arg(long)]
        platform: String,
        #[arg(long)]
        request: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = tsync_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = tsync_db::status(&pool).await?;
                    println!("db_ok={} has_watermarks_table={}", s.ok, s.has_watermarks_table);
                }
                DbCmd::Migrate => {
                    tsync_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = tsync_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Sync { cmd } => match cmd {
            SyncCmd::Run {
                config_paths,
                force,
            } => commands::sync::run(config_paths, force).await?,
        },

        Commands::Watermark { cmd } => commands::watermark::run(cmd).await?,

        Commands::Merge { cmd } => match cmd {
            MergeCmd::Failures { platform } => commands::merge::failures(&platform).await?,
            MergeCmd::Resolve { platform, request } => {
                commands::merge::resolve(&platform, request).await?
            }
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}
