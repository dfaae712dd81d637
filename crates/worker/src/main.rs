use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod export;
mod reminders;

#[derive(Debug, Parser)]
#[command(name = "subtracker_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log due renewals, billing notices and cancellation alerts.
    Reminders {
        /// Evaluate as of this date (YYYY-MM-DD). Defaults to today at the configured offset.
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Push the project tree to a GitHub repository.
    Export {
        #[arg(long, default_value = ".")]
        root: PathBuf,

        #[arg(long, default_value = export::DEFAULT_REPO_NAME)]
        repo: String,

        /// Also write the collected files to this zip archive.
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Collect (and archive) but do not call GitHub.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = subtracker_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Reminders { as_of } => reminders::run(&settings, as_of.as_deref()).await,
        Command::Export {
            root,
            repo,
            archive,
            dry_run,
        } => {
            export::run(
                &settings,
                export::ExportOptions {
                    root,
                    repo,
                    archive,
                    dry_run,
                },
            )
            .await
        }
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
    }
    result
}

fn init_sentry(settings: &subtracker_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
