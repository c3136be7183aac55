use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use eyecms::bootstrap::{self, AppMode};
use eyecms::config::CmsConfig;
use eyecms::db::{self, repository::CmsRepository, repository::PgRepository};
use eyecms::error::CmsError;
use eyecms::packages::{Outcome, PackageError, PackageManager};
use eyecms::services::i18n;
use eyecms::state::AppState;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing database URL; pass --database-url or set DATABASE_URL")]
    MissingDatabaseUrl,
    #[error(transparent)]
    Cms(#[from] CmsError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "eyecms-cli", about = "eyecms package and translation maintenance")]
struct Cli {
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the console bootstrap against the database and report.
    Check,
    Package(PackageCommand),
    Languages(LanguagesCommand),
}

#[derive(Args, Debug)]
struct PackageCommand {
    #[command(subcommand)]
    command: PackageSubcommand,
}

#[derive(Subcommand, Debug)]
enum PackageSubcommand {
    List,
    Install { name: String },
    Remove { name: String },
    Update { name: String },
}

#[derive(Args, Debug)]
struct LanguagesCommand {
    #[command(subcommand)]
    command: LanguagesSubcommand,
}

#[derive(Subcommand, Debug)]
enum LanguagesSubcommand {
    /// Write `<language>.json` translation tables from the database.
    Compile {
        #[arg(long, help = "Output directory (defaults to CMS_LANGUAGES_CACHE_DIR)")]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let database_url = cli.database_url.ok_or(CliError::MissingDatabaseUrl)?;
    let pool = db::init_pool(&database_url).await.map_err(CmsError::from)?;
    let repo: Arc<dyn CmsRepository> = Arc::new(PgRepository::new(pool));
    let config = CmsConfig::from_env();

    match cli.command {
        Command::Check => run_check(repo, config).await,
        Command::Package(package) => run_package(repo, package).await,
        Command::Languages(languages) => run_languages(repo, &config, languages).await,
    }
}

async fn run_check(repo: Arc<dyn CmsRepository>, config: CmsConfig) -> Result<(), CliError> {
    let state = AppState::new(repo, config);
    let session = state.sessions.open(None);
    let scope = bootstrap::after_engine(&state, session, AppMode::Console, None, false).await?;
    print_json(&json!({
        "installed": state.config.installed,
        "debug": state.config.debug,
        "language": scope.language.language,
        "locale": scope.language.locale,
    }))
}

async fn run_package(repo: Arc<dyn CmsRepository>, package: PackageCommand) -> Result<(), CliError> {
    let manager = PackageManager::with_builtins(repo);
    let outcome = match package.command {
        PackageSubcommand::List => {
            let installed: Vec<_> = manager
                .list()
                .await?
                .into_iter()
                .map(|p| json!({ "name": p.name, "type": p.kind, "version": p.version, "enabled": p.enabled }))
                .collect();
            let available: Vec<_> = manager.available().collect();
            return print_json(&json!({ "installed": installed, "available": available }));
        }
        PackageSubcommand::Install { name } => manager.install(&name).await?,
        PackageSubcommand::Remove { name } => manager.remove(&name).await?,
        PackageSubcommand::Update { name } => manager.update(&name).await?,
    };
    print_json(&outcome_json(&outcome))
}

async fn run_languages(
    repo: Arc<dyn CmsRepository>,
    config: &CmsConfig,
    languages: LanguagesCommand,
) -> Result<(), CliError> {
    match languages.command {
        LanguagesSubcommand::Compile { dir } => {
            let dir = dir.unwrap_or_else(|| config.languages_cache_dir.clone());
            let written = i18n::compile_translations(&*repo, &dir).await?;
            print_json(&json!({ "written": written, "dir": dir.display().to_string() }))
        }
    }
}

fn outcome_json(outcome: &Outcome) -> serde_json::Value {
    match outcome {
        Outcome::Installed { version } => json!({ "status": "installed", "version": version }),
        Outcome::AlreadyInstalled { version } => json!({ "status": "already_installed", "version": version }),
        Outcome::Removed => json!({ "status": "removed" }),
        Outcome::NotPresent => json!({ "status": "not_present" }),
        Outcome::Updated { from, to, steps } => json!({ "status": "updated", "from": from, "to": to, "steps": steps }),
        Outcome::UpToDate { version } => json!({ "status": "up_to_date", "version": version }),
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_package_update() {
        let cli = Cli::try_parse_from(["eyecms-cli", "--database-url", "postgres://x", "package", "update", "user"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Package(PackageCommand { command: PackageSubcommand::Update { ref name } }) if name == "user"
        ));
    }

    #[test]
    fn parses_languages_compile_dir() {
        let cli = Cli::try_parse_from(["eyecms-cli", "languages", "compile", "--dir", "/tmp/langs"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Languages(LanguagesCommand { command: LanguagesSubcommand::Compile { dir: Some(_) } })
        ));
    }

    #[test]
    fn outcome_json_reports_status() {
        let value = outcome_json(&Outcome::Updated { from: "0.3.0".into(), to: "0.4.0".into(), steps: 1 });
        assert_eq!(value["status"], "updated");
        assert_eq!(value["to"], "0.4.0");
        assert_eq!(outcome_json(&Outcome::NotPresent)["status"], "not_present");
    }
}
