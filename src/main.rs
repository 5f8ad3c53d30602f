use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use repopress::models::pull::{PullRunRequest, SortKey};
use repopress::models::task::{ArticleTask, TaskLog};
use repopress::{server, ApiClient, ClientConfig, Config, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "repopress")]
#[command(version = "0.1.0")]
#[command(about = "Discover GitHub repositories and turn them into reviewed, published articles")]
struct Args {
    /// Base URL of a running API, for the client commands
    #[arg(long, global = true)]
    api: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and the article workers
    Serve {
        /// Address to listen on (overrides REPOPRESS_BIND)
        #[arg(long)]
        bind: Option<String>,

        /// Database path (overrides DATABASE_PATH)
        #[arg(long)]
        database: Option<String>,
    },

    /// Run a pull against a running server
    Pull {
        #[arg(short, long, default_value = "ai")]
        keyword: String,

        #[arg(short, long, default_value = "10")]
        limit: u32,

        /// stars, forks, updated, help-wanted-issues or best_match
        #[arg(long, default_value = "stars")]
        sort: String,

        /// Use generated repositories instead of GitHub
        #[arg(long)]
        simulate: bool,
    },

    /// List article tasks
    Tasks,

    /// Follow an article task until it finishes
    Watch {
        task_id: String,

        #[arg(long, default_value = "2")]
        interval_secs: u64,

        #[arg(long, default_value = "150")]
        max_polls: u32,
    },

    /// Show repository statistics
    Stats,

    /// Regenerate repository descriptions from cached READMEs
    Reanalyze,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("repopress=info".parse()?)
                .add_directive("reqwest=warn".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();

    match args.command {
        Command::Serve { bind, database } => {
            let mut config = Config::from_env()?;
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            if let Some(database) = database {
                config.database_path = database;
            }
            let bind_address = config.bind_address.clone();

            let pipeline = Pipeline::from_config(config)?;
            pipeline.start()?;
            if pipeline.config().scheduler_enabled {
                pipeline.spawn_scheduler();
            }
            server::serve(&bind_address, pipeline).await?;
        }
        command => {
            let mut client_config = ClientConfig::from_env();
            if let Some(api) = args.api {
                client_config.base_url = api;
            }
            let client = ApiClient::new(&client_config)?;
            run_client(&client, command).await?;
        }
    }

    Ok(())
}

async fn run_client(client: &ApiClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Pull {
            keyword,
            limit,
            sort,
            simulate,
        } => {
            let sort: SortKey = serde_json::from_value(serde_json::Value::String(sort.clone()))
                .map_err(|_| anyhow::anyhow!("unknown sort key: {}", sort))?;
            let result = client
                .pull_run(&PullRunRequest {
                    keyword,
                    limit,
                    sort,
                    simulate,
                    task_id: None,
                })
                .await?;
            println!(
                "Pulled {} repositories ({}, sorted by {})",
                result.count,
                result.status,
                result.sort.as_str()
            );
            for repo in &result.repos {
                println!("  {:>7} ★  {}", repo.stars, repo.full_name);
            }
        }
        Command::Tasks => {
            let tasks = client.tasks().await?;
            if tasks.is_empty() {
                println!("No tasks");
            }
            for task in &tasks {
                print_task(task);
            }
        }
        Command::Watch {
            task_id,
            interval_secs,
            max_polls,
        } => {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
            spinner.enable_steady_tick(Duration::from_millis(120));

            let log = client
                .poll_task_with(
                    &task_id,
                    Duration::from_secs(interval_secs),
                    max_polls,
                    |log| spinner.set_message(format!("{} {}", log.task_id, log.status.as_str())),
                )
                .await;
            spinner.finish_and_clear();
            print_log(&log?);
        }
        Command::Stats => {
            let stats = client.stats().await?;
            println!("Repositories: {}", stats.total_repos);
            println!("Stars:        {}", stats.total_stars);
            println!("Forks:        {}", stats.total_forks);
            if let Some(last_pull) = stats.last_pull {
                println!("Last pull:    {}", last_pull.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            if !stats.language_distribution.is_empty() {
                println!("\nLanguages:");
                for (language, count) in &stats.language_distribution {
                    println!("  {}: {}", language, count);
                }
            }
        }
        Command::Reanalyze => {
            let result = client.reanalyze_all().await?;
            println!("Re-analyzed {} repositories", result.count);
            for name in &result.repos {
                println!("  {}", name);
            }
        }
        Command::Serve { .. } => {}
    }
    Ok(())
}

fn print_task(task: &ArticleTask) {
    println!(
        "{}  {:<9}  {:<9}  {}",
        task.task_id,
        task.status.as_str(),
        task.review.as_str(),
        task.repo_name.as_deref().unwrap_or("-")
    );
}

fn print_log(log: &TaskLog) {
    println!("Task {} is {}", log.task_id, log.status.as_str());
    if !log.log.is_empty() {
        println!("\n{}", log.log.trim_end());
    }
}
