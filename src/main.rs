use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::{Builder, Env};
use log::{debug, info, LevelFilter};
use sysinfo::{get_current_pid, ProcessExt, System, SystemExt};

use health_context::config::AppConfig;
use health_context::dataset::{self, Dataset};
use health_context::records::{AGE_CATEGORY, SMOKER_STATUS};
use health_context::{Advisor, AdvisorError, AdvisorResult, FilterCriteria, GroqClient};

#[derive(Parser, Debug)]
#[command(author, version, about = "Preventative health advice from patient records", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[arg(short, long, global = true, help = "Dataset path (.csv, .parquet or .xlsx)")]
    data: Option<PathBuf>,
    #[arg(long, global = true, help = "Parquet cache written on first load and reused afterwards")]
    cache: Option<PathBuf>,
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Verbose level")]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the values that can be used as filters
    Options,
    /// Print the statistical context for a set of filters
    Context {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Ask the completion service for preventative health advice
    Advise {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, help = "Model name, overrides HEALTH_MODEL")]
        model: Option<String>,
        #[arg(long, help = "Print the prompt before the advice")]
        show_prompt: bool,
    },
    /// Convert the dataset to parquet
    Cache {
        #[arg(short, long, help = "Output path")]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct FilterArgs {
    #[arg(short, long, help = "Age category, e.g. 45-54")]
    age: String,
    #[arg(short, long, help = "Smoker status, e.g. \"Current Smoker\"")]
    smoker: String,
    #[arg(short, long = "condition", help = "Required condition column, repeatable")]
    conditions: Vec<String>,
}

impl FilterArgs {
    fn criteria(&self, dataset: &Dataset) -> FilterCriteria {
        self.conditions
            .iter()
            .fold(FilterCriteria::new(&self.age, &self.smoker), |c, name| {
                c.with_condition(name, true)
            })
            .with_unchecked_defaults(dataset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn resident_memory_kib() -> Option<u64> {
    let pid = get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_process(pid);
    sys.process(pid).map(|p| p.memory() / 1024)
}

fn load_dataset(config: &AppConfig) -> AdvisorResult<Dataset> {
    let start_time = Instant::now();
    let dataset = match &config.cache_path {
        Some(cache) => dataset::load_cached(&config.data_path, cache)?,
        None => dataset::load(&config.data_path)?,
    };
    debug!(
        "dataset ready in {:?}, resident memory {:?} KiB",
        start_time.elapsed(),
        resident_memory_kib()
    );
    Ok(dataset)
}

fn print_options(dataset: &Dataset) -> AdvisorResult<()> {
    println!("{}: {}", AGE_CATEGORY, dataset.distinct_values(AGE_CATEGORY)?.join(", "));
    println!("{}: {}", SMOKER_STATUS, dataset.distinct_values(SMOKER_STATUS)?.join(", "));
    println!("conditions: {}", dataset.condition_columns().join(", "));
    Ok(())
}

async fn run(cli: Cli) -> AdvisorResult<()> {
    let mut config = AppConfig::from_env();
    if let Some(data) = cli.data {
        config.data_path = data;
    }
    if cli.cache.is_some() {
        config.cache_path = cli.cache;
    }

    let dataset = load_dataset(&config)?;

    match cli.command {
        Command::Options => print_options(&dataset)?,
        Command::Context { filters, format } => {
            let summary = health_context::build_context_for(&dataset, &filters.criteria(&dataset))?;
            info!("{} matching patients", summary.matched_rows());
            match format {
                OutputFormat::Text => println!("{}", summary),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            }
        }
        Command::Advise {
            filters,
            model,
            show_prompt,
        } => {
            if let Some(model) = model {
                config.completion.model = model;
            }
            let client = GroqClient::new(&config.completion)?;
            let criteria = filters.criteria(&dataset);
            let advisor = Advisor::new(dataset, client);
            let advice = advisor.preventative_health_advice(&criteria).await?;
            if show_prompt {
                println!("{}\n", advice.prompt);
            }
            println!("Health Advice:\n{}", advice.text);
        }
        Command::Cache { output } => dataset.write_parquet(&output)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AdvisorError> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let env = Env::new().filter("HLOG");
    Builder::new()
        .filter(Some("health_context"), log_level)
        .parse_env(env)
        .init();

    debug!("Arguments {:#?}", cli);

    run(cli).await
}
