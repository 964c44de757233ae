use clap::{Parser, Subcommand};
use data_loader::runner::{
    DATASET_FILE_PATH, DATASET_URL, DB_MAX_CONN, DEFAULT_TABLE, DatabaseSettingsBuilder, Driver,
    ENV_FILE, FailurePolicy, Format, JOB_CHANNEL_CAPACITY, LoadArgs, LoadResult, MAX_RECORDS,
    NUM_WORKERS, load_env_file, run_load,
};
use std::path::Path;

#[derive(Parser, Clone)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Load the dataset into the destination table
    Load(LoadCommand),
}

#[derive(Clone, clap::Args)]
struct LoadCommand {
    /// URL to download the dataset from when it is not present locally
    #[arg(long, default_value = DATASET_URL)]
    dataset_url: String,

    /// Local path (or file:// URI) of the dataset
    #[arg(long, default_value = DATASET_FILE_PATH)]
    dataset_path: String,

    /// File format (csv, tsv) - auto-detected from extension if not specified
    #[arg(short, long)]
    format: Option<String>,

    /// Database driver (postgres, mysql)
    #[arg(short, long, default_value = "postgres")]
    driver: String,

    /// Target table name
    #[arg(short, long, default_value = DEFAULT_TABLE)]
    table: String,

    /// Number of concurrent workers; must be lower than --max-connections
    #[arg(short, long, default_value_t = NUM_WORKERS)]
    workers: usize,

    /// Maximum number of pooled database connections
    #[arg(long, default_value_t = DB_MAX_CONN)]
    max_connections: u32,

    /// Maximum number of data records to load (0 loads everything)
    #[arg(long, default_value_t = MAX_RECORDS)]
    max_records: u64,

    /// Row count the progress percentage is measured against (defaults to --max-records)
    #[arg(long)]
    expected_rows: Option<u64>,

    /// Capacity of the job channel between the reader and the workers
    #[arg(long, default_value_t = JOB_CHANNEL_CAPACITY)]
    channel_capacity: usize,

    /// What to do when a row fails (abort, continue)
    #[arg(long, default_value = "abort")]
    on_error: String,

    /// Do not create the destination table
    #[arg(long)]
    skip_bootstrap: bool,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long)]
    quiet: bool,

    /// Database host
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    db_host: String,

    /// Database port (defaults to the driver's standard port)
    #[arg(long, env = "DB_PORT")]
    db_port: Option<u16>,

    /// Database user
    #[arg(long, env = "DB_USER")]
    db_user: String,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", default_value = "", hide_env_values = true)]
    db_password: String,

    /// Database name
    #[arg(long, env = "DB_NAME")]
    db_name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // DB_* settings may come from a .env file; the real environment takes precedence
    load_env_file(Path::new(ENV_FILE))?;
    let args = Args::parse();

    match args.command {
        Command::Load(load) => run_loader(load).await?,
    }
    Ok(())
}

async fn run_loader(cmd: LoadCommand) -> anyhow::Result<()> {
    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if cmd.quiet {
        EnvFilter::new("data_loader=warn,sqlx=off")
    } else {
        EnvFilter::new("data_loader=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let driver = Driver::parse(&cmd.driver)?;
    let format = cmd.format.as_deref().map(Format::parse).transpose()?;
    let failure_policy = FailurePolicy::parse(&cmd.on_error)?;

    let mut database = DatabaseSettingsBuilder::default();
    database
        .driver(driver)
        .host(cmd.db_host)
        .username(cmd.db_user)
        .password(cmd.db_password)
        .database(cmd.db_name);
    if let Some(port) = cmd.db_port {
        database.port(port);
    }
    let database = database.build()?;

    if !cmd.quiet {
        println!("Data Loader");
        println!("===========");
        println!("Database: {}", database.display_url());
        println!("Dataset: {}", cmd.dataset_path);
        println!("Table: {}", cmd.table);
        println!("Workers: {}", cmd.workers);
        println!();
    }

    let load_args = LoadArgs {
        database,
        max_connections: cmd.max_connections,
        dataset_url: Some(cmd.dataset_url),
        dataset_path: cmd.dataset_path,
        format,
        target_table: cmd.table,
        worker_count: cmd.workers,
        channel_capacity: cmd.channel_capacity,
        max_records: (cmd.max_records > 0).then_some(cmd.max_records),
        expected_rows: cmd.expected_rows,
        failure_policy,
        skip_bootstrap: cmd.skip_bootstrap,
        quiet: cmd.quiet,
    };

    // Run the load
    let result = run_load(load_args).await?;

    println!();
    println!("Done in {} seconds", result.duration.as_secs_f64().ceil() as u64);
    print_summary(&result);

    Ok(())
}

fn print_summary(result: &LoadResult) {
    println!();
    println!("Load Summary");
    println!("============");
    println!("Job ID: {}", result.job_id);
    println!("Columns: {}", result.columns.join(", "));
    println!("Records read: {}", result.records_read);
    println!("Records loaded: {}", result.records_loaded);
    println!("Records failed: {}", result.records_failed);
    println!("Progress: {:.2}%", result.progress_percentage);
    println!("Duration: {:.2}s", result.duration.as_secs_f64());
    println!(
        "Throughput: {:.2} records/sec",
        result.records_loaded as f64 / result.duration.as_secs_f64()
    );
    if let (Some(p50), Some(p90), Some(p99)) = result.insert_latency_ms {
        println!("Insert latency: p50: {}ms, p90: {}ms, p99: {}ms", p50, p90, p99);
    }
    println!(
        "Connections: {} open, {} idle",
        result.pool_stats.connections, result.pool_stats.idle_connections
    );
    if result.capped {
        println!("Stopped at the record limit; pass --max-records 0 to load everything");
    }

    if !result.failures.is_empty() {
        println!();
        println!("Rejected rows:");
        for failure in &result.failures {
            println!("  {}", failure);
        }
    }
}
