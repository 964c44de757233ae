//! Integration tests for the pipeline and runner
//!
//! These tests use SQLite in-memory databases and real CSV files to test
//! end to end scenarios of the loader.

#[cfg(test)]
mod tests {
    use crate::{
        coordination::{Pipeline, PipelineConfigBuilder, failure::FailureKind},
        db::{Pool, WriteTarget},
        formats::{Format, open_row_source},
        io::dataset::tests::serve_once,
        runner::{DatabaseSettingsBuilder, Driver, FailurePolicy, LoadArgs, run_load},
    };
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::fs::File;
    use tokio::io::AsyncWriteExt;

    const MAJESTIC_HEADER: &str = "GlobalRank,TldRank,Domain,TLD,RefSubNets,RefIPs,IDN_Domain,IDN_TLD,PrevGlobalRank,PrevTldRank,PrevRefSubNets,PrevRefIPs\n";

    // ============ Test Helpers ============

    fn majestic_csv_content(num_rows: usize) -> String {
        let mut content = MAJESTIC_HEADER.to_string();
        for i in 1..=num_rows {
            content.push_str(&format!(
                "{},{},site{}.com,com,{},{},site{}.com,com,{},{},{},{}\n",
                i,
                i,
                i,
                1000 - i,
                2000 - i,
                i,
                i,
                i,
                1000 - i,
                2000 - i
            ));
        }
        content
    }

    /// Helper to create a Majestic Million shaped CSV file
    async fn create_majestic_csv(dir: &TempDir, filename: &str, num_rows: usize) -> String {
        create_csv_with_content(dir, filename, &[&majestic_csv_content(num_rows)]).await
    }

    /// Helper to create a test CSV file with custom content (rows include header)
    async fn create_csv_with_content(dir: &TempDir, filename: &str, content: &[&str]) -> String {
        let path = dir.path().join(filename);
        let mut file = File::create(&path).await.unwrap();
        for line in content {
            file.write_all(line.as_bytes()).await.unwrap();
        }
        file.flush().await.unwrap();
        path.to_str().unwrap().to_string()
    }

    /// Helper to create a SQLite pool and table
    async fn setup_sqlite_table(table_name: &str, columns: &str) -> Pool {
        let pool = Pool::sqlite_in_memory().await.unwrap();
        pool.execute_query(&format!("CREATE TABLE {} ({})", table_name, columns))
            .await
            .unwrap();
        pool
    }

    /// Helper to query table row count
    async fn get_table_count(pool: &Pool, table_name: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {}", table_name);
        let (count,): (i64,) = sqlx::query_as(&sql)
            .fetch_one(pool.sqlite())
            .await
            .unwrap();
        count
    }

    /// Load arguments with small defaults, pointed at a test pool
    fn load_args(pool: Pool, dataset_path: &str) -> LoadArgs {
        LoadArgs {
            database: DatabaseSettingsBuilder::default()
                .driver(Driver::Postgres)
                .host("localhost")
                .username("test")
                .database("test")
                .build()
                .unwrap(),
            max_connections: 10,
            dataset_url: None,
            dataset_path: dataset_path.to_string(),
            format: None,
            target_table: "domain".to_string(),
            worker_count: 4,
            channel_capacity: 1,
            max_records: None,
            expected_rows: None,
            failure_policy: FailurePolicy::Abort,
            skip_bootstrap: false,
            quiet: true,
            test_pool: Some(pool),
        }
    }

    // ============ Tests ============

    #[tokio::test]
    async fn test_majestic_load_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_majestic_csv(&temp_dir, "majestic_million.csv", 25).await;
        let pool = Pool::sqlite_in_memory().await.unwrap();

        let mut args = load_args(pool.clone(), &csv_path);
        args.expected_rows = Some(25);
        let result = run_load(args).await.unwrap();

        assert_eq!(result.records_read, 25);
        assert_eq!(result.columns.len(), 12);
        assert_eq!(result.columns[0], "GlobalRank");
        assert_eq!(result.records_loaded, 25);
        assert_eq!(result.records_failed, 0);
        assert_eq!(format!("{:.2}", result.progress_percentage), "100.00");
        assert!(result.insert_latency_ms.0.is_some());
        assert_eq!(get_table_count(&pool, "domain").await, 25);

        let (domain, tld): (String, String) =
            sqlx::query_as("SELECT Domain, TLD FROM domain WHERE GlobalRank = 7")
                .fetch_one(pool.sqlite())
                .await
                .unwrap();
        assert_eq!(domain, "site7.com");
        assert_eq!(tld, "com");
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_majestic_csv(&temp_dir, "majestic_million.csv", 5).await;
        let pool = Pool::sqlite_in_memory().await.unwrap();

        run_load(load_args(pool.clone(), &csv_path)).await.unwrap();
        run_load(load_args(pool.clone(), &csv_path)).await.unwrap();

        assert_eq!(get_table_count(&pool, "domain").await, 10);
    }

    #[tokio::test]
    async fn test_max_records_caps_load() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_majestic_csv(&temp_dir, "majestic_million.csv", 50).await;
        let pool = Pool::sqlite_in_memory().await.unwrap();

        let mut args = load_args(pool.clone(), &csv_path);
        args.max_records = Some(20);
        let result = run_load(args).await.unwrap();

        assert!(result.capped);
        assert_eq!(result.records_loaded, 20);
        assert_eq!(result.progress_percentage, 100.0);
        assert_eq!(get_table_count(&pool, "domain").await, 20);
    }

    #[tokio::test]
    async fn test_worker_count_must_stay_below_connections() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_majestic_csv(&temp_dir, "majestic_million.csv", 1).await;
        let pool = Pool::sqlite_in_memory().await.unwrap();

        let mut args = load_args(pool.clone(), &csv_path);
        args.worker_count = 10;
        args.max_connections = 10;
        let err = run_load(args).await.unwrap_err();

        assert!(err.to_string().contains("Worker count"));
    }

    #[tokio::test]
    async fn test_missing_dataset_without_url() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent.csv");
        let pool = Pool::sqlite_in_memory().await.unwrap();

        let err = run_load(load_args(pool, missing.to_str().unwrap()))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Dataset not found"));
    }

    #[tokio::test]
    async fn test_downloads_missing_dataset() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("majestic_million.csv");
        let body: &'static str = Box::leak(majestic_csv_content(3).into_boxed_str());
        let url = serve_once("200 OK", body).await;
        let pool = Pool::sqlite_in_memory().await.unwrap();

        let mut args = load_args(pool.clone(), path.to_str().unwrap());
        args.dataset_url = Some(url.to_string());
        let result = run_load(args).await.unwrap();

        assert_eq!(result.records_loaded, 3);
        assert!(path.is_file());
        assert_eq!(get_table_count(&pool, "domain").await, 3);
    }

    #[tokio::test]
    async fn test_pipeline_binds_fields_in_column_order() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_csv_with_content(&temp_dir, "pairs.csv", &["a,b\n", "1,2\n", "3,4\n"]).await;
        let pool = setup_sqlite_table("pairs", "a TEXT, b TEXT").await;

        let config = PipelineConfigBuilder::default()
            .table("pairs")
            .worker_count(2)
            .quiet(true)
            .build()
            .unwrap();
        let target: Arc<dyn WriteTarget> = Arc::new(pool.clone());
        let source = open_row_source(Path::new(&csv_path), Format::Csv)
            .await
            .unwrap();

        let result = Pipeline::new(config, target).run(source).await.unwrap();

        assert_eq!(result.headers, vec!["a", "b"]);
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT a, b FROM pairs ORDER BY a")
            .fetch_all(pool.sqlite())
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![
                ("1".to_string(), "2".to_string()),
                ("3".to_string(), "4".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_header_only_file() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_csv_with_content(&temp_dir, "empty.csv", &[MAJESTIC_HEADER]).await;
        let pool = Pool::sqlite_in_memory().await.unwrap();

        let result = run_load(load_args(pool.clone(), &csv_path)).await.unwrap();

        assert_eq!(result.records_read, 0);
        assert_eq!(result.records_loaded, 0);
        assert_eq!(get_table_count(&pool, "domain").await, 0);
    }

    #[tokio::test]
    async fn test_empty_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_csv_with_content(&temp_dir, "empty.csv", &[]).await;
        let pool = Pool::sqlite_in_memory().await.unwrap();

        assert!(run_load(load_args(pool, &csv_path)).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_insert_aborts_load() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_csv_with_content(
            &temp_dir,
            "dupes.csv",
            &["id,name\n", "1,a\n", "2,b\n", "2,c\n", "3,d\n"],
        )
        .await;
        let pool = setup_sqlite_table("items", "id TEXT PRIMARY KEY, name TEXT").await;

        let mut args = load_args(pool.clone(), &csv_path);
        args.target_table = "items".to_string();
        args.skip_bootstrap = true;
        args.worker_count = 1;
        let err = run_load(args).await.unwrap_err();

        assert!(format!("{:#}", err).contains("row 4"));
        assert_eq!(get_table_count(&pool, "items").await, 2);
    }

    #[tokio::test]
    async fn test_continue_policy_reports_failures() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_csv_with_content(
            &temp_dir,
            "dupes.csv",
            &["id,name\n", "1,a\n", "2,b\n", "2,c\n", "3\n", "4,e\n"],
        )
        .await;
        let pool = setup_sqlite_table("items", "id TEXT PRIMARY KEY, name TEXT").await;

        let mut args = load_args(pool.clone(), &csv_path);
        args.target_table = "items".to_string();
        args.skip_bootstrap = true;
        args.worker_count = 1;
        args.failure_policy = FailurePolicy::Continue;
        let result = run_load(args).await.unwrap();

        assert_eq!(result.records_loaded, 3);
        assert_eq!(result.records_failed, 2);
        let failures: Vec<(u64, FailureKind)> = result
            .failures
            .iter()
            .map(|f| (f.row_index, f.kind))
            .collect();
        assert_eq!(
            failures,
            vec![
                (4, FailureKind::InsertFailed),
                (5, FailureKind::FieldCountMismatch)
            ]
        );
        assert_eq!(get_table_count(&pool, "items").await, 3);
    }

    #[tokio::test]
    async fn test_tsv_detected_from_extension() {
        let temp_dir = TempDir::new().unwrap();
        let tsv_path = create_csv_with_content(
            &temp_dir,
            "pairs.tsv",
            &["a\tb\n", "x,1\ty\n", "z\tw\n"],
        )
        .await;
        let pool = setup_sqlite_table("pairs", "a TEXT, b TEXT").await;

        let mut args = load_args(pool.clone(), &tsv_path);
        args.target_table = "pairs".to_string();
        args.skip_bootstrap = true;
        let result = run_load(args).await.unwrap();

        assert_eq!(result.records_loaded, 2);
        let (b,): (String,) = sqlx::query_as("SELECT b FROM pairs WHERE a = 'x,1'")
            .fetch_one(pool.sqlite())
            .await
            .unwrap();
        assert_eq!(b, "y");
    }

    #[tokio::test]
    async fn test_many_workers_load_every_row_once() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = create_majestic_csv(&temp_dir, "majestic_million.csv", 300).await;
        let pool = Pool::sqlite_in_memory().await.unwrap();

        let mut args = load_args(pool.clone(), &csv_path);
        args.worker_count = 8;
        let result = run_load(args).await.unwrap();

        assert_eq!(result.records_loaded, 300);
        let (distinct,): (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT GlobalRank) FROM domain")
                .fetch_one(pool.sqlite())
                .await
                .unwrap();
        assert_eq!(distinct, 300);
    }
}
