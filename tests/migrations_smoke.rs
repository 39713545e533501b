use sqlx::Row;

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();

    std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
}

#[tokio::test]
async fn migrations_apply_and_tables_exist() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping migrations smoke test");
        return Ok(());
    };

    let pool =
        sqlx::postgres::PgPoolOptions::new().max_connections(1).connect(&database_url).await?;

    let migrations_dir =
        std::env::var("ACADEMIA_MIGRATIONS_DIR").unwrap_or_else(|_| "migrations".to_string());
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(&migrations_dir)).await?;
    migrator.run(&pool).await?;

    let tables = ["exams", "questions", "exam_questions", "exam_attempts", "exam_answers"];

    for table in tables {
        let row = sqlx::query("SELECT to_regclass($1)::text").bind(table).fetch_one(&pool).await?;
        let regclass: Option<String> = row.try_get(0)?;
        assert!(regclass.is_some(), "expected table {table} to exist after migrations");
    }

    let row = sqlx::query(
        "SELECT COUNT(*) FROM pg_constraint
         WHERE conrelid = 'exam_attempts'::regclass AND contype = 'u'",
    )
    .fetch_one(&pool)
    .await?;
    let unique_constraints: i64 = row.try_get(0)?;
    assert!(unique_constraints >= 1, "attempt numbering must be unique per exam and student");

    Ok(())
}
