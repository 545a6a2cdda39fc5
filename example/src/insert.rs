use clickro::{Client, Result, Value};

pub async fn main() -> Result<()> {
    let client = Client::from_env()?;

    client.command("DROP TABLE IF EXISTS clickro_insert").await?;
    client
        .command(
            "CREATE TABLE clickro_insert(\
                id UInt32, \
                name String, \
                tags Array(String), \
                note Nullable(String), \
                name_len UInt64 MATERIALIZED length(name)\
            ) ENGINE = Memory",
        )
        .await?;

    // row oriented, column types from `DESCRIBE TABLE`
    let summary = client
        .insert("clickro_insert")
        .columns(["id", "name", "tags", "note"])
        .row([
            Value::from(1u32),
            Value::from("Alice"),
            Value::from(vec!["a", "b"]),
            Value::Null,
        ])
        .row([
            Value::from(2u32),
            Value::from("Bob"),
            Value::from(Vec::<String>::new()),
            Value::from("hello"),
        ])
        .await?;

    tracing::info!(written = summary.written_rows(), "inserted");

    // column oriented, explicit types
    client
        .insert("clickro_insert")
        .columns(["id", "name"])
        .column_types(["UInt32", "String"])
        .column_data([
            vec![Value::from(3u32), Value::from(4u32)],
            vec![Value::from("Carol"), Value::from("Dave")],
        ])
        .await?;

    let result = client
        .query("SELECT id, name, name_len FROM clickro_insert ORDER BY id")
        .await?;

    assert_eq!(result.row_count(), 4);
    assert_eq!(result.result_rows()[0][2], Value::UInt64(5));

    // conversion error, nothing reaches the server
    client
        .insert("clickro_insert")
        .columns(["id"])
        .row([Value::from("not a number")])
        .await
        .unwrap_err();

    let count: u64 = client
        .query("SELECT count() FROM clickro_insert")
        .fetch_as::<(u64,)>()
        .fetch_one()
        .await?
        .0;

    assert_eq!(count, 4);

    client.command("DROP TABLE clickro_insert").await?;

    Ok(())
}
