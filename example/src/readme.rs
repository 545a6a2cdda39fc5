use clickro::{Client, FromRow, Result, Table};
use tracing::{Instrument, trace_span};

// automatically extract query result
#[derive(Debug, FromRow, Table)]
struct Post {
    #[allow(unused)]
    id: u32,
    name: String,
}

pub async fn main() -> Result<()> {
    // will read the `CLICKHOUSE_*` environment variables
    let client = Client::from_env()?;
    let mut handles = vec![];

    client.command("DROP TABLE IF EXISTS post").await?;

    // execute a statement
    client
        .command("CREATE TABLE post(id UInt32, name String) ENGINE = MergeTree ORDER BY id")
        .await?;

    for id in 0..24 {
        // cloning client is cheap and share the same transport
        let client = client.clone();

        handles.push(tokio::spawn(async move {
            client
                .insert_rows([Post { id, name: format!("thread{id}") }])
                .await
        }.instrument(trace_span!("thread",id))));
    }

    for h in handles {
        h.await.unwrap()?;
    }

    // extract query result
    let posts = client
        .query("SELECT * FROM post")
        .fetch_as::<Post>()
        .fetch_all()
        .await?;

    assert!(posts.iter().any(|e| e.name.as_str() == "thread23"));
    assert_eq!(posts.len(), 24);

    Ok(())
}
