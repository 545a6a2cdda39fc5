use futures::StreamExt;
use clickro::{Client, Orientation, Result, Value};

pub async fn main() -> Result<()> {
    let client = Client::from_env()?;

    // Command

    client.command("DROP TABLE IF EXISTS clickro_query").await?;
    client
        .command("CREATE TABLE clickro_query(id UInt32, name String) ENGINE = Memory")
        .await?;

    client
        .command("INSERT INTO clickro_query VALUES (%s, %s)")
        .bind(1u32)
        .bind("Deez")
        .await?;

    client.command("INSERT INTO clickro_query VALUES (2, 'Foo')").await?;

    // Queries

    let datas = client
        .query("SELECT * FROM clickro_query ORDER BY id")
        .fetch_as::<(u32, String)>()
        .fetch_all()
        .await?;

    assert_eq!(datas.len(), 2);

    let (_id, name) = client
        .query("SELECT * FROM clickro_query ORDER BY id LIMIT 1")
        .fetch_as::<(u32, String)>()
        .fetch_one()
        .await?;

    assert_eq!(name.as_str(), "Deez");
    assert_eq!(name, datas[0].1);

    let data = client
        .query("SELECT * FROM clickro_query WHERE id = {id:UInt32}")
        .bind_named("id", 2u32)
        .fetch_as::<(u32, String)>()
        .fetch_optional()
        .await?;

    assert!(data.is_some());

    let data = client
        .query("SELECT * FROM clickro_query LIMIT 0")
        .fetch_as::<(u32, String)>()
        .fetch_optional()
        .await?;

    assert!(data.is_none());

    let mut stream = client
        .query("SELECT * FROM clickro_query")
        .fetch_as::<(u32, String)>()
        .fetch();

    while let Some(row) = stream.next().await {
        let (_id, _name) = row?;
    }

    let datas = client
        .query("SELECT * FROM clickro_query ORDER BY id")
        .fetch_all()
        .await?;

    assert_eq!(
        datas[0].try_get::<_, String>("name").unwrap().as_str(),
        "Deez"
    );

    // Whole result

    let result = client
        .query("SELECT * FROM clickro_query ORDER BY id")
        .orientation(Orientation::Columns)
        .await?;

    assert_eq!(result.column_names(), ["id", "name"]);
    assert_eq!(result.result_set()[0], [Value::UInt32(1), Value::UInt32(2)]);
    assert_eq!(result.first_item(), Some(Value::UInt32(1)));

    // Error case

    client.query("").await.unwrap_err();
    client.query("SELECT foo").await.unwrap_err();

    let _err = client
        .query("SELECT * FROM clickro_query LIMIT 0")
        .fetch_as::<(u32, String)>()
        .fetch_one()
        .await
        .unwrap_err();

    client.command("DROP TABLE clickro_query").await?;

    Ok(())
}
