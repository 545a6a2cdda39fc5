#![allow(unused)]
use clickro::{Client, FromRow, FromValue, Result};

#[derive(FromRow)]
struct Clickro {
    id: u32,
    #[sql("name")]
    label: String,
    #[sql(skip)]
    cached: Option<String>,
}

#[derive(FromRow)]
struct ClickroTuple(u32, String);

#[derive(FromValue)]
struct UserId(u32);

#[derive(FromRow)]
struct Wrapped {
    id: UserId,
}

pub async fn main() -> Result<()> {
    let client = Client::from_env()?;

    client.command("DROP TABLE IF EXISTS clickro_from_row").await?;
    client
        .command("CREATE TABLE clickro_from_row(id UInt32, name String) ENGINE = Memory")
        .await?;
    client
        .command("INSERT INTO clickro_from_row VALUES (1, 'Deez'), (2, 'Foo')")
        .await?;

    let datas = client
        .query("SELECT * FROM clickro_from_row ORDER BY id")
        .fetch_as::<Clickro>()
        .fetch_all()
        .await?;

    assert_eq!(datas[0].label.as_str(), "Deez");
    assert!(datas[0].cached.is_none());

    let datas = client
        .query("SELECT * FROM clickro_from_row ORDER BY id")
        .fetch_as::<ClickroTuple>()
        .fetch_all()
        .await?;

    assert_eq!(datas[1].1.as_str(), "Foo");

    let wrapped = client
        .query("SELECT id FROM clickro_from_row ORDER BY id")
        .fetch_as::<Wrapped>()
        .fetch_one()
        .await?;

    assert_eq!(wrapped.id.0, 1);

    let result = client.query("SELECT * FROM clickro_from_row").await?;
    let decoded = result.decode::<Clickro>()?;
    assert_eq!(decoded.len(), 2);

    client.command("DROP TABLE clickro_from_row").await?;

    Ok(())
}
