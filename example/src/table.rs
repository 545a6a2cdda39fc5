#![allow(dead_code)]
use clickro::{Client, Result, Table};

#[derive(Table)]
struct Clickro {
    id: u32,
    #[sql("display_name")]
    name: String,
    #[sql(skip)]
    scratch: Vec<u8>,
    content: String,
}

#[derive(Table)]
#[sql("foo_bar")]
struct ClickroNew {}

pub async fn main() -> Result<()> {
    assert_eq!(Clickro::TABLE, "clickro");
    assert_eq!(Clickro::COLUMNS, ["id", "display_name", "content"]);
    assert_eq!(ClickroNew::TABLE, "foo_bar");
    assert!(ClickroNew::COLUMNS.is_empty());

    let client = Client::from_env()?;

    client.command("DROP TABLE IF EXISTS clickro").await?;
    client
        .command("CREATE TABLE clickro(id UInt32, display_name String, content String) ENGINE = Memory")
        .await?;

    let rows = (0..3).map(|id| Clickro {
        id,
        name: format!("name{id}"),
        scratch: vec![],
        content: String::from("lorem"),
    });

    let summary = client.insert_rows(rows).await?;
    tracing::info!(written = summary.written_rows(), "table rows");

    let names = client
        .query("SELECT display_name FROM clickro ORDER BY id")
        .fetch_as::<(String,)>()
        .fetch_all()
        .await?;

    assert_eq!(names[2].0.as_str(), "name2");

    client.command("DROP TABLE clickro").await?;

    Ok(())
}
