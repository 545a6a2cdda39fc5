use clickro::{Client, FromValue, Result, Value, types::Json};
use serde::{Deserialize, Serialize};
use time::{Date, PrimitiveDateTime, UtcDateTime};

#[derive(FromValue)]
struct MyId(u32);

#[derive(FromValue)]
struct SomeId<T>(T);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Foo {
    id: i32,
}

pub async fn main() -> Result<()> {
    let client = Client::from_env()?;

    let (null,): (Option<String>,) = client
        .query("SELECT CAST(NULL, 'Nullable(String)')")
        .fetch_as()
        .fetch_one()
        .await?;

    assert!(null.is_none());

    // placeholder value instead of null
    let (empty,): (String,) = client
        .query("SELECT CAST(NULL, 'Nullable(String)')")
        .use_none(false)
        .fetch_as()
        .fetch_one()
        .await?;

    assert!(empty.is_empty());

    let (my_id,): (MyId,) = client.query("SELECT 420").fetch_as().fetch_one().await?;

    assert_eq!(my_id.0, 420);

    let (some_id,): (SomeId<i32>,) = client.query("SELECT 420").fetch_as().fetch_one().await?;

    assert_eq!(some_id.0, 420);

    // `time`

    let now_utc = UtcDateTime::now().replace_nanosecond(0).unwrap();
    let (local, utc, today): (PrimitiveDateTime, UtcDateTime, Date) = client
        .query("SELECT now('UTC'), now(), today()")
        .fetch_as()
        .fetch_one()
        .await?;

    assert_eq!(
        (local.month(), local.minute()),
        (now_utc.month(), now_utc.minute()),
    );
    assert!(utc >= now_utc);
    assert_eq!(today.year(), now_utc.year());

    let (echo,): (UtcDateTime,) = client
        .query("SELECT {at:DateTime('UTC')}")
        .bind_named("at", Value::from(now_utc))
        .fetch_as()
        .fetch_one()
        .await?;

    assert_eq!(echo, now_utc);

    // `json`

    let (Json(json),): (Json<Foo>,) = client
        .query("SELECT '{\"id\":420}'")
        .fetch_as()
        .fetch_one()
        .await?;

    assert_eq!(json, Foo { id: 420 });

    let (Json(json),): (Json<Foo>,) = client
        .query("SELECT %s")
        .bind(Json(Foo { id: 69 }))
        .fetch_as()
        .fetch_one()
        .await?;

    assert_eq!(json, Foo { id: 69 });

    Ok(())
}
