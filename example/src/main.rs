use tracing::{Instrument, trace_span};
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use clickro::Result;

mod readme;
mod connection;
mod query;
mod insert;
mod from_row;
mod table;
mod decode;
mod error;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::Registry::default()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    connection::main().instrument(trace_span!("connection")).await?;
    query::main().instrument(trace_span!("query")).await?;
    insert::main().instrument(trace_span!("insert")).await?;
    from_row::main().instrument(trace_span!("from_row")).await?;
    table::main().instrument(trace_span!("table")).await?;
    decode::main().instrument(trace_span!("decode")).await?;
    error::main().instrument(trace_span!("error")).await?;

    readme::main().instrument(trace_span!("readme")).await?;

    Ok(())
}
