use clickro::{Client, DecodeError, ErrorKind, FromRow, Result, Row};
use tracing::{Instrument, trace_span};

pub async fn main() -> Result<()> {
    let client = Client::from_env()?;

    let handles = (0..48).map(|i| {
        let client = client.clone();
        tokio::spawn(async move {
            if i % 6 == 0 {
                client.query("SELECT foo").await?;
            } else {
                client.query("SELECT 1").fetch_as::<FailRow>().fetch_all().await?;
            }
            Ok::<_, clickro::Error>(())
        }.instrument(trace_span!("error")))
    });

    for h in handles {
        let err = h.await.unwrap().unwrap_err();
        match err.kind() {
            ErrorKind::Server(server) => tracing::info!(code = server.code(), "server error"),
            ErrorKind::Decode(decode) => tracing::info!(%decode, "decode error"),
            _ => return Err(err),
        }
    }

    Ok(())
}

struct FailRow;

impl FromRow for FailRow {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Err(DecodeError::IndexOutOfBounds(69))
    }
}
