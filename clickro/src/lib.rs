//! ClickHouse Driver
//!
//! Speaks the ClickHouse HTTP interface with the columnar `Native` format,
//! optionally LZ4 compressed.
//!
//! # Examples
//!
//! Query:
//!
//! ```no_run
//! use clickro::Client;
//!
//! # async fn app() -> clickro::Result<()> {
//! let client = Client::from_env()?;
//!
//! let res = client
//!     .query("SELECT 420, {name:String}")
//!     .bind_named("name", "Foo")
//!     .fetch_as::<(u16, String)>()
//!     .fetch_one()
//!     .await?;
//!
//! assert_eq!(res.0, 420);
//! assert_eq!(res.1.as_str(), "Foo");
//! # Ok(())
//! # }
//! ```
//!
//! Insert:
//!
//! ```no_run
//! use clickro::{Client, Value};
//!
//! # async fn app() -> clickro::Result<()> {
//! let client = Client::from_env()?;
//!
//! client
//!     .command("CREATE TABLE IF NOT EXISTS foo(id UInt32, name String) ENGINE = Memory")
//!     .await?;
//!
//! client
//!     .insert("foo")
//!     .rows([
//!         vec![Value::from(1u32), Value::from("Alice")],
//!         vec![Value::from(2u32), Value::from("Bob")],
//!     ])
//!     .await?;
//!
//! let result = client.query("SELECT * FROM foo ORDER BY id").await?;
//!
//! assert_eq!(result.row_count(), 2);
//! assert_eq!(result.column_names(), ["id", "name"]);
//! # Ok(())
//! # }
//! ```

pub mod common;
mod ext;

// Protocol
pub mod native;
pub mod transport;
mod response;

// Encoding
mod value;
pub mod types;

// Component
pub mod config;
pub mod settings;
pub mod sql;
mod session;
mod context;
pub mod row;

// Operation
mod client;
pub mod fetch;
pub mod query;
pub mod insert;
mod result;

mod error;

pub use value::{Decimal, MAX_DECIMAL_PRECISION, Value};
pub use row::{DecodeError, FromRow, FromValue, Row, Table};
pub use types::Json;

pub use config::ClientConfig;
pub use settings::{SettingValue, Settings};
pub use sql::{BindError, Params, bind_client_side, bind_server_side, quote_identifier};
pub use context::{ColumnRename, Orientation, QueryContext};
pub use session::SessionBusyError;
pub use response::{QuerySummary, ServerError};

pub use client::Client;
pub use fetch::{BlockStream, RowStream};
pub use query::{Command, CommandResult, Query};
pub use insert::{Insert, InsertContext, Source};
pub use result::QueryResult;
pub use error::{Error, ErrorKind, Result};

#[cfg(feature = "macros")]
pub use clickro_macros::{FromRow, FromValue, Table};
