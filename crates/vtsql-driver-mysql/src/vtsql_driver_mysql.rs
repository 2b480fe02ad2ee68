//! MySQL-protocol driver implementation
//!
//! Versioned SQL servers such as Dolt speak the MySQL wire protocol, so the
//! session client reaches them through `mysql_async`.

mod connection;
mod driver;
mod tls;
mod transaction;
mod value;

pub use connection::MySqlConnection;
pub use driver::MySqlDriver;
pub use tls::{MysqlTlsConnector, MysqlTlsError, tls_mode_to_ssl_mode};
pub use transaction::MySqlTransaction;
