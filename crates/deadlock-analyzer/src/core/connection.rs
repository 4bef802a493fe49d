use std::{future::Future, time::Duration};

use tiberius::{error::Error as TdsError, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::error::{AppError, AppResult};

pub type SqlClient = Client<Compat<TcpStream>>;

/// Matches the driver default `Connect Timeout=15`.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Opens a client for an ADO.NET style connection string.
///
/// The client owns the socket: dropping it on any exit path closes the
/// connection and abandons whatever statement is still in flight.
pub async fn connect(connection_string: &str) -> AppResult<SqlClient> {
    let config = Config::from_ado_string(connection_string)
        .map_err(|e| AppError::ConnectionFailed(format!("invalid connection string: {e}")))?;

    let attempt = async {
        match open(config.clone()).await {
            Err(TdsError::Routing { host, port }) => {
                tracing::debug!(%host, port, "server redirected connection");
                let mut rerouted = config;
                rerouted.host(&host);
                rerouted.port(port);
                open(rerouted).await
            }
            other => other,
        }
    };

    match tokio::time::timeout(CONNECT_TIMEOUT, attempt).await {
        Ok(res) => res.map_err(|e| AppError::ConnectionFailed(e.to_string())),
        Err(_) => Err(AppError::ConnectionFailed(format!(
            "connection timeout expired after {} seconds",
            CONNECT_TIMEOUT.as_secs()
        ))),
    }
}

async fn open(config: Config) -> Result<SqlClient, TdsError> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(config, tcp.compat_write()).await
}

/// Runs `fut` under a command timeout; `None` waits for as long as it takes.
/// Expiry drops the future, and with it the client that was executing.
pub async fn with_command_timeout<T, F>(timeout: Option<Duration>, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match timeout {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| AppError::Timeout(limit.as_secs()))?,
    }
}
