//! SMB2 client
//!
//! [`SmbClient`] owns one connection to one share. [`SmbClient::connect`]
//! runs the handshake; every other operation is a short fixed sequence of
//! requests over that connection, with file transfers pipelined.

pub mod config;
pub mod connection;
pub mod correlation;
pub mod directory;
pub mod handshake;
pub mod pipeline;
mod verbs;

pub use config::{ClientConfig, ShareAddress};
pub use connection::{Connection, PendingResponse};
pub use correlation::CorrelationTable;
pub use directory::DirEntry;
pub use handshake::{ConnectionState, Handshake};
pub use pipeline::{Packet, PacketIo, TransferLimits, TransferWindow};

use crate::error::{Error, Result};
use tracing::debug;

/// SMB client bound to one share
pub struct SmbClient {
    config: ClientConfig,
    share: ShareAddress,
    connection: Option<Connection>,
    state: ConnectionState,
}

impl SmbClient {
    /// Validates the share address; does not touch the network
    pub fn new(config: ClientConfig) -> Result<Self> {
        let share = ShareAddress::parse(&config.share)?;
        Ok(Self {
            config,
            share,
            connection: None,
            state: ConnectionState::Disconnected,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn share(&self) -> &ShareAddress {
        &self.share
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connect and run the handshake up to a tree connect on the share
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Err(Error::InvalidState(format!(
                "Already connected ({})",
                self.state
            )));
        }

        self.state = ConnectionState::Disconnected;
        let connection = Connection::open(
            &self.share.host,
            self.config.port,
            self.config.connect_timeout,
            self.config.request_timeout,
            self.share.unc_path(),
        )
        .await?;

        let mut handshake = Handshake::new(&connection, &self.config);
        let outcome = handshake.run().await;
        self.state = handshake.state();

        match outcome {
            Ok(()) => {
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    debug!("Closing after failed handshake: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// Close the connection; pending requests fail with `ConnectionClosed`
    pub async fn close(&mut self) -> Result<()> {
        self.state = ConnectionState::Closed;
        match self.connection.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }

    /// The connection, once the handshake has finished
    fn ready(&self) -> Result<&Connection> {
        match (&self.connection, self.state) {
            (Some(connection), ConnectionState::Ready) if !connection.is_closed() => {
                Ok(connection)
            }
            (Some(_), ConnectionState::Ready) => Err(Error::ConnectionClosed),
            _ => Err(Error::InvalidState(format!(
                "Not connected ({})",
                self.state
            ))),
        }
    }
}
