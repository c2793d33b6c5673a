//! Connection setup: NEGOTIATE, two SESSION_SETUP legs, TREE_CONNECT

use super::config::ClientConfig;
use super::connection::Connection;
use crate::auth::NtlmAuth;
use crate::error::{Error, NtStatus, Result};
use crate::protocol::commands::{
    Negotiate, SessionSetupAuthenticate, SessionSetupNegotiate, TreeConnect,
};
use std::fmt;
use tracing::{debug, info, warn};

/// Where a client is in its connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Negotiating,
    /// NTLM NEGOTIATE sent in SESSION_SETUP
    SessionSetup1,
    /// NTLM AUTHENTICATE sent in SESSION_SETUP
    SessionSetup2,
    TreeConnecting,
    Ready,
    Closed,
}

impl ConnectionState {
    /// Successor in the setup sequence
    pub fn next(self) -> Option<Self> {
        match self {
            ConnectionState::Disconnected => Some(ConnectionState::Negotiating),
            ConnectionState::Negotiating => Some(ConnectionState::SessionSetup1),
            ConnectionState::SessionSetup1 => Some(ConnectionState::SessionSetup2),
            ConnectionState::SessionSetup2 => Some(ConnectionState::TreeConnecting),
            ConnectionState::TreeConnecting => Some(ConnectionState::Ready),
            ConnectionState::Ready | ConnectionState::Closed => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State threaded through the setup steps
struct HandshakeContext {
    ntlm: NtlmAuth,
    password: String,
    challenge: Option<Vec<u8>>,
}

/// Drives one connection from TCP-connected to tree-connected.
///
/// Each step is exactly one request. The first failure stops the sequence;
/// completed steps are not undone.
pub struct Handshake<'a> {
    connection: &'a Connection,
    state: ConnectionState,
    ctx: HandshakeContext,
}

impl<'a> Handshake<'a> {
    pub fn new(connection: &'a Connection, config: &ClientConfig) -> Self {
        Self {
            connection,
            state: ConnectionState::Disconnected,
            ctx: HandshakeContext {
                ntlm: NtlmAuth::new_client(
                    config.username.clone(),
                    config.domain.clone(),
                    config.workstation.clone(),
                ),
                password: config.password.clone(),
                challenge: None,
            },
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run every remaining step, stopping at the first error
    pub async fn run(&mut self) -> Result<()> {
        while let Some(next) = self.state.next() {
            self.state = next;
            if next == ConnectionState::Ready {
                break;
            }
            if let Err(e) = self.step().await {
                warn!("Handshake failed in {}: {}", self.state, e);
                return Err(e);
            }
        }
        info!("Connected to {}", self.connection.session().await.unc_path());
        Ok(())
    }

    async fn step(&mut self) -> Result<()> {
        debug!("Handshake step {}", self.state);
        match self.state {
            ConnectionState::Negotiating => {
                self.connection.request(&Negotiate).await?;
            }
            ConnectionState::SessionSetup1 => {
                let token = self.ctx.ntlm.create_negotiate_message()?;
                let challenge = self
                    .connection
                    .request(&SessionSetupNegotiate { token })
                    .await?;
                self.ctx.challenge = Some(challenge);
            }
            ConnectionState::SessionSetup2 => {
                let challenge = self.ctx.challenge.take().ok_or_else(|| {
                    Error::InvalidState("No NTLM challenge to answer".into())
                })?;
                let token = self
                    .ctx
                    .ntlm
                    .create_authenticate_message(&challenge, &self.ctx.password)?;
                let flags = self
                    .connection
                    .request(&SessionSetupAuthenticate { token })
                    .await
                    .map_err(|e| match e.status() {
                        Some(NtStatus::LogonFailure) | Some(NtStatus::AccessDenied) => {
                            Error::AuthenticationFailed(format!(
                                "{} rejected for user '{}'",
                                e, self.ctx.ntlm.username
                            ))
                        }
                        _ => e,
                    })?;
                debug!("Session established, flags {:?}", flags);
            }
            ConnectionState::TreeConnecting => {
                self.connection.request(&TreeConnect).await?;
            }
            ConnectionState::Disconnected | ConnectionState::Ready | ConnectionState::Closed => {
                return Err(Error::InvalidState(format!(
                    "No handshake step for {}",
                    self.state
                )));
            }
        }
        Ok(())
    }
}
