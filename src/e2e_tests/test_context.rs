//! Test context for end-to-end testing
//!
//! Pairs a [`LoopbackServer`] with an [`SmbClient`] pointed at it.

use super::loopback::{LoopbackServer, ServerOptions, SHARE};
use crate::client::{ClientConfig, SmbClient};
use crate::error::Result;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestContext {
    pub server: LoopbackServer,
    pub client: SmbClient,
    /// Local scratch space for upload/download files
    pub local_dir: TempDir,
}

impl TestContext {
    /// Connected client against a default server
    pub async fn new() -> Result<Self> {
        Self::connected(ServerOptions::default(), |_| {}).await
    }

    /// Server and client, handshake not yet run
    pub async fn start(
        options: ServerOptions,
        configure: impl FnOnce(&mut ClientConfig),
    ) -> Result<Self> {
        let mut config = ClientConfig::new(format!(r"\\127.0.0.1\{}", SHARE))
            .with_credentials(options.username.clone(), options.password.clone(), "TESTDOM");
        let server = LoopbackServer::start(options).await?;
        config.port = server.port();
        config.request_timeout = Duration::from_secs(5);
        configure(&mut config);

        Ok(Self {
            server,
            client: SmbClient::new(config)?,
            local_dir: tempfile::tempdir()?,
        })
    }

    pub async fn connected(
        options: ServerOptions,
        configure: impl FnOnce(&mut ClientConfig),
    ) -> Result<Self> {
        let mut ctx = Self::start(options, configure).await?;
        ctx.client.connect().await?;
        Ok(ctx)
    }

    /// Shutdown the test context cleanly
    pub async fn shutdown(mut self) -> Result<()> {
        self.client.close().await
    }
}
