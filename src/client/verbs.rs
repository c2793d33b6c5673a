//! File operations on the connected share

use super::connection::{Connection, PendingResponse};
use super::directory::{parse_directory_information, without_dot_entries, DirEntry};
use super::pipeline::{read_pipelined, write_pipelined, Packet, PacketIo, TransferLimits};
use super::SmbClient;
use crate::error::{Error, Result};
use crate::protocol::commands::{Close, Create, Open, QueryDirectory, Read, SetInfo, Write};
use crate::protocol::messages::info::{disposition_information, end_of_file_information};
use crate::protocol::messages::{FileId, FileInfoClass};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Share-relative path with backslash separators and no outer separators
pub(crate) fn normalize_path(path: &str) -> String {
    path.replace('/', "\\").trim_matches('\\').to_string()
}

/// READ packets against one open handle
struct ReadPackets {
    connection: Connection,
    file_id: FileId,
}

#[async_trait]
impl PacketIo for ReadPackets {
    type Pending = PendingResponse<Read>;
    type Output = Bytes;

    async fn send(&self, packet: Packet) -> Result<Self::Pending> {
        let read = Read {
            file_id: self.file_id,
            offset: packet.offset,
            length: packet.length,
        };
        self.connection.send_request(read).await
    }

    async fn receive(&self, pending: Self::Pending) -> Result<Bytes> {
        pending.response().await
    }
}

/// WRITE packets of an in-memory source against one open handle
struct WritePackets {
    connection: Connection,
    file_id: FileId,
    data: Bytes,
}

#[async_trait]
impl PacketIo for WritePackets {
    type Pending = PendingResponse<Write>;
    type Output = u32;

    async fn send(&self, packet: Packet) -> Result<Self::Pending> {
        let start = packet.offset as usize;
        let write = Write {
            file_id: self.file_id,
            offset: packet.offset,
            data: self.data.slice(start..start + packet.length as usize),
        };
        self.connection.send_request(write).await
    }

    async fn receive(&self, pending: Self::Pending) -> Result<u32> {
        pending.response().await
    }
}

/// Close `file_id` whatever `outcome` was.
///
/// The operation's own error wins; a close failure after it is only logged.
async fn finish<T>(connection: &Connection, file_id: FileId, outcome: Result<T>) -> Result<T> {
    let closed = connection.request(&Close { file_id }).await;
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            debug!("Close after failed operation: {}", close_err);
            Err(e)
        }
    }
}

/// Open-then-close probe; a failure status from the server means absent
async fn probe(connection: &Connection, path: &str) -> Result<bool> {
    match connection.request(&Open::read(path)).await {
        Ok(handle) => {
            connection
                .request(&Close {
                    file_id: handle.file_id,
                })
                .await?;
            Ok(true)
        }
        Err(Error::Status { status, .. }) => {
            debug!("'{}' not accessible: {}", path, status);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

async fn list_entries(connection: &Connection, file_id: FileId) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    let mut restart = true;
    while let Some(listing) = connection
        .request(&QueryDirectory { file_id, restart })
        .await?
    {
        entries.extend(parse_directory_information(&listing)?);
        restart = false;
    }
    Ok(without_dot_entries(entries))
}

impl SmbClient {
    /// Names in a directory, in server order
    pub async fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let entries = self.read_dir_verbose(path).await?;
        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }

    /// Directory entries with size and last-write time
    pub async fn read_dir_verbose(&self, path: &str) -> Result<Vec<DirEntry>> {
        let connection = self.ready()?;
        let path = normalize_path(path);

        let handle = connection.request(&Open::directory(path.as_str())).await?;
        let entries = list_entries(connection, handle.file_id).await;
        let entries = finish(connection, handle.file_id, entries).await?;
        debug!("Listed {} entries in '{}'", entries.len(), path);
        Ok(entries)
    }

    /// Whole file contents
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let connection = self.ready()?;
        let path = normalize_path(path);

        let handle = connection.request(&Open::read(path.as_str())).await?;
        let session = connection.session().await;
        let limits = TransferLimits::for_read(
            self.config.packet_concurrency,
            self.config.max_packet_size,
            session.max_read_size,
        );
        let io = Arc::new(ReadPackets {
            connection: connection.clone(),
            file_id: handle.file_id,
        });

        let data = read_pipelined(io, handle.end_of_file, limits).await;
        let data = finish(connection, handle.file_id, data).await?;
        info!("Read {} bytes from '{}'", data.len(), path);
        Ok(data)
    }

    /// Upload a local file to a new remote file
    pub async fn write_file(&self, local: impl AsRef<Path>, remote: &str) -> Result<u64> {
        // Checked before any local I/O
        self.ready()?;
        let data = tokio::fs::read(local.as_ref()).await?;
        self.write_bytes(remote, data).await
    }

    /// Create `remote` holding `data`; the file must not exist yet
    pub async fn write_bytes(&self, remote: &str, data: impl Into<Bytes>) -> Result<u64> {
        let connection = self.ready()?;
        let path = normalize_path(remote);
        let data = data.into();

        if probe(connection, &path).await? {
            return Err(Error::AlreadyExists(path));
        }

        let handle = connection.request(&Create::new(path.as_str())).await?;
        let written = self.fill(connection, handle.file_id, data).await;
        let written = finish(connection, handle.file_id, written).await?;
        info!("Wrote {} bytes to '{}'", written, path);
        Ok(written)
    }

    async fn fill(&self, connection: &Connection, file_id: FileId, data: Bytes) -> Result<u64> {
        let total = data.len() as u64;
        connection
            .request(&SetInfo {
                file_id,
                class: FileInfoClass::EndOfFileInformation,
                buffer: end_of_file_information(total),
            })
            .await?;

        let session = connection.session().await;
        let limits = TransferLimits::for_write(
            self.config.packet_concurrency,
            self.config.max_packet_size,
            session.max_write_size,
        );
        let io = Arc::new(WritePackets {
            connection: connection.clone(),
            file_id,
            data,
        });
        write_pipelined(io, total, limits).await
    }

    /// Whether `path` can be opened; server refusals count as absent
    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        let connection = self.ready()?;
        probe(connection, &normalize_path(path)).await
    }

    /// Delete a file; it must exist
    pub async fn unlink_file(&self, path: &str) -> Result<()> {
        let connection = self.ready()?;
        let path = normalize_path(path);

        if !probe(connection, &path).await? {
            return Err(Error::FileNotFound(path));
        }

        let handle = connection.request(&Open::delete(path.as_str())).await?;
        let marked = connection
            .request(&SetInfo {
                file_id: handle.file_id,
                class: FileInfoClass::DispositionInformation,
                buffer: disposition_information(true),
            })
            .await;
        finish(connection, handle.file_id, marked).await?;
        info!("Deleted '{}'", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientConfig, ConnectionState};

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/dir/file.txt"), r"dir\file.txt");
        assert_eq!(normalize_path(r"\dir\sub\"), r"dir\sub");
        assert_eq!(normalize_path("plain"), "plain");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path(""), "");
    }

    #[tokio::test]
    async fn test_verbs_require_connection() {
        let client = SmbClient::new(ClientConfig::new(r"\\host\share")).unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(
            client.read_file("a.txt").await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            client.write_file("/definitely/not/here", "b").await,
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(
            client.file_exists("a").await,
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_bad_share_rejected_up_front() {
        assert!(matches!(
            SmbClient::new(ClientConfig::new("host/share")),
            Err(Error::InvalidShare(_))
        ));
    }
}
