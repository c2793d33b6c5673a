//! Tests for reading and writing whole files

use super::loopback::ServerOptions;
use super::TestContext;
use crate::error::Error;
use crate::protocol::smb2_constants::Smb2Command;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_small_file() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_file("hello.txt", b"Hello, SMB!".to_vec());

        let data = ctx.client.read_file("hello.txt").await.unwrap();
        assert_eq!(data, b"Hello, SMB!");
        assert_eq!(ctx.server.count(Smb2Command::Read), 1);
        assert_eq!(ctx.server.count(Smb2Command::Close), 1);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_empty_file() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_file("empty", Vec::new());

        assert!(ctx.client.read_file("/empty").await.unwrap().is_empty());
        assert_eq!(ctx.server.count(Smb2Command::Read), 0);
        assert_eq!(ctx.server.count(Smb2Command::Close), 1);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_large_file_in_packets() {
        let ctx = TestContext::new().await.unwrap();
        let content = pattern(300_000);
        ctx.server.add_dir("data");
        ctx.server.add_file("data\\big.bin", content.clone());

        let data = ctx.client.read_file("data/big.bin").await.unwrap();
        assert_eq!(data, content);
        // 64 KiB packets
        assert_eq!(ctx.server.count(Smb2Command::Read), 5);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_respects_negotiated_size() {
        let options = ServerOptions {
            max_read_size: 4096,
            ..Default::default()
        };
        let ctx = TestContext::connected(options, |_| {}).await.unwrap();
        ctx.server.add_file("f", pattern(10_000));

        assert_eq!(ctx.client.read_file("f").await.unwrap(), pattern(10_000));
        assert_eq!(ctx.server.count(Smb2Command::Read), 3);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let ctx = TestContext::new().await.unwrap();
        let err = ctx.client.read_file("nope.txt").await.unwrap_err();
        assert_eq!(
            err.status(),
            Some(crate::error::NtStatus::ObjectNameNotFound)
        );
        assert_eq!(ctx.server.count(Smb2Command::Close), 0);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let ctx = TestContext::new().await.unwrap();
        let content = pattern(150_000);

        let written = ctx
            .client
            .write_bytes("upload.bin", content.clone())
            .await
            .unwrap();
        assert_eq!(written, 150_000);
        assert_eq!(ctx.server.file("upload.bin").unwrap(), content);
        assert_eq!(ctx.client.read_file("upload.bin").await.unwrap(), content);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_file_from_disk() {
        let ctx = TestContext::new().await.unwrap();
        let local = ctx.local_dir.path().join("local.txt");
        tokio::fs::write(&local, b"from disk").await.unwrap();

        ctx.client.write_file(&local, "/remote.txt").await.unwrap();
        assert_eq!(ctx.server.file("remote.txt").unwrap(), b"from disk");
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_missing_local_file() {
        let ctx = TestContext::new().await.unwrap();
        let missing = ctx.local_dir.path().join("missing");

        let err = ctx.client.write_file(&missing, "x").await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(ctx.server.count(Smb2Command::Create), 0);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_existing_file_is_refused() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_file("taken.txt", b"old".to_vec());
        let creates_before = ctx.server.count(Smb2Command::Create);

        let err = ctx
            .client
            .write_bytes("taken.txt", b"new".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(ctx.server.file("taken.txt").unwrap(), b"old");
        // Only the existence probe reached the server
        assert_eq!(ctx.server.count(Smb2Command::Create), creates_before + 1);
        assert_eq!(ctx.server.count(Smb2Command::Write), 0);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_empty_file() {
        let ctx = TestContext::new().await.unwrap();
        assert_eq!(ctx.client.write_bytes("zero", Vec::new()).await.unwrap(), 0);
        assert_eq!(ctx.server.file("zero").unwrap(), Vec::<u8>::new());
        assert_eq!(ctx.server.count(Smb2Command::Write), 0);
        assert_eq!(ctx.server.count(Smb2Command::SetInfo), 1);
        ctx.shutdown().await.unwrap();
    }
}
