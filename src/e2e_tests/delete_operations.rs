//! Tests for existence checks and deletion

use super::TestContext;
use crate::error::Error;
use crate::protocol::smb2_constants::Smb2Command;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_exists() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_file("here.txt", b"x".to_vec());
        ctx.server.add_dir("folder");

        assert!(ctx.client.file_exists("here.txt").await.unwrap());
        assert!(ctx.client.file_exists("folder").await.unwrap());
        assert!(!ctx.client.file_exists("gone.txt").await.unwrap());
        // Every successful open was closed
        assert_eq!(ctx.server.count(Smb2Command::Close), 2);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unlink_file() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_file("delete_me.txt", b"test content".to_vec());

        ctx.client.unlink_file("delete_me.txt").await.unwrap();
        assert!(ctx.server.file("delete_me.txt").is_none());
        assert!(!ctx.client.file_exists("delete_me.txt").await.unwrap());
        assert_eq!(ctx.server.count(Smb2Command::SetInfo), 1);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unlink_missing_file() {
        let ctx = TestContext::new().await.unwrap();
        let err = ctx.client.unlink_file("missing.txt").await.unwrap_err();
        assert!(matches!(err, Error::FileNotFound(ref path) if path == "missing.txt"));
        assert_eq!(ctx.server.count(Smb2Command::SetInfo), 0);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unlink_nested_path() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_dir("a");
        ctx.server.add_file("a\\b.txt", b"1".to_vec());
        ctx.server.add_file("a\\keep.txt", b"2".to_vec());

        ctx.client.unlink_file("/a/b.txt").await.unwrap();
        assert!(ctx.server.file("a\\b.txt").is_none());
        assert!(ctx.server.file("a\\keep.txt").is_some());
        ctx.shutdown().await.unwrap();
    }
}
