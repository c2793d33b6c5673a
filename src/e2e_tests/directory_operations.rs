//! Tests for directory listings

use super::TestContext;
use crate::error::NtStatus;
use crate::protocol::smb2_constants::Smb2Command;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_dir_filters_dot_entries() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_file("a.txt", b"abc".to_vec());
        ctx.server.add_dir("sub");

        let names = ctx.client.read_dir("").await.unwrap();
        assert_eq!(names, vec!["sub", "a.txt"]);
        assert_eq!(ctx.server.count(Smb2Command::QueryDirectory), 2);
        assert_eq!(ctx.server.count(Smb2Command::Close), 1);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_dir_verbose() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_dir("docs");
        ctx.server.add_file("docs\\report.pdf", vec![0u8; 1234]);
        ctx.server.add_dir("docs\\old");

        let entries = ctx.client.read_dir_verbose("/docs/").await.unwrap();
        assert_eq!(entries.len(), 2);

        let old = &entries[0];
        assert_eq!(old.name, "old");
        assert!(old.is_directory());

        let report = &entries[1];
        assert_eq!(report.name, "report.pdf");
        assert_eq!(report.size, 1234);
        assert!(!report.is_directory());
        assert_eq!(
            report.last_write_time.map(|time| time.timestamp()),
            Some(1_600_000_000)
        );
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_dir_empty() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_dir("void");
        assert!(ctx.client.read_dir("void").await.unwrap().is_empty());
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_dir_on_file() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_file("plain.txt", b"x".to_vec());
        let err = ctx.client.read_dir("plain.txt").await.unwrap_err();
        assert_eq!(err.status(), Some(NtStatus::NotADirectory));
        ctx.shutdown().await.unwrap();
    }
}
