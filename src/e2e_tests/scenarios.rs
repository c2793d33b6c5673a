//! Pipelining and failure scenarios over a real socket

use super::loopback::ServerOptions;
use super::TestContext;
use crate::error::{Error, NtStatus};
use crate::protocol::smb2_constants::Smb2Command;
use std::time::Duration;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_200000_bytes() {
        let ctx = TestContext::new().await.unwrap();
        let content = pattern(200_000);

        ctx.client
            .write_bytes("scenario.bin", content.clone())
            .await
            .unwrap();

        let mut writes = ctx.server.state().writes.clone();
        writes.sort();
        assert_eq!(
            writes,
            vec![
                (0, 65_424),
                (65_424, 65_424),
                (130_848, 65_424),
                (196_272, 3_728)
            ]
        );
        assert_eq!(ctx.server.count(Smb2Command::Close), 1);
        assert_eq!(ctx.server.file("scenario.bin").unwrap(), content);

        // The close comes after every write
        let log = ctx.server.state().log.clone();
        let close = log.iter().rposition(|c| *c == Smb2Command::Close).unwrap();
        let last_write = log.iter().rposition(|c| *c == Smb2Command::Write).unwrap();
        assert!(close > last_write);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_writes_issued_in_offset_order() {
        let ctx = TestContext::connected(ServerOptions::default(), |config| {
            config.max_packet_size = 1024;
        })
        .await
        .unwrap();

        for round in 0..5 {
            let name = format!("ordered-{round}.bin");
            ctx.client
                .write_bytes(&name, pattern(200_000))
                .await
                .unwrap();
        }

        // 1024 minus the write overhead
        let one_file: Vec<(u64, usize)> = (0..200_000u64)
            .step_by(912)
            .map(|offset| (offset, (200_000 - offset).min(912) as usize))
            .collect();
        let expected: Vec<(u64, usize)> = (0..5).flat_map(|_| one_file.clone()).collect();
        // Arrival order at the server, not sorted
        assert_eq!(ctx.server.state().writes, expected);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reads_answered_out_of_order() {
        let options = ServerOptions {
            reorder_reads: Some(4),
            ..Default::default()
        };
        let ctx = TestContext::connected(options, |config| {
            config.max_packet_size = 4096;
            config.packet_concurrency = 8;
        })
        .await
        .unwrap();
        let content = pattern(100_000);
        ctx.server.add_file("shuffled.bin", content.clone());

        assert_eq!(ctx.client.read_file("shuffled.bin").await.unwrap(), content);
        assert_eq!(ctx.server.count(Smb2Command::Read), 25);
        assert!(ctx.server.state().reordered_batches > 0);
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_read_packet() {
        let options = ServerOptions {
            fail_read_at: Some(65_536),
            ..Default::default()
        };
        let ctx = TestContext::connected(options, |_| {}).await.unwrap();
        ctx.server.add_file("broken.bin", pattern(400_000));

        let err = ctx.client.read_file("broken.bin").await.unwrap_err();
        assert_eq!(err.status(), Some(NtStatus::InvalidParameter));
        // The handle is still closed exactly once
        assert_eq!(ctx.server.count(Smb2Command::Close), 1);

        // The connection stays usable
        ctx.server.add_file("fine.txt", b"ok".to_vec());
        assert_eq!(ctx.client.read_file("fine.txt").await.unwrap(), b"ok");
        ctx.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unanswered_request_times_out() {
        let options = ServerOptions {
            silent: vec![Smb2Command::Close],
            ..Default::default()
        };
        let ctx = TestContext::connected(options, |config| {
            config.request_timeout = Duration::from_millis(200);
        })
        .await
        .unwrap();
        ctx.server.add_file("slow.txt", b"x".to_vec());

        // A timeout is not the same as "does not exist"
        let err = ctx.client.file_exists("slow.txt").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_server_hang_up_fails_transfer() {
        let options = ServerOptions {
            hang_up_on: Some(Smb2Command::Write),
            ..Default::default()
        };
        let ctx = TestContext::connected(options, |_| {}).await.unwrap();

        let err = ctx
            .client
            .write_bytes("doomed.bin", pattern(500_000))
            .await
            .unwrap_err();
        assert!(err.is_transport(), "{err:?}");

        // Later requests fail fast
        let later = ctx.client.file_exists("anything").await.unwrap_err();
        assert!(later.is_transport(), "{later:?}");
    }

    #[tokio::test]
    async fn test_concurrent_verbs_share_the_connection() {
        let ctx = TestContext::new().await.unwrap();
        ctx.server.add_file("one", pattern(70_000));
        ctx.server.add_file("two", pattern(90_000));

        let (one, two, listing) = tokio::join!(
            ctx.client.read_file("one"),
            ctx.client.read_file("two"),
            ctx.client.read_dir("")
        );
        assert_eq!(one.unwrap(), pattern(70_000));
        assert_eq!(two.unwrap(), pattern(90_000));
        assert_eq!(listing.unwrap(), vec!["one", "two"]);
        ctx.shutdown().await.unwrap();
    }
}
