use crate::utils::*;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::time::sleep;

#[test]
fn test_round_trip_identity_across_sizes() {
    Runtime::new().unwrap().block_on(async {
        let server = RunningServer::start().await;
        let work_dir = temp_dir("round-trip");

        for &size in &[0usize, 1, 1023, 1024, 1025, 10240] {
            let content = test_content(size);
            let name = format!("blob_{}.bin", size);

            let source = work_dir.join(&name);
            tokio::fs::write(&source, &content).await.unwrap();

            let uploaded = upload_file(server.addr, &source).await.unwrap();
            assert_eq!(uploaded, size as u64);

            let stored = tokio::fs::read(server.stored_file(&name)).await.unwrap();
            assert_eq!(stored, content, "stored file differs for size {}", size);

            let output = work_dir.join(format!("downloaded_{}", name));
            let downloaded = download_file(server.addr, &name, &output).await.unwrap();
            assert_eq!(downloaded, size as u64);

            let fetched = tokio::fs::read(&output).await.unwrap();
            assert_eq!(fetched, content, "downloaded file differs for size {}", size);
        }

        sleep(Duration::from_millis(100)).await;

        let server = server.stop().await;
        assert_eq!(server.session_count(), 0);
    });
}

#[test]
fn test_upload_empty_file() {
    Runtime::new().unwrap().block_on(async {
        let server = RunningServer::start().await;
        let work_dir = temp_dir("empty");

        let source = work_dir.join("empty.bin");
        tokio::fs::write(&source, &[] as &[u8]).await.unwrap();

        let uploaded = upload_file(server.addr, &source).await.unwrap();
        assert_eq!(uploaded, 0);

        let stored = tokio::fs::read(server.stored_file("empty.bin")).await.unwrap();
        assert_eq!(stored.len(), 0);

        let server = server.stop().await;
        assert_eq!(server.session_count(), 0);
    });
}

#[test]
fn test_upload_one_byte_past_full_window() {
    Runtime::new().unwrap().block_on(async {
        let server = RunningServer::start().await;
        let work_dir = temp_dir("window");

        // One byte more than four full chunks, the default window size
        let content = test_content(4097);
        let source = work_dir.join("window.bin");
        tokio::fs::write(&source, &content).await.unwrap();

        let uploaded = upload_file(server.addr, &source).await.unwrap();
        assert_eq!(uploaded, 4097);

        let stored = tokio::fs::read(server.stored_file("window.bin")).await.unwrap();
        assert_eq!(stored, content);

        let server = server.stop().await;
        assert_eq!(server.session_count(), 0);
    });
}
