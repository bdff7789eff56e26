use assert_fs::TempDir;
use assert_fs::prelude::*;
use std::time::Duration;
use throttle_region::{ThrottleOptions, ThrottledFileRegion};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn generous() -> ThrottleOptions {
    ThrottleOptions {
        rate_ceiling: u64::MAX,
        recheck_interval: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn streams_multi_chunk_region_to_channel() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let tempdir = TempDir::new()?;
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let source = tempdir.child("source.bin");
    source.write_binary(&content)?;

    let region =
        ThrottledFileRegion::from_path_with_options(source.path(), 0, 200_000, generous());

    let (mut tx, mut rx) = tokio::io::duplex(8 * 1024);
    let reader = tokio::spawn(async move {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        while out.len() < 200_000 {
            let n = rx.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }

        Ok::<Vec<u8>, anyhow::Error>(out)
    });

    // Drive the region to completion, advancing by each call's
    // reported byte count.
    let mut pos = 0;
    let mut total = 0;
    while pos < region.count() {
        let written = region.transfer_to(&mut tx, pos).await?;
        pos += written;
        total += written;
    }
    drop(tx);

    assert_eq!(200_000, total);
    assert_eq!(200_000, region.transferred());
    assert_eq!(content, reader.await??);

    Ok(())
}

#[tokio::test]
async fn copies_sub_range_into_file_and_releases() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let tempdir = TempDir::new()?;
    let content: Vec<u8> = (0..1_000u32).map(|i| (i % 251) as u8).collect();
    let source = tempdir.child("source.bin");
    source.write_binary(&content)?;
    let dest_path = tempdir.child("dest.bin");

    // Default options: a tiny transfer stays well under the ceiling
    // once the clock has ticked.
    let region = ThrottledFileRegion::from_path(source.path(), 100, 800);

    let mut dest = tokio::fs::File::create(dest_path.path()).await?;
    let mut pos = 0;
    while pos < region.count() {
        pos += region.transfer_to(&mut dest, pos).await?;
    }
    dest.flush().await?;

    assert!(region.release().await?);
    assert!(!region.is_open().await);
    assert!(region.transfer_to(&mut dest, 0).await.is_err());

    let copied = tokio::fs::read(dest_path.path()).await?;
    assert_eq!(&content[100..900], copied.as_slice());

    Ok(())
}
