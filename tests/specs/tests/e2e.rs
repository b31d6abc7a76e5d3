// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `busl-relay` binary and drive
//! it over plain HTTP, covering the relay's published usage scenarios.

use std::time::Duration;

use busl_relay_specs::RelayProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

async fn register(client: &reqwest::Client, base: &str, key: &str) -> anyhow::Result<()> {
    let resp = client.put(format!("{base}/streams/{key}")).send().await?;
    anyhow::ensure!(resp.status().as_u16() == 201, "register failed: {}", resp.status());
    Ok(())
}

async fn publish_chunked(
    client: &reqwest::Client,
    base: &str,
    key: &str,
    chunks: Vec<Vec<u8>>,
) -> anyhow::Result<()> {
    let body = reqwest::Body::wrap_stream(futures_util::stream::iter(
        chunks.into_iter().map(Ok::<_, std::io::Error>),
    ));
    let resp = client
        .post(format!("{base}/streams/{key}"))
        .header("transfer-encoding", "chunked")
        .body(body)
        .send()
        .await?;
    anyhow::ensure!(resp.status().as_u16() == 200, "publish failed: {}", resp.status());
    Ok(())
}

// S1: three writes + close → full replay + EOF.
#[tokio::test]
async fn s1_three_writes_then_close_replay_full() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = relay.base_url();

    register(&client, &base, "s1").await?;
    publish_chunked(
        &client,
        &base,
        "s1",
        vec![b"busl ".to_vec(), b"hello ".to_vec(), b"world".to_vec()],
    )
    .await?;

    let resp = client.get(format!("{base}/streams/s1")).send().await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body = resp.bytes().await?;
    assert_eq!(&body[..], b"busl hello world");

    Ok(())
}

// S2: subscriber opens mid-stream and sees the live continuation.
#[tokio::test]
async fn s2_split_write_subscribe_write_close() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = relay.base_url();

    register(&client, &base, "s2").await?;
    publish_chunked(&client, &base, "s2", vec![b"busl".to_vec()]).await?;

    let sub_client = client.clone();
    let sub_base = base.clone();
    let reader = tokio::spawn(async move {
        let resp = sub_client.get(format!("{sub_base}/streams/s2")).send().await?;
        anyhow::ensure!(resp.status().as_u16() == 200);
        Ok::<_, anyhow::Error>(resp.bytes().await?)
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    publish_chunked(&client, &base, "s2", vec![b" hello".to_vec(), b" world".to_vec()]).await?;

    let body = reader.await??;
    assert_eq!(&body[..], b"busl hello world");

    Ok(())
}

// S3: seek part-way through an already-closed stream.
#[tokio::test]
async fn s3_seek_into_closed_stream() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = relay.base_url();

    register(&client, &base, "s3").await?;
    publish_chunked(&client, &base, "s3", vec![b"busl hello world".to_vec()]).await?;

    let resp = client.get(format!("{base}/streams/s3")).header("range", "bytes=10-").send().await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body = resp.bytes().await?;
    assert_eq!(&body[..], b" world");

    Ok(())
}

// S4: seeking past the end of a closed stream is an empty, EOF read; seeking
// inside a closed stream still reports no_content as 204 once fully drained.
#[tokio::test]
async fn s4_seek_past_end_is_empty() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = relay.base_url();

    register(&client, &base, "s4").await?;
    publish_chunked(&client, &base, "s4", vec![b"busl hello world".to_vec()]).await?;

    let resp = client.get(format!("{base}/streams/s4")).header("range", "bytes=16-").send().await?;
    assert_eq!(resp.status().as_u16(), 204);

    Ok(())
}

// S5: SSE re-encoding matches the documented byte-exact frame.
#[tokio::test]
async fn s5_sse_frame_is_byte_exact() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = relay.base_url();

    register(&client, &base, "s5").await?;
    publish_chunked(&client, &base, "s5", vec![b"hello\nworld\n".to_vec()]).await?;

    let resp = client
        .get(format!("{base}/streams/s5"))
        .header("accept", "text/event-stream")
        .header("last-event-id", "1")
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body = resp.text().await?;
    assert_eq!(body, "id: 12\ndata: ello\ndata: world\ndata: \n\n");

    Ok(())
}

// S6: a stream crossing several replay-chunk boundaries reads back exactly.
#[tokio::test]
async fn s6_large_stream_reads_back_exactly() -> anyhow::Result<()> {
    let relay = RelayProcess::start()?;
    relay.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();
    let base = relay.base_url();

    register(&client, &base, "s6").await?;
    let mut chunks = Vec::new();
    for i in 0..8 {
        chunks.push(vec![(b'a' + (i % 26) as u8); 4096]);
    }
    chunks.push(vec![b'z'; 1]);
    let total: usize = chunks.iter().map(|c| c.len()).sum();
    assert_eq!(total, 32_769);
    publish_chunked(&client, &base, "s6", chunks).await?;

    let resp = client.get(format!("{base}/streams/s6")).send().await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body = resp.bytes().await?;
    assert_eq!(body.len(), 32_769);

    Ok(())
}

// S7: a stream absent from the substrate falls back to cold storage.
#[tokio::test]
async fn s7_falls_back_to_storage_when_not_registered() -> anyhow::Result<()> {
    let (storage_port, _storage) = spawn_stub_storage(b"hello world".to_vec()).await?;
    let relay = RelayProcess::build()
        .storage_base_url(&format!("http://127.0.0.1:{storage_port}"))
        .spawn()?;
    relay.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let resp = client.get(format!("{}/streams/k", relay.base_url())).send().await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body = resp.bytes().await?;
    assert_eq!(&body[..], b"hello world");

    Ok(())
}

/// A bare-bones HTTP/1.1 server that answers every request with a fixed
/// 200 body, standing in for a cold-storage backend in the S7 scenario.
async fn spawn_stub_storage(body: Vec<u8>) -> anyhow::Result<(u16, tokio::task::JoinHandle<()>)> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.write_all(&body).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    Ok((port, handle))
}
