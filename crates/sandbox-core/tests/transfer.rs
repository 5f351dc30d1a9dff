mod common;

use common::{harness, restored_instance};
use sandbox_common::SandboxError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve a single canned HTTP response. Returns the URL to fetch.
async fn serve_once(response: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let _ = socket.write_all(response).await;
        let _ = socket.shutdown().await;
    });
    format!("http://{addr}/setup.sh")
}

#[tokio::test]
async fn relative_destination_resolves_against_shell_cwd() {
    let h = harness();
    let instance = restored_instance(&h.session, "node1").await;
    h.engine.state().exec_output = "4242: /root\n".into();

    h.sandbox
        .upload_from_reader(&instance, "data.txt", "data.txt", &b"payload"[..])
        .await
        .unwrap();

    let state = h.engine.state();
    assert_eq!(state.executed.len(), 1);
    assert_eq!(
        state.executed[0].1,
        vec!["bash".to_string(), "-c".to_string(), "pwdx $(</var/run/cwd)".to_string()]
    );
    assert_eq!(state.copied.len(), 1);
    assert_eq!(state.copied[0].container, instance.name);
    assert_eq!(state.copied[0].dest, "/root/data.txt");
    assert_eq!(state.copied[0].file_name, "data.txt");
    assert_eq!(state.copied[0].content, b"payload");
}

#[tokio::test]
async fn root_cwd_does_not_double_the_slash() {
    let h = harness();
    let instance = restored_instance(&h.session, "node1").await;
    h.engine.state().exec_output = "1: /\n".into();

    h.sandbox
        .upload_from_reader(&instance, "notes.md", "docs", &b"x"[..])
        .await
        .unwrap();
    assert_eq!(h.engine.state().copied[0].dest, "/docs");
}

#[tokio::test]
async fn absolute_destination_skips_cwd_lookup() {
    let h = harness();
    let instance = restored_instance(&h.session, "node1").await;

    h.sandbox
        .upload_from_reader(&instance, "app.tar", "/opt/app", &b"tarball"[..])
        .await
        .unwrap();

    let state = h.engine.state();
    assert!(state.executed.is_empty());
    assert_eq!(state.copied[0].dest, "/opt/app");
}

#[tokio::test]
async fn cwd_lookup_failure_aborts_upload() {
    let h = harness();
    let instance = restored_instance(&h.session, "node1").await;
    h.engine.state().exec_code = 1;
    h.engine.state().exec_output = "cat: /var/run/cwd: No such file".into();

    let err = h
        .sandbox
        .upload_from_reader(&instance, "data.txt", "data.txt", &b"payload"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::WorkingDirectory { code: 1 }));
    assert!(h.engine.state().copied.is_empty());
}

#[tokio::test]
async fn unparsable_cwd_aborts_upload() {
    let h = harness();
    let instance = restored_instance(&h.session, "node1").await;
    h.engine.state().exec_output = "garbage".into();

    let err = h
        .sandbox
        .upload_from_reader(&instance, "data.txt", "data.txt", &b"payload"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::WorkingDirectoryParse(_)));
    assert!(h.engine.state().copied.is_empty());
}

#[tokio::test]
async fn url_upload_streams_body_into_instance() {
    let h = harness();
    let instance = restored_instance(&h.session, "node1").await;
    let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\necho hello\n").await;

    h.sandbox
        .upload_from_url(&instance, "setup.sh", "/root", &url)
        .await
        .unwrap();

    let state = h.engine.state();
    assert_eq!(state.copied.len(), 1);
    assert_eq!(state.copied[0].dest, "/root");
    assert_eq!(state.copied[0].file_name, "setup.sh");
    assert_eq!(state.copied[0].content, b"echo hello\n");
}

#[tokio::test]
async fn url_upload_rejects_non_200() {
    let h = harness();
    let instance = restored_instance(&h.session, "node1").await;
    let url = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;

    let err = h
        .sandbox
        .upload_from_url(&instance, "setup.sh", "/root", &url)
        .await
        .unwrap_err();

    assert!(matches!(err, SandboxError::DownloadStatus { status: 404, .. }));
    assert!(h.engine.state().copied.is_empty());
}

#[tokio::test]
async fn url_upload_reports_transport_failure() {
    let h = harness();
    let instance = restored_instance(&h.session, "node1").await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/gone", listener.local_addr().unwrap());
    drop(listener);

    let err = h
        .sandbox
        .upload_from_url(&instance, "gone", "/root", &url)
        .await
        .unwrap_err();

    assert!(matches!(err, SandboxError::Download { .. }));
    assert!(h.engine.state().copied.is_empty());
}
