//! Shared fixtures for unit tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use butler_core::RunUid;
use butler_tool::{InvocationResult, ToolError, ToolInvocation, ToolInvoker};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::manifest::{Manifest, ManifestFile};
use crate::workspace::{ResourceWorkspace, WorkspaceManager};

/// Tool double: records every invocation and behaves like a processor by
/// adding one file to its output group(s) in the manifest.
#[derive(Default)]
pub struct FakeInvoker {
    calls: Mutex<Vec<ToolInvocation>>,
    fail_on: Option<String>,
    corrupt_manifest: bool,
}

impl FakeInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every invocation of `executable` with exit code 1.
    pub fn failing_on(mut self, executable: &str) -> Self {
        self.fail_on = Some(executable.to_string());
        self
    }

    /// Succeed but leave an unparsable manifest behind.
    pub fn corrupting_manifest(mut self) -> Self {
        self.corrupt_manifest = true;
        self
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn executables(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.executable).collect()
    }
}

#[async_trait]
impl ToolInvoker for FakeInvoker {
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<InvocationResult, ToolError> {
        self.calls.lock().unwrap().push(invocation.clone());

        if self.fail_on.as_deref() == Some(invocation.executable.as_str()) {
            return Err(ToolError::ProcessError {
                executable: invocation.executable.clone(),
                code: 1,
                diagnostic: "simulated failure".to_string(),
            });
        }

        if self.corrupt_manifest {
            tokio::fs::write(&invocation.manifest_path, b"not a mets document")
                .await
                .map_err(ToolError::SpawnError)?;
        } else {
            let mut manifest = Manifest::load(&invocation.manifest_path)
                .await
                .map_err(|e| ToolError::ProtocolError(e.to_string()))?;
            for group in invocation.output_file_group.split(',') {
                let id = format!("{}_{}", group, manifest.find_files(group).len() + 1);
                manifest.add_file(group, ManifestFile::local(&id, format!("{}/{}.xml", group, id)));
            }
            manifest
                .save(&invocation.manifest_path)
                .await
                .map_err(|e| ToolError::ProtocolError(e.to_string()))?;
        }

        Ok(InvocationResult {
            exit_code: 0,
            duration_ms: 1,
        })
    }
}

/// METS document with `(group, id, href)` entries.
pub fn mets_document(files: &[(&str, &str, &str)]) -> String {
    let mut manifest = Manifest::default();
    for (group, id, href) in files {
        manifest.add_file(*group, ManifestFile::remote(*id, *href).with_mimetype("image/jpeg"));
    }
    manifest.to_xml()
}

/// Write a source bundle with one page image in `OCR-D-IMG` and return the
/// manifest path.
pub async fn source_manifest(root: &Path) -> String {
    let src = root.join("src");
    tokio::fs::create_dir_all(&src).await.unwrap();
    tokio::fs::write(src.join("00000001.jpg"), b"page-1").await.unwrap();

    let path = src.join("mets.xml");
    tokio::fs::write(&path, mets_document(&[("OCR-D-IMG", "IMG_1", "00000001.jpg")]))
        .await
        .unwrap();
    path.display().to_string()
}

/// Workspace manager below `<root>/results` that never goes through a proxy.
pub fn workspace_manager(root: &Path) -> WorkspaceManager {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    WorkspaceManager::new(root.join("results"), "mets.xml").with_http_client(http)
}

/// A workspace prepared from [`source_manifest`].
pub async fn prepared_workspace(root: &Path) -> ResourceWorkspace {
    let src = source_manifest(root).await;
    workspace_manager(root)
        .prepare(&src, &RunUid::new("test-run"), "OCR-D-IMG")
        .await
        .unwrap()
}

/// Serve `(path, status, body)` routes over plain HTTP on a loopback port
/// and return the base URL. Unknown paths answer 404.
pub async fn serve(routes: Vec<(&'static str, u16, Vec<u8>)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let request = String::from_utf8_lossy(&request);
                let path = request.split_whitespace().nth(1).unwrap_or("/");
                let (status, body) = routes
                    .iter()
                    .find(|(route, _, _)| *route == path)
                    .map(|(_, status, body)| (*status, body.clone()))
                    .unwrap_or((404, b"not found".to_vec()));
                let reason = if status == 200 { "OK" } else { "Error" };

                let head = format!(
                    "HTTP/1.1 {} {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    status,
                    reason,
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes()).await;
                let _ = stream.write_all(&body).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}
