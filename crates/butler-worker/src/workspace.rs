//! Task workspaces.
//!
//! A workspace is the directory `<results_root>/<uid>` holding a copy of the
//! task's source manifest plus every file the steps read or write. The core
//! never deletes it; cleanup belongs to whoever owns the results root.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use butler_core::RunUid;
use thiserror::Error;
use tracing::{debug, info};
use url::{ParseError, Url};

use crate::manifest::{Manifest, ManifestError, ManifestFile};

/// Errors while preparing or reloading a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The run uid cannot name a directory.
    #[error("Invalid run uid '{0}'")]
    InvalidUid(String),

    /// Filesystem error.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest could not be parsed.
    #[error("Invalid manifest at '{location}': {source}")]
    Manifest {
        location: String,
        #[source]
        source: ManifestError,
    },

    /// A resource could not be fetched.
    #[error("Could not fetch '{location}': {reason}")]
    Fetch { location: String, reason: String },
}

impl WorkspaceError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn fetch(location: &str, reason: impl ToString) -> Self {
        Self::Fetch {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Materialized working directory of one task run.
#[derive(Debug)]
pub struct ResourceWorkspace {
    dir: PathBuf,
    manifest_path: PathBuf,
    manifest: Manifest,
    version: u64,
}

impl ResourceWorkspace {
    /// Working directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the on-disk manifest handed to tools.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Manifest as last loaded from disk.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Number of reloads since the workspace was prepared.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Re-read the manifest from disk, picking up groups written by tools.
    pub async fn reload(&mut self) -> Result<u64, WorkspaceError> {
        self.manifest = Manifest::load(&self.manifest_path).await?;
        self.version += 1;
        debug!(
            manifest = %self.manifest_path.display(),
            version = self.version,
            groups = self.manifest.file_groups.len(),
            "Reloaded manifest"
        );
        Ok(self.version)
    }
}

/// Creates task workspaces below a results root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    results_root: PathBuf,
    manifest_basename: String,
    http: reqwest::Client,
}

impl WorkspaceManager {
    /// Create a manager writing below `results_root`.
    pub fn new(results_root: impl Into<PathBuf>, manifest_basename: impl Into<String>) -> Self {
        Self {
            results_root: results_root.into(),
            manifest_basename: manifest_basename.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Use a preconfigured HTTP client for remote manifests and files.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Directory a task with the given uid works in.
    pub fn workspace_dir(&self, uid: &RunUid) -> PathBuf {
        self.results_root.join(uid.as_str())
    }

    /// Materialize the workspace of a task.
    ///
    /// Copies the manifest at `src` into the uid's directory (replacing any
    /// earlier copy), fetches every member of `default_file_group` that is
    /// not available locally yet and saves the manifest again. Downloads are
    /// stored as `<group>/<file id><.ext>`. Any file that cannot be fetched
    /// fails the whole preparation.
    pub async fn prepare(
        &self,
        src: &str,
        uid: &RunUid,
        default_file_group: &str,
    ) -> Result<ResourceWorkspace, WorkspaceError> {
        if !uid.is_path_safe() {
            return Err(WorkspaceError::InvalidUid(uid.to_string()));
        }

        let dir = self.workspace_dir(uid);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WorkspaceError::io(&dir, e))?;

        info!(src = %src, dir = %dir.display(), "Preparing workspace");

        let source = Location::parse(src)?;
        let bytes = self.read(&source).await?;
        let mut manifest = Manifest::from_slice(&bytes, src)?;

        let manifest_path = dir.join(&self.manifest_basename);
        manifest.save(&manifest_path).await?;

        let mut fetched = 0usize;
        if let Some(files) = manifest.files_mut(default_file_group) {
            let mut taken: HashSet<String> = files
                .iter()
                .filter_map(|f| f.local_filename.clone())
                .collect();
            for file in files.iter_mut() {
                if is_materialized(&dir, file).await {
                    continue;
                }
                if let Some(stale) = &file.local_filename {
                    taken.remove(stale);
                }
                let local = self
                    .fetch_file(&source, &dir, default_file_group, file, &mut taken)
                    .await?;
                file.local_filename = Some(local);
                fetched += 1;
            }
        }

        manifest.save(&manifest_path).await?;
        info!(
            dir = %dir.display(),
            file_grp = %default_file_group,
            fetched = fetched,
            total = manifest.find_files(default_file_group).len(),
            "Workspace prepared"
        );

        Ok(ResourceWorkspace {
            dir,
            manifest_path,
            manifest,
            version: 0,
        })
    }

    async fn fetch_file(
        &self,
        manifest_location: &Location,
        dir: &Path,
        group: &str,
        file: &ManifestFile,
        taken: &mut HashSet<String>,
    ) -> Result<String, WorkspaceError> {
        let url = file.url.as_deref().ok_or_else(|| {
            WorkspaceError::fetch(&file.id, "file has neither a local copy nor a url")
        })?;

        let location = manifest_location.join(url)?;
        let local_filename = local_name(group, &file.id, &location)?;
        if !taken.insert(local_filename.clone()) {
            return Err(WorkspaceError::fetch(
                &location.to_string(),
                format!("local file '{}' is already taken", local_filename),
            ));
        }

        let group_dir = dir.join(group);
        tokio::fs::create_dir_all(&group_dir)
            .await
            .map_err(|e| WorkspaceError::io(&group_dir, e))?;

        debug!(file_id = %file.id, location = %location, "Fetching file");
        let bytes = self.read(&location).await?;
        let target = dir.join(&local_filename);
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| WorkspaceError::io(&target, e))?;

        Ok(local_filename)
    }

    async fn read(&self, location: &Location) -> Result<Vec<u8>, WorkspaceError> {
        match location {
            Location::Remote(url) => {
                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| WorkspaceError::fetch(url.as_str(), e))?;
                if !response.status().is_success() {
                    return Err(WorkspaceError::fetch(
                        url.as_str(),
                        format!("HTTP {}", response.status()),
                    ));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| WorkspaceError::fetch(url.as_str(), e))?;
                Ok(bytes.to_vec())
            }
            Location::Local(path) => tokio::fs::read(path)
                .await
                .map_err(|e| WorkspaceError::fetch(&path.display().to_string(), e)),
        }
    }
}

async fn is_materialized(dir: &Path, file: &ManifestFile) -> bool {
    match &file.local_filename {
        Some(local) => tokio::fs::try_exists(dir.join(local))
            .await
            .unwrap_or(false),
        None => false,
    }
}

/// Where a manifest or a file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Remote(Url),
    Local(PathBuf),
}

impl Location {
    /// Parse a URL or a filesystem path. Relative paths are taken from the
    /// current directory.
    fn parse(raw: &str) -> Result<Self, WorkspaceError> {
        match Url::parse(raw) {
            Ok(url) => Self::from_url(url),
            Err(ParseError::RelativeUrlWithoutBase) => {
                let path = PathBuf::from(raw);
                if path.is_absolute() {
                    return Ok(Self::Local(path));
                }
                let cwd = std::env::current_dir().map_err(|e| WorkspaceError::io(&path, e))?;
                Ok(Self::Local(cwd.join(path)))
            }
            Err(e) => Err(WorkspaceError::fetch(raw, e)),
        }
    }

    fn from_url(url: Url) -> Result<Self, WorkspaceError> {
        if matches!(url.scheme(), "http" | "https") {
            return Ok(Self::Remote(url));
        }
        if url.scheme() == "file" {
            return url
                .to_file_path()
                .map(Self::Local)
                .map_err(|()| WorkspaceError::fetch(url.as_str(), "not a local file url"));
        }
        Err(WorkspaceError::fetch(
            url.as_str(),
            format!("unsupported scheme '{}'", url.scheme()),
        ))
    }

    /// Resolve `href` relative to this location.
    fn join(&self, href: &str) -> Result<Self, WorkspaceError> {
        let base = match self {
            Self::Remote(url) => url.clone(),
            Self::Local(path) => Url::from_file_path(path)
                .map_err(|()| WorkspaceError::fetch(&path.display().to_string(), "not an absolute path"))?,
        };
        let target = base.join(href).map_err(|e| WorkspaceError::fetch(href, e))?;
        Self::from_url(target)
    }

    fn file_name(&self) -> Option<&str> {
        let name = match self {
            Self::Remote(url) => url.path_segments().and_then(|mut segments| segments.next_back()),
            Self::Local(path) => path.file_name().and_then(|n| n.to_str()),
        };
        name.filter(|n| !n.is_empty())
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(url) => f.write_str(url.as_str()),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Workspace-relative name of a downloaded file: `<group>/<id><.ext>`.
fn local_name(group: &str, id: &str, location: &Location) -> Result<String, WorkspaceError> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(WorkspaceError::fetch(id, "file id cannot name a local file"));
    }
    let extension = location
        .file_name()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str());
    Ok(match extension {
        Some(ext) => format!("{}/{}.{}", group, id, ext),
        None => format!("{}/{}", group, id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mets_document, serve, workspace_manager};

    /// Source directory with a manifest and two page images.
    async fn source_bundle(root: &Path) -> PathBuf {
        let src = root.join("src");
        tokio::fs::create_dir_all(src.join("img")).await.unwrap();
        tokio::fs::write(src.join("img/00000001.jpg"), b"page-1").await.unwrap();
        let absolute = src.join("img/00000002.jpg");
        tokio::fs::write(&absolute, b"page-2").await.unwrap();

        let absolute_url = format!("file://{}", absolute.display());
        let mets = mets_document(&[
            ("OCR-D-IMG", "IMG_1", "img/00000001.jpg"),
            ("OCR-D-IMG", "IMG_2", absolute_url.as_str()),
            ("THUMBS", "THUMB_1", "http://127.0.0.1:9/unreachable.jpg"),
        ]);
        let path = src.join("mets.xml");
        tokio::fs::write(&path, mets).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_prepare_fetches_default_group() {
        let root = tempfile::tempdir().unwrap();
        let src = source_bundle(root.path()).await;
        let manager = workspace_manager(root.path());
        let uid = RunUid::new("run-1");

        let workspace = manager
            .prepare(src.to_str().unwrap(), &uid, "OCR-D-IMG")
            .await
            .unwrap();

        assert_eq!(workspace.dir(), root.path().join("results/run-1"));
        assert_eq!(workspace.version(), 0);
        let files = workspace.manifest().find_files("OCR-D-IMG");
        assert_eq!(files[0].local_filename.as_deref(), Some("OCR-D-IMG/IMG_1.jpg"));
        assert_eq!(files[1].local_filename.as_deref(), Some("OCR-D-IMG/IMG_2.jpg"));

        let copied = tokio::fs::read(workspace.dir().join("OCR-D-IMG/IMG_2.jpg"))
            .await
            .unwrap();
        assert_eq!(copied, b"page-2");

        // other groups are left alone
        let thumbs = workspace.manifest().find_files("THUMBS");
        assert!(thumbs[0].local_filename.is_none());

        // the saved manifest matches the in-memory one
        let on_disk = Manifest::load(workspace.manifest_path()).await.unwrap();
        assert_eq!(&on_disk, workspace.manifest());
        assert!(workspace.manifest_path().ends_with("mets.xml"));
    }

    #[tokio::test]
    async fn test_prepare_keeps_same_basenames_apart() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src");
        tokio::fs::create_dir_all(src.join("a")).await.unwrap();
        tokio::fs::create_dir_all(src.join("b")).await.unwrap();
        tokio::fs::write(src.join("a/page.jpg"), b"AAA").await.unwrap();
        tokio::fs::write(src.join("b/page.jpg"), b"BBB").await.unwrap();
        let mets = mets_document(&[
            ("OCR-D-IMG", "P1", "a/page.jpg"),
            ("OCR-D-IMG", "P2", "b/page.jpg"),
        ]);
        tokio::fs::write(src.join("mets.xml"), mets).await.unwrap();

        let workspace = workspace_manager(root.path())
            .prepare(src.join("mets.xml").to_str().unwrap(), &RunUid::new("run-6"), "OCR-D-IMG")
            .await
            .unwrap();

        let files = workspace.manifest().find_files("OCR-D-IMG");
        let p1 = files[0].local_filename.as_deref().unwrap();
        let p2 = files[1].local_filename.as_deref().unwrap();
        assert_ne!(p1, p2);
        assert_eq!(tokio::fs::read(workspace.dir().join(p1)).await.unwrap(), b"AAA");
        assert_eq!(tokio::fs::read(workspace.dir().join(p2)).await.unwrap(), b"BBB");
    }

    #[tokio::test]
    async fn test_prepare_rejects_duplicate_ids() {
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src");
        tokio::fs::create_dir_all(&src).await.unwrap();
        tokio::fs::write(src.join("1.jpg"), b"one").await.unwrap();
        tokio::fs::write(src.join("2.jpg"), b"two").await.unwrap();
        let mets = mets_document(&[("OCR-D-IMG", "P1", "1.jpg"), ("OCR-D-IMG", "P1", "2.jpg")]);
        tokio::fs::write(src.join("mets.xml"), mets).await.unwrap();

        let err = workspace_manager(root.path())
            .prepare(src.join("mets.xml").to_str().unwrap(), &RunUid::new("run-7"), "OCR-D-IMG")
            .await
            .unwrap_err();
        match err {
            WorkspaceError::Fetch { reason, .. } => assert!(reason.contains("already taken")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_prepare_downloads_remote_members() {
        let mets = mets_document(&[
            ("OCR-D-IMG", "IMG_1", "img/00000001.jpg"),
            ("OCR-D-IMG", "IMG_2", "/static/00000002.jpg"),
        ]);
        let base = serve(vec![
            ("/dms/mets.xml", 200, mets.into_bytes()),
            ("/dms/img/00000001.jpg", 200, b"remote-1".to_vec()),
            ("/static/00000002.jpg", 200, b"remote-2".to_vec()),
        ])
        .await;

        let root = tempfile::tempdir().unwrap();
        let workspace = workspace_manager(root.path())
            .prepare(&format!("{}/dms/mets.xml", base), &RunUid::new("run-8"), "OCR-D-IMG")
            .await
            .unwrap();

        let files = workspace.manifest().find_files("OCR-D-IMG");
        assert_eq!(files[0].local_filename.as_deref(), Some("OCR-D-IMG/IMG_1.jpg"));
        assert_eq!(files[1].local_filename.as_deref(), Some("OCR-D-IMG/IMG_2.jpg"));
        assert_eq!(
            tokio::fs::read(workspace.dir().join("OCR-D-IMG/IMG_1.jpg")).await.unwrap(),
            b"remote-1"
        );
        assert_eq!(
            tokio::fs::read(workspace.dir().join("OCR-D-IMG/IMG_2.jpg")).await.unwrap(),
            b"remote-2"
        );
    }

    #[tokio::test]
    async fn test_prepare_fails_on_http_error() {
        let mets = mets_document(&[("OCR-D-IMG", "IMG_1", "missing.jpg")]);
        let base = serve(vec![("/mets.xml", 200, mets.into_bytes())]).await;

        let root = tempfile::tempdir().unwrap();
        let err = workspace_manager(root.path())
            .prepare(&format!("{}/mets.xml", base), &RunUid::new("run-9"), "OCR-D-IMG")
            .await
            .unwrap_err();

        match err {
            WorkspaceError::Fetch { location, reason } => {
                assert!(location.ends_with("/missing.jpg"));
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_prepare_reuses_existing_directory() {
        let root = tempfile::tempdir().unwrap();
        let src = source_bundle(root.path()).await;
        let manager = workspace_manager(root.path());
        let uid = RunUid::new("run-2");

        manager.prepare(src.to_str().unwrap(), &uid, "OCR-D-IMG").await.unwrap();
        let again = manager
            .prepare(src.to_str().unwrap(), &uid, "OCR-D-IMG")
            .await
            .unwrap();

        assert_eq!(again.manifest().find_files("OCR-D-IMG").len(), 2);
    }

    #[tokio::test]
    async fn test_prepare_fails_on_unfetchable_member() {
        let root = tempfile::tempdir().unwrap();
        let src = source_bundle(root.path()).await;
        tokio::fs::remove_file(root.path().join("src/img/00000001.jpg"))
            .await
            .unwrap();
        let manager = workspace_manager(root.path());

        let err = manager
            .prepare(src.to_str().unwrap(), &RunUid::new("run-3"), "OCR-D-IMG")
            .await
            .unwrap_err();

        match err {
            WorkspaceError::Fetch { location, .. } => assert!(location.ends_with("00000001.jpg")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_prepare_fails_on_missing_manifest() {
        let root = tempfile::tempdir().unwrap();
        let manager = workspace_manager(root.path());

        let err = manager
            .prepare("/nonexistent/mets.xml", &RunUid::new("run-4"), "OCR-D-IMG")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_prepare_rejects_unsafe_uid() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path(), "mets.xml");
        let err = manager
            .prepare("mets.xml", &RunUid::new("../escape"), "OCR-D-IMG")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidUid(_)));
    }

    #[tokio::test]
    async fn test_reload_bumps_version() {
        let root = tempfile::tempdir().unwrap();
        let src = source_bundle(root.path()).await;
        let manager = workspace_manager(root.path());
        let mut workspace = manager
            .prepare(src.to_str().unwrap(), &RunUid::new("run-5"), "OCR-D-IMG")
            .await
            .unwrap();

        let mut manifest = workspace.manifest().clone();
        manifest.add_file("OCR-D-BIN", ManifestFile::local("BIN_1", "OCR-D-BIN/BIN_1.png"));
        manifest.save(workspace.manifest_path()).await.unwrap();

        assert_eq!(workspace.reload().await.unwrap(), 1);
        assert!(workspace.manifest().has_group("OCR-D-BIN"));
    }

    fn remote(url: &str) -> Location {
        Location::Remote(Url::parse(url).unwrap())
    }

    #[test]
    fn test_location_join_remote() {
        let base = Location::parse("http://foo.bar/dms/book/mets.xml?version=2#top").unwrap();

        assert_eq!(base.join("img/1.jpg").unwrap(), remote("http://foo.bar/dms/book/img/1.jpg"));
        assert_eq!(base.join("/images/1.jpg").unwrap(), remote("http://foo.bar/images/1.jpg"));
        assert_eq!(base.join("../shared/1.jpg").unwrap(), remote("http://foo.bar/dms/shared/1.jpg"));
        assert_eq!(
            base.join("https://cdn.example/2.jpg").unwrap(),
            remote("https://cdn.example/2.jpg")
        );
        assert!(base.join("ftp://foo.bar/1.jpg").is_err());
    }

    #[test]
    fn test_location_join_local() {
        let base = Location::parse("file:///data/book/mets.xml").unwrap();
        assert_eq!(base, Location::Local("/data/book/mets.xml".into()));

        assert_eq!(base.join("img/1.jpg").unwrap(), Location::Local("/data/book/img/1.jpg".into()));
        assert_eq!(base.join("../shared/1.jpg").unwrap(), Location::Local("/data/shared/1.jpg".into()));
        assert_eq!(base.join("/abs/2.jpg").unwrap(), Location::Local("/abs/2.jpg".into()));
        assert_eq!(
            base.join("http://foo.bar/3.jpg").unwrap(),
            remote("http://foo.bar/3.jpg")
        );

        let relative = Location::parse("book/mets.xml").unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(relative, Location::Local(cwd.join("book/mets.xml")));
    }

    #[test]
    fn test_location_file_name() {
        assert_eq!(
            Location::parse("http://foo.bar/PPN1/800/0/00000001.jpg?x=1").unwrap().file_name(),
            Some("00000001.jpg")
        );
        assert_eq!(Location::parse("http://foo.bar/").unwrap().file_name(), None);
        assert_eq!(Location::parse("/tmp/a.tif").unwrap().file_name(), Some("a.tif"));
    }

    #[test]
    fn test_local_name() {
        let jpg = remote("http://foo.bar/a/page.jpg?size=full");
        assert_eq!(local_name("OCR-D-IMG", "P1", &jpg).unwrap(), "OCR-D-IMG/P1.jpg");

        let bare = remote("http://foo.bar/iiif/page");
        assert_eq!(local_name("OCR-D-IMG", "P1", &bare).unwrap(), "OCR-D-IMG/P1");

        assert!(local_name("OCR-D-IMG", "../P1", &jpg).is_err());
        assert!(local_name("OCR-D-IMG", "..", &jpg).is_err());
        assert!(local_name("OCR-D-IMG", "", &jpg).is_err());
    }
}
