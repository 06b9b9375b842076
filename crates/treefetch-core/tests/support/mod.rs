#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use tempfile::TempDir;
use treefetch_core::cache::{Cache, FileCache, MemoryCache};
use treefetch_core::config::Settings;
use treefetch_core::context::FetchContext;
use treefetch_core::download::{CachedDownloadRequest, CachedDownloadResult, Downloader};
use treefetch_core::error::Result;
use treefetch_core::store::{LocalStore, Store};

pub const LAST_MODIFIED: i64 = 1_622_548_800;

const GIT_ENV_OVERRIDES: [&str; 4] = [
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_COMMON_DIR",
];

pub fn git_command() -> Command {
    let mut cmd = Command::new("git");
    for key in GIT_ENV_OVERRIDES {
        cmd.env_remove(key);
    }
    cmd
}

pub fn git(repo: &Path, args: &[&str]) -> String {
    let output = git_command()
        .args(args)
        .current_dir(repo)
        .output()
        .expect("Failed to invoke git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Repository on branch `main` with a single commit; returns the commit.
pub fn init_repo(repo: &Path) -> String {
    std::fs::create_dir_all(repo).unwrap();
    git(repo, &["init"]);
    git(repo, &["checkout", "-b", "main"]);
    git(repo, &["config", "user.email", "test@example.com"]);
    git(repo, &["config", "user.name", "Test User"]);
    git(repo, &["config", "commit.gpgsign", "false"]);
    std::fs::write(repo.join("flake.nix"), "{ outputs = _: {}; }\n").unwrap();
    git(repo, &["add", "."]);
    git(repo, &["commit", "-m", "init"]);
    git(repo, &["rev-parse", "HEAD"])
}

pub fn file_url(repo: &Path) -> String {
    url::Url::from_directory_path(repo).unwrap().to_string()
}

/// In-memory stand-in for the GitHub commits and tarball endpoints.
///
/// Branch heads are configured per ref; tarballs are synthesized from the
/// requested commit so different commits produce different trees.
pub struct FakeGitHub {
    scratch: TempDir,
    heads: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<CachedDownloadRequest>>,
    omit_last_modified: AtomicBool,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self {
            scratch: TempDir::new().unwrap(),
            heads: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            omit_last_modified: AtomicBool::new(false),
        }
    }

    /// Serve tarballs without a last-modified time.
    pub fn omit_last_modified(&self) {
        self.omit_last_modified.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<CachedDownloadRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn set_head(&self, git_ref: &str, rev: &str) {
        self.heads
            .lock()
            .unwrap()
            .insert(git_ref.to_string(), rev.to_string());
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn reset(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl Downloader for FakeGitHub {
    fn download_cached(
        &self,
        store: &dyn Store,
        request: &CachedDownloadRequest,
    ) -> Result<CachedDownloadResult> {
        self.requests.lock().unwrap().push(request.clone());

        let (_, rest) = request
            .url
            .split_once("/repos/")
            .expect("GitHub API URL");
        let parts: Vec<&str> = rest.splitn(4, '/').collect();
        let (endpoint, pointer) = (parts[2], parts[3]);

        match endpoint {
            "commits" => {
                let heads = self.heads.lock().unwrap();
                let sha = heads.get(pointer).expect("unknown branch");
                let path = self.scratch.path().join(format!("{pointer}.json"));
                std::fs::write(&path, format!(r#"{{"sha":"{sha}"}}"#)).unwrap();
                Ok(CachedDownloadResult {
                    path,
                    store_path: None,
                    last_modified: None,
                    etag: None,
                })
            }
            "tarball" => {
                let tree = self.scratch.path().join("trees").join(pointer);
                std::fs::create_dir_all(tree.join("lib")).unwrap();
                std::fs::write(tree.join("README.md"), format!("commit {pointer}\n")).unwrap();
                std::fs::write(tree.join("lib").join("default.nix"), "{}\n").unwrap();
                let store_path = store.add_path(&request.name, &tree)?;
                Ok(CachedDownloadResult {
                    path: store.to_real_path(&store_path),
                    store_path: Some(store_path),
                    last_modified: (!self.omit_last_modified.load(Ordering::SeqCst))
                        .then_some(LAST_MODIFIED),
                    etag: None,
                })
            }
            other => panic!("unexpected endpoint {other}"),
        }
    }
}

/// A context over a temp store, a cache and a [`FakeGitHub`].
pub struct Harness {
    pub dir: TempDir,
    pub github: Arc<FakeGitHub>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            github: Arc::new(FakeGitHub::new()),
        }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.dir.path().join("store")
    }

    pub fn cache_file(&self) -> PathBuf {
        self.dir.path().join("cache").join("fetcher-cache.json")
    }

    pub fn settings(&self) -> Settings {
        Settings {
            store_dir: Some(self.store_dir()),
            cache_dir: Some(self.dir.path().join("cache")),
            ..Settings::default()
        }
    }

    pub fn context_with_cache(&self, cache: Arc<dyn Cache>) -> FetchContext {
        self.context_with(cache, self.settings())
    }

    pub fn context_with(&self, cache: Arc<dyn Cache>, settings: Settings) -> FetchContext {
        let store = Arc::new(LocalStore::open(self.store_dir()).unwrap());
        FetchContext::new(store, cache, self.github.clone(), settings)
    }

    pub fn memory_context(&self) -> (FetchContext, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        (self.context_with_cache(cache.clone()), cache)
    }

    /// A context whose cache persists in [`Self::cache_file`]; each call
    /// reopens the file.
    pub fn file_context(&self) -> FetchContext {
        let cache = Arc::new(FileCache::open(self.cache_file()).unwrap());
        self.context_with_cache(cache)
    }
}

/// Move every entry of the cache file at `path` `by` into the past.
pub fn backdate_cache_file(path: &Path, by: TimeDelta) {
    let mut contents: serde_json::Value =
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    for entry in contents["entries"].as_array_mut().unwrap() {
        let written: DateTime<Utc> = entry["timestamp"].as_str().unwrap().parse().unwrap();
        entry["timestamp"] = serde_json::Value::String((written - by).to_rfc3339());
    }
    std::fs::write(path, serde_json::to_vec_pretty(&contents).unwrap()).unwrap();
}
