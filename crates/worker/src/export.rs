use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use subtracker_core::config::Settings;

pub const DEFAULT_REPO_NAME: &str = "subtracker";
const DEFAULT_API_URL: &str = "https://api.github.com";
const BRANCH_REF: &str = "heads/main";

/// Path components that are never exported. Anything starting with `.env` is skipped too.
pub const IGNORE_PATTERNS: &[&str] = &[
    "target",
    "node_modules",
    ".git",
    "dist",
    ".env",
    ".DS_Store",
    "Cargo.lock",
];

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub root: PathBuf,
    pub repo: String,
    pub archive: Option<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    /// Forward-slash path relative to the export root.
    pub path: String,
    pub content: Vec<u8>,
}

pub fn is_ignored(name: &str) -> bool {
    name.starts_with(".env") || IGNORE_PATTERNS.contains(&name)
}

/// Reads every non-ignored file under `root`, sorted by relative path.
pub fn collect_files(root: &Path) -> Result<Vec<ExportFile>> {
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<ExportFile>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read dir {} failed", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {} failed", dir.display()))?;
        let name = entry.file_name();
        if is_ignored(&name.to_string_lossy()) {
            continue;
        }

        let path = entry.path();
        // Follows symlinks, so linked files and directories are exported as their targets.
        let meta = std::fs::metadata(&path)
            .with_context(|| format!("stat {} failed", path.display()))?;

        if meta.is_dir() {
            walk(root, &path, out)?;
        } else if meta.is_file() {
            let content =
                std::fs::read(&path).with_context(|| format!("read {} failed", path.display()))?;
            out.push(ExportFile {
                path: relative_path(root, &path)?,
                content,
            });
        }
    }
    Ok(())
}

fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

pub fn write_archive(files: &[ExportFile], dest: &Path) -> Result<()> {
    use std::io::Write;

    let file = std::fs::File::create(dest)
        .with_context(|| format!("create archive {} failed", dest.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for f in files {
        zip.start_file(f.path.as_str(), options)
            .with_context(|| format!("start zip entry {} failed", f.path))?;
        zip.write_all(&f.content)
            .with_context(|| format!("write zip entry {} failed", f.path))?;
    }
    zip.finish().context("finish zip archive failed")?;
    Ok(())
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub mode: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub sha: String,
}

impl TreeEntry {
    pub fn blob(path: &str, sha: String) -> Self {
        Self {
            path: path.to_string(),
            mode: "100644",
            kind: "blob",
            sha,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
}

impl GithubClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let token = settings.require_github_token()?;
        let api_url = settings
            .github_api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .context("GITHUB_TOKEN is not a valid header value")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("subtracker/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to build github http client")?;

        Ok(Self { http, api_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    /// Creates the repository, or resolves `<login>/<name>` when it already exists.
    pub async fn ensure_repo(&self, name: &str) -> Result<String> {
        let res = self
            .http
            .post(self.url("/user/repos"))
            .json(&serde_json::json!({
                "name": name,
                "description": "Subscription tracker",
                "private": false,
                "auto_init": true,
            }))
            .send()
            .await
            .context("create repo request failed")?;

        if res.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let user: UserResponse = read_json(
                self.http.get(self.url("/user")).send().await,
                "get authenticated user",
            )
            .await?;
            tracing::info!(repo = name, owner = %user.login, "repository already exists");
            return Ok(format!("{}/{name}", user.login));
        }

        let repo: RepoResponse = read_json(Ok(res), "create repo").await?;
        tracing::info!(repo = %repo.full_name, "repository created");
        Ok(repo.full_name)
    }

    /// Commits `files` on top of `main` and moves the branch to the new commit.
    pub async fn push_files(&self, full_name: &str, files: &[ExportFile]) -> Result<String> {
        let base = format!("/repos/{full_name}/git");

        let head: RefResponse = read_json(
            self.http
                .get(self.url(&format!("{base}/ref/{BRANCH_REF}")))
                .send()
                .await,
            "get ref",
        )
        .await?;
        let parent_sha = head.object.sha;

        let commit: CommitResponse = read_json(
            self.http
                .get(self.url(&format!("{base}/commits/{parent_sha}")))
                .send()
                .await,
            "get commit",
        )
        .await?;

        let mut tree = Vec::with_capacity(files.len());
        for f in files {
            let blob: ShaResponse = read_json(
                self.http
                    .post(self.url(&format!("{base}/blobs")))
                    .json(&blob_body(&f.content))
                    .send()
                    .await,
                "create blob",
            )
            .await
            .with_context(|| format!("upload {} failed", f.path))?;
            tree.push(TreeEntry::blob(&f.path, blob.sha));
        }
        tracing::debug!(blobs = tree.len(), "blobs uploaded");

        let new_tree: ShaResponse = read_json(
            self.http
                .post(self.url(&format!("{base}/trees")))
                .json(&serde_json::json!({ "base_tree": commit.tree.sha, "tree": tree }))
                .send()
                .await,
            "create tree",
        )
        .await?;

        let new_commit: ShaResponse = read_json(
            self.http
                .post(self.url(&format!("{base}/commits")))
                .json(&serde_json::json!({
                    "message": commit_message(),
                    "tree": new_tree.sha,
                    "parents": [parent_sha],
                }))
                .send()
                .await,
            "create commit",
        )
        .await?;

        let _: RefResponse = read_json(
            self.http
                .patch(self.url(&format!("{base}/refs/{BRANCH_REF}")))
                .json(&serde_json::json!({ "sha": new_commit.sha }))
                .send()
                .await,
            "update ref",
        )
        .await?;

        Ok(new_commit.sha)
    }
}

fn blob_body(content: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "content": general_purpose::STANDARD.encode(content),
        "encoding": "base64",
    })
}

fn commit_message() -> String {
    format!("Update from subtracker v{}", env!("CARGO_PKG_VERSION"))
}

async fn read_json<T: serde::de::DeserializeOwned>(
    res: reqwest::Result<reqwest::Response>,
    stage: &str,
) -> Result<T> {
    let res = res.with_context(|| format!("{stage} request failed"))?;
    let status = res.status();
    let text = res
        .text()
        .await
        .with_context(|| format!("{stage} read body failed"))?;
    if !status.is_success() {
        anyhow::bail!("github {stage} HTTP {status}: {text}");
    }
    serde_json::from_str(&text).with_context(|| format!("github {stage} decode failed: {text}"))
}

pub async fn run(settings: &Settings, opts: ExportOptions) -> Result<()> {
    let root = opts.root.clone();
    let files = tokio::task::spawn_blocking(move || collect_files(&root))
        .await
        .context("join collect task failed")??;

    let bytes: usize = files.iter().map(|f| f.content.len()).sum();
    tracing::info!(root = %opts.root.display(), files = files.len(), bytes, "collected export files");

    let files = match opts.archive.clone() {
        Some(dest) => {
            let (files, dest) = tokio::task::spawn_blocking(move || {
                write_archive(&files, &dest).map(|()| (files, dest))
            })
            .await
            .context("join archive task failed")??;
            tracing::info!(archive = %dest.display(), "archive written");
            files
        }
        None => files,
    };

    if opts.dry_run {
        for f in &files {
            tracing::debug!(path = %f.path, bytes = f.content.len(), "would export");
        }
        tracing::info!(dry_run = true, repo = %opts.repo, "skipping github push");
        return Ok(());
    }

    let client = GithubClient::from_settings(settings)?;
    let full_name = client.ensure_repo(&opts.repo).await?;
    let commit_sha = client.push_files(&full_name, &files).await?;

    tracing::info!(
        repo = %full_name,
        %commit_sha,
        url = %format!("https://github.com/{full_name}"),
        "export complete"
    );
    Ok(())
}
