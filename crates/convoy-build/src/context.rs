use crate::assets;
use crate::error::{BuildError, BuildResult};
use crate::resolver::{self, Executables};
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::path::{Path, PathBuf};
use tar::Builder;
use tempfile::TempDir;

pub const STAGING_PREFIX: &str = "convoy-build";

/// ステージング済みのビルドコンテキスト
///
/// Dockerfile, entrypoint.sh, consul, envoy の4ファイルだけを含む。
/// 破棄の仕方は [`StagedContext::persist`] か [`StagedContext::cleanup`] で明示する。
#[derive(Debug)]
pub struct StagedContext {
    dir: TempDir,
}

impl StagedContext {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// ディレクトリをディスクに残してパスを返す
    pub fn persist(self) -> PathBuf {
        self.dir.keep()
    }

    /// ディレクトリを削除
    pub fn cleanup(self) -> BuildResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|e| BuildError::staging(path, e))
    }
}

/// ビルドコンテキストのステージング
pub struct ContextStager {
    temp_root: PathBuf,
}

impl ContextStager {
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
        }
    }

    /// 一時ディレクトリを作成してアセットと実行ファイルをコピー
    pub fn stage(&self, executables: &Executables) -> BuildResult<StagedContext> {
        // ディレクトリを作る前に入力を確認する
        let sources = [
            (resolver::CONSUL, executables.consul.as_path()),
            (resolver::ENVOY, executables.envoy.as_path()),
        ];
        for (name, path) in sources {
            if !path.is_file() {
                return Err(BuildError::ExecutableMissing {
                    name: name.to_string(),
                    path: path.to_path_buf(),
                });
            }
        }

        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.temp_root)
            .map_err(|e| BuildError::staging(&self.temp_root, e))?;
        tracing::debug!("Staging build context in: {}", dir.path().display());

        for name in assets::ASSET_NAMES {
            let dst = dir.path().join(name);
            fs::write(&dst, assets::read_asset(name)?)
                .map_err(|e| BuildError::staging(&dst, e))?;
        }

        for (name, src) in sources {
            let content = fs::read(src).map_err(|e| BuildError::staging(src, e))?;
            let dst = dir.path().join(name);
            write_executable(&dst, &content).map_err(|e| BuildError::staging(&dst, e))?;
            tracing::debug!(
                "Copied {} ({} bytes) from {}",
                name,
                content.len(),
                src.display()
            );
        }

        Ok(StagedContext { dir })
    }
}

#[cfg(unix)]
fn write_executable(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, content)?;
    // umaskの影響を受けないよう明示的に設定
    fs::set_permissions(path, fs::Permissions::from_mode(0o777))
}

#[cfg(not(unix))]
fn write_executable(path: &Path, content: &[u8]) -> std::io::Result<()> {
    fs::write(path, content)
}

/// エンジンに送信するtar.gzアーカイブ
#[derive(Debug, Clone)]
pub struct BuildArchive {
    data: Bytes,
}

impl BuildArchive {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Vec<u8>> for BuildArchive {
    fn from(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }
}

pub struct ContextBuilder;

impl ContextBuilder {
    /// ビルドコンテキストをtar.gzアーカイブとして作成
    pub fn create_context(context_path: &Path) -> BuildResult<BuildArchive> {
        tracing::debug!("Creating build context from: {}", context_path.display());

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            // パーミッションを保持したまま再帰的に追加
            tar.append_dir_all(".", context_path)
                .map_err(BuildError::Archive)?;

            tar.into_inner()
                .and_then(|encoder| encoder.finish())
                .map_err(BuildError::Archive)?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());

        Self::check_context_size(archive_data.len());

        Ok(archive_data.into())
    }

    /// コンテキストサイズのチェックと警告
    fn check_context_size(size: usize) {
        const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

        if size > MAX_CONTEXT_SIZE {
            tracing::warn!(
                "Build context is large ({}MB); consul and envoy binaries are sent as-is",
                size / 1024 / 1024
            );
        }
    }
}
