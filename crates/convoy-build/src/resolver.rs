use crate::error::{BuildError, BuildResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const CONSUL: &str = "consul";
pub const ENVOY: &str = "envoy";

/// 解決済みの実行ファイルパス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executables {
    pub consul: PathBuf,
    pub envoy: PathBuf,
}

/// 実行ファイルのパスを解決
pub struct ExecutableResolver {
    search_path: Option<OsString>,
}

impl ExecutableResolver {
    /// 環境変数 PATH を検索対象にする
    pub fn from_env() -> Self {
        Self {
            search_path: std::env::var_os("PATH"),
        }
    }

    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    /// 実行ファイルを解決
    ///
    /// 優先順位:
    /// 1. 明示的な指定（存在しなければエラー）
    /// 2. PATH 上の最初に見つかった実行可能ファイル
    pub fn resolve(&self, name: &str, explicit: Option<&Path>) -> BuildResult<PathBuf> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(absolute(path));
            }
            return Err(BuildError::ExecutableMissing {
                name: name.to_string(),
                path: path.to_path_buf(),
            });
        }

        let search_path = self.search_path.as_deref().unwrap_or_default();
        for dir in std::env::split_paths(search_path) {
            if dir.as_os_str().is_empty() {
                continue;
            }
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                tracing::debug!("Found {} at: {}", name, candidate.display());
                return Ok(absolute(&candidate));
            }
        }

        Err(BuildError::ExecutableNotFound {
            name: name.to_string(),
        })
    }

    /// consul と envoy の両方を解決
    pub fn resolve_all(
        &self,
        consul: Option<&Path>,
        envoy: Option<&Path>,
    ) -> BuildResult<Executables> {
        Ok(Executables {
            consul: self.resolve(CONSUL, consul)?,
            envoy: self.resolve(ENVOY, envoy)?,
        })
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
