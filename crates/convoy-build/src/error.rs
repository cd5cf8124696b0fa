use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("could not find '{name}' on your path")]
    ExecutableNotFound { name: String },

    #[error("{name} executable not found: {}", path.display())]
    ExecutableMissing { name: String, path: PathBuf },

    #[error("Embedded asset not found: {0}")]
    AssetNotFound(String),

    #[error("Failed to stage build context at {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to archive build context: {0}")]
    Archive(#[source] std::io::Error),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build timed out after {0:?}")]
    Timeout(Duration),

    #[error("Build log stream broken: {0}")]
    Transport(#[source] std::io::Error),

    /// エンジンが返した `error` フィールドをそのまま表示する
    #[error("{message}")]
    BuildFailed {
        message: String,
        detail: Option<String>,
    },

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),
}

impl BuildError {
    pub(crate) fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Staging {
            path: path.into(),
            source,
        }
    }

    /// デッドライン超過かどうか（リクエスト拒否と区別するため）
    pub fn is_timeout(&self) -> bool {
        matches!(self, BuildError::Timeout(_))
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::ExecutableNotFound { name } => {
                format!(
                    "{}\n\
                     \n\
                     解決方法:\n\
                     1. {} をインストールして PATH に追加してください\n\
                     2. --{} オプションでパスを直接指定してください",
                    self, name, name
                )
            }
            BuildError::ExecutableMissing { name, path } => {
                format!(
                    "{} の実行ファイルが見つかりません: {}\n\
                     \n\
                     指定したパスを確認してください。",
                    name,
                    path.display()
                )
            }
            BuildError::DockerConnection(e) => {
                format!(
                    "Dockerへのビルドリクエストに失敗しました: {}\n\
                     \n\
                     解決方法:\n\
                     • Dockerが起動しているか確認してください\n\
                     • DOCKER_HOST の設定を確認してください",
                    e
                )
            }
            BuildError::Timeout(deadline) => {
                format!(
                    "ビルドが {:?} 以内に完了しませんでした\n\
                     \n\
                     --timeout オプションで制限時間を延長できます。",
                    deadline
                )
            }
            BuildError::BuildFailed { message, .. } => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     Dockerfileの内容とビルドログを確認してください。",
                    message
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
