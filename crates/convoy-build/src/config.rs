use crate::error::{BuildError, BuildResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const IMAGE_TAG: &str = "consul-envoy:local";
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);
pub const REGISTRY_USER_LABEL: &str = "io.convoy.registry-user";

/// エンジンに渡す固定のビルドオプション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub dockerfile: &'static str,
    pub tag: &'static str,
    /// 中間コンテナを削除
    pub remove: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            dockerfile: crate::assets::DOCKERFILE,
            tag: IMAGE_TAG,
            remove: true,
        }
    }
}

/// 1回のビルドリクエスト
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    pub options: BuildOptions,
    pub labels: HashMap<String, String>,
}

/// 実行時の設定
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// 送信からストリームのクローズまでの制限時間
    pub deadline: Duration,
    /// レジストリ上のユーザーID（ラベルとして付与される）
    pub registry_user: Option<String>,
    /// ステージングディレクトリを作成する場所
    pub temp_root: PathBuf,
    /// ビルド後にステージングディレクトリを削除する
    pub cleanup: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            registry_user: None,
            temp_root: std::env::temp_dir(),
            cleanup: false,
        }
    }
}

impl BuildConfig {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_registry_user(mut self, user: impl Into<String>) -> Self {
        self.registry_user = Some(user.into());
        self
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn validate(&self) -> BuildResult<()> {
        if self.deadline.is_zero() {
            return Err(BuildError::InvalidConfig(
                "build deadline must be greater than zero".to_string(),
            ));
        }

        if let Some(user) = &self.registry_user {
            if user.trim().is_empty() {
                return Err(BuildError::InvalidConfig(
                    "registry user must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// 設定からビルドリクエストを組み立てる
    pub fn request(&self) -> BuildRequest {
        let mut labels = HashMap::new();
        if let Some(user) = &self.registry_user {
            labels.insert(REGISTRY_USER_LABEL.to_string(), user.clone());
        }

        BuildRequest {
            options: BuildOptions::default(),
            labels,
        }
    }
}
