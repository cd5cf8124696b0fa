//! ビルドログの解釈
//!
//! エンジンのビルドAPIは失敗時もHTTP 200のまま進捗行を流し続け、
//! 失敗は最終行に埋め込まれた構造化エラーでのみ通知される。
//! そのためストリームを最後まで読み、最終行だけを判定に使う。

use crate::error::{BuildError, BuildResult};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Deserializer, Serialize};
use std::io::Write;

/// `{"error": "...", "errorDetail": {"message": "..."}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredBuildError {
    #[serde(default, deserialize_with = "null_as_default")]
    pub error: String,
    #[serde(default, rename = "errorDetail", deserialize_with = "null_as_default")]
    pub error_detail: ErrorDetail,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl StructuredBuildError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error_detail: ErrorDetail {
                message: message.clone(),
            },
            error: message,
        }
    }

    /// ログ行をデコード。構造化エラーでなければ `None`
    pub fn decode(line: &str) -> Option<Self> {
        serde_json::from_str::<Self>(line)
            .ok()
            .filter(|e| !e.error.is_empty())
    }

    pub fn to_line(&self) -> String {
        // 2つのStringフィールドだけなのでシリアライズは失敗しない
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"error\":{:?}}}", self.error))
    }

    pub fn into_error(self) -> BuildError {
        let detail = Some(self.error_detail.message).filter(|m| !m.is_empty());
        BuildError::BuildFailed {
            message: self.error,
            detail,
        }
    }
}

/// ビルドログを最後まで読み、成否を判定
///
/// 各行は受信順に `out` へそのまま書き出す。保持するのは直近の1行のみ。
/// 読み取りエラーは [`BuildError::Transport`]、最終行が構造化エラーなら
/// [`BuildError::BuildFailed`] を返す。
pub async fn interpret_build_log<S, W>(mut lines: S, out: &mut W) -> BuildResult<()>
where
    S: Stream<Item = std::io::Result<String>> + Unpin,
    W: Write + ?Sized,
{
    let mut last_line: Option<String> = None;
    let mut count = 0usize;

    while let Some(line) = lines.next().await {
        let line = line.map_err(|e| {
            tracing::debug!("Build log stream failed after {} lines: {}", count, e);
            BuildError::Transport(e)
        })?;

        writeln!(out, "{}", line).map_err(BuildError::Transport)?;
        out.flush().map_err(BuildError::Transport)?;

        count += 1;
        last_line = Some(line);
    }

    tracing::debug!("Build log finished: {} lines", count);

    match last_line.as_deref().and_then(StructuredBuildError::decode) {
        Some(error) => {
            if error.error_detail.message != error.error {
                tracing::debug!("Build error detail: {}", error.error_detail.message);
            }
            Err(error.into_error())
        }
        None => Ok(()),
    }
}
