//! コンテナエンジンとの境界
//!
//! [`BuildEngine`] はアーカイブを送信し、ビルドログの行ストリームを返すだけで
//! ビルドの成否は判定しない。判定は [`crate::log`] が行う。

use crate::config::BuildRequest;
use crate::context::BuildArchive;
use crate::error::{BuildError, BuildResult};
use crate::log::StructuredBuildError;
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::BuildInfo;
use bollard::query_parameters::BuildImageOptionsBuilder;
use futures_util::stream::{self, BoxStream, StreamExt};
use http_body_util::{Either, Full};
use serde::Serialize;

/// ビルドログの行ストリーム
///
/// ドロップされた時点で下層の接続も解放される。
/// 接続を持つエンジンより長くは生存できない。
pub type BuildLogStream<'a> = BoxStream<'a, std::io::Result<String>>;

#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// ビルドリクエストを送信
    ///
    /// 成功はエンジンがリクエストを受け付けたことだけを意味する。
    async fn submit<'a>(
        &'a self,
        archive: BuildArchive,
        request: &BuildRequest,
    ) -> BuildResult<BuildLogStream<'a>>;
}

/// Docker Engine API を使うビルドエンジン
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl BuildEngine for DockerEngine {
    async fn submit<'a>(
        &'a self,
        archive: BuildArchive,
        request: &BuildRequest,
    ) -> BuildResult<BuildLogStream<'a>> {
        let mut builder = BuildImageOptionsBuilder::default()
            .dockerfile(request.options.dockerfile)
            .t(request.options.tag)
            .rm(request.options.remove);
        if !request.labels.is_empty() {
            builder = builder.labels(&request.labels);
        }
        let options = builder.build();

        tracing::debug!("Build options: {:?}", options);
        tracing::info!(
            "Submitting build context ({} bytes) for {}",
            archive.len(),
            request.options.tag
        );

        let body = Full::new(archive.into_bytes());
        let mut stream = self
            .docker
            .build_image(options, None, Some(Either::Left(body)))
            .boxed();

        // 最初のイベントより前のエラーは送信の失敗として扱う
        let first = match stream.next().await {
            Some(Err(e)) if !is_build_error(&e) => return Err(BuildError::DockerConnection(e)),
            first => first,
        };

        Ok(stream::iter(first).chain(stream).map(into_log_line).boxed())
    }
}

fn is_build_error(err: &bollard::errors::Error) -> bool {
    matches!(err, bollard::errors::Error::DockerStreamError { .. })
}

/// ワイヤ上のビルドイベント
///
/// `BuildInfo` はシリアライズできないため、エンジンが送るJSONと
/// 同じフィールド順・同じキー名で書き戻すための写し。
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress_detail: Option<WireProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_detail: Option<WireErrorDetail<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aux: Option<WireImageId<'a>>,
}

#[derive(Serialize)]
struct WireProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<i64>,
}

#[derive(Serialize)]
struct WireErrorDetail<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

#[derive(Serialize)]
struct WireImageId<'a> {
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
}

impl<'a> From<&'a BuildInfo> for WireEvent<'a> {
    fn from(info: &'a BuildInfo) -> Self {
        Self {
            stream: info.stream.as_deref(),
            status: info.status.as_deref(),
            progress_detail: info.progress_detail.as_ref().map(|p| WireProgress {
                current: p.current,
                total: p.total,
            }),
            progress: info.progress.as_deref(),
            id: info.id.as_deref(),
            error_detail: info.error_detail.as_ref().map(|d| WireErrorDetail {
                code: d.code,
                message: d.message.as_deref(),
            }),
            error: info.error.as_deref(),
            aux: info
                .aux
                .as_ref()
                .map(|aux| WireImageId { id: aux.id.as_deref() }),
        }
    }
}

/// ビルドイベントを1行のJSONに戻す
fn into_log_line(item: Result<BuildInfo, bollard::errors::Error>) -> std::io::Result<String> {
    match item {
        Ok(info) => serde_json::to_string(&WireEvent::from(&info)).map_err(std::io::Error::other),
        // bollardがエラーイベントをErrに変換した場合も、ワイヤ上と同じ形に戻す
        Err(bollard::errors::Error::DockerStreamError { error }) => {
            Ok(StructuredBuildError::new(error).to_line())
        }
        Err(e) => Err(std::io::Error::other(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// エンジンが送る行をデコードして書き戻すと元と同じ行になる
    fn echo(line: &str) -> String {
        let info: BuildInfo = serde_json::from_str(line).unwrap();
        into_log_line(Ok(info)).unwrap()
    }

    #[test]
    fn test_stream_event_is_echoed_as_sent() {
        let line = r#"{"stream":"Step 1/7 : FROM debian:bookworm-slim\n"}"#;
        let echoed = echo(line);
        assert_eq!(echoed, line);
        assert!(!echoed.contains('\n'));
        assert_eq!(StructuredBuildError::decode(&echoed), None);
    }

    #[test]
    fn test_progress_event_is_echoed_as_sent() {
        let line = r#"{"status":"Downloading","progressDetail":{"current":1024,"total":4096},"progress":"[==    ] 1.024kB/4.096kB","id":"a1b2c3"}"#;
        assert_eq!(echo(line), line);
    }

    #[test]
    fn test_aux_event_is_echoed_as_sent() {
        let line = r#"{"aux":{"ID":"sha256:3f2a1b9c0d4e"}}"#;
        assert_eq!(echo(line), line);
    }

    #[test]
    fn test_error_event_is_echoed_as_sent() {
        let line = r#"{"errorDetail":{"message":"something failed"},"error":"something failed"}"#;
        let echoed = echo(line);
        assert_eq!(echoed, line);
        assert_eq!(
            StructuredBuildError::decode(&echoed),
            Some(StructuredBuildError::new("something failed"))
        );
    }

    #[test]
    fn test_stream_error_becomes_structured_error_line() {
        let line = into_log_line(Err(bollard::errors::Error::DockerStreamError {
            error: "COPY failed: file not found".to_string(),
        }))
        .unwrap();
        let decoded = StructuredBuildError::decode(&line).unwrap();
        assert_eq!(decoded.error, "COPY failed: file not found");
        assert_eq!(decoded.error_detail.message, "COPY failed: file not found");
    }

    #[test]
    fn test_other_errors_are_read_failures() {
        let err = bollard::errors::Error::IOError {
            err: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe"),
        };
        assert!(!is_build_error(&err));
        assert!(into_log_line(Err(err)).is_err());
    }

    #[tokio::test]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_submit_to_local_docker() {
        use crate::log::interpret_build_log;
        use std::fs;
        use tempfile::tempdir;

        let docker = Docker::connect_with_local_defaults().unwrap();
        let engine = DockerEngine::new(docker);

        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("Dockerfile"),
            "FROM alpine:latest\nRUN false",
        )
        .unwrap();
        let archive = crate::context::ContextBuilder::create_context(temp_dir.path()).unwrap();

        let lines = engine
            .submit(archive, &BuildRequest::default())
            .await
            .unwrap();
        let mut out = Vec::new();
        let result = interpret_build_log(lines, &mut out).await;
        assert!(matches!(result, Err(BuildError::BuildFailed { .. })));
    }
}
