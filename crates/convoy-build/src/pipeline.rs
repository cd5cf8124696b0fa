//! ステージング → アーカイブ → ビルド → ログ判定 を順番に実行する

use crate::builder::ImageBuilder;
use crate::context::ContextStager;
use crate::engine::BuildEngine;
use crate::error::BuildResult;
use crate::resolver::Executables;
use std::io::Write;
use std::path::PathBuf;

/// ビルドの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub tag: &'static str,
    /// ディスクに残したステージングディレクトリ（`cleanup` 有効時は `None`）
    pub context_dir: Option<PathBuf>,
}

/// 1回分のビルドを実行
///
/// どの段階のエラーもそのまま返し、リトライはしない。
pub async fn run<E, W>(
    builder: &ImageBuilder<E>,
    executables: &Executables,
    out: &mut W,
) -> BuildResult<BuildOutcome>
where
    E: BuildEngine,
    W: Write + Send + ?Sized,
{
    let config = builder.config();
    config.validate()?;

    let staged = ContextStager::new(&config.temp_root).stage(executables)?;
    tracing::info!("Build context staged at: {}", staged.path().display());

    let result = builder.build_image(&staged, out).await;

    // 失敗時もコンテキストの扱いは同じ
    let context_dir = if config.cleanup {
        if let Err(e) = staged.cleanup() {
            tracing::warn!("{}", e);
        }
        None
    } else {
        let path = staged.persist();
        tracing::debug!("Build context left at: {}", path.display());
        Some(path)
    };

    result?;

    Ok(BuildOutcome {
        tag: config.request().options.tag,
        context_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::testing::{FakeEngine, Response};
    use crate::config::BuildConfig;
    use crate::error::BuildError;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    const SUCCESS: &[&str] = &[
        r#"{"stream":"Step 1/7 : FROM debian:bookworm-slim"}"#,
        r#"{"stream":"Successfully tagged consul-envoy:local"}"#,
    ];

    fn executables(dir: &Path) -> Executables {
        let consul = dir.join("consul");
        let envoy = dir.join("envoy");
        fs::write(&consul, b"consul-binary").unwrap();
        fs::write(&envoy, b"envoy-binary").unwrap();
        Executables { consul, envoy }
    }

    fn temp_root() -> (TempDir, BuildConfig) {
        let root = tempdir().unwrap();
        let config = BuildConfig::default().with_temp_root(root.path());
        (root, config)
    }

    #[tokio::test]
    async fn test_run_leaves_context_on_disk() {
        let bin = tempdir().unwrap();
        let (root, config) = temp_root();
        let builder = ImageBuilder::new(FakeEngine::lines(SUCCESS), config);

        let mut out = Vec::new();
        let outcome = run(&builder, &executables(bin.path()), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome.tag, "consul-envoy:local");
        let dir = outcome.context_dir.unwrap();
        assert!(dir.starts_with(root.path()));
        assert_eq!(fs::read(dir.join("consul")).unwrap(), b"consul-binary");
        assert_eq!(fs::read(dir.join("envoy")).unwrap(), b"envoy-binary");
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{}\n{}\n", SUCCESS[0], SUCCESS[1])
        );
    }

    #[tokio::test]
    async fn test_run_with_cleanup_removes_context() {
        let bin = tempdir().unwrap();
        let (root, config) = temp_root();
        let builder = ImageBuilder::new(FakeEngine::lines(SUCCESS), config.with_cleanup(true));

        let outcome = run(&builder, &executables(bin.path()), &mut Vec::new())
            .await
            .unwrap();

        assert!(outcome.context_dir.is_none());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_run_missing_executable_stages_nothing() {
        let bin = tempdir().unwrap();
        let (root, config) = temp_root();
        let builder = ImageBuilder::new(FakeEngine::lines(SUCCESS), config);
        let executables = Executables {
            consul: bin.path().join("consul"),
            envoy: bin.path().join("envoy"),
        };

        let err = run(&builder, &executables, &mut Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::ExecutableMissing { .. }));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
        assert!(builder.engine().requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_build_failure_keeps_context() {
        let bin = tempdir().unwrap();
        let (root, config) = temp_root();
        let engine = FakeEngine::lines(&[
            r#"{"stream":"Step 5/7 : RUN chmod 0755 /usr/local/bin/entrypoint.sh"}"#,
            r#"{"error":"The command '/bin/sh -c chmod' returned a non-zero code: 1","errorDetail":{"message":"The command '/bin/sh -c chmod' returned a non-zero code: 1"}}"#,
        ]);
        let builder = ImageBuilder::new(engine, config);

        let err = run(&builder, &executables(bin.path()), &mut Vec::new())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "The command '/bin/sh -c chmod' returned a non-zero code: 1"
        );
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let bin = tempdir().unwrap();
        let (_root, config) = temp_root();
        let builder = ImageBuilder::new(
            FakeEngine::new(Response::Hang(Vec::new())),
            config.with_deadline(Duration::from_millis(20)),
        );

        let err = run(&builder, &executables(bin.path()), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_run_invalid_config() {
        let bin = tempdir().unwrap();
        let (root, config) = temp_root();
        let builder = ImageBuilder::new(
            FakeEngine::lines(SUCCESS),
            config.with_deadline(Duration::ZERO),
        );

        let err = run(&builder, &executables(bin.path()), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfig(_)));
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
