use crate::config::BuildConfig;
use crate::context::{ContextBuilder, StagedContext};
use crate::engine::BuildEngine;
use crate::error::{BuildError, BuildResult};
use crate::log::interpret_build_log;
use std::io::Write;

pub struct ImageBuilder<E> {
    engine: E,
    config: BuildConfig,
}

impl<E: BuildEngine> ImageBuilder<E> {
    pub fn new(engine: E, config: BuildConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    /// ステージング済みコンテキストからイメージをビルド
    ///
    /// 制限時間は送信からログストリームを読み切って閉じるまでに適用される。
    /// 超過した場合はストリームをドロップして接続を解放し、
    /// [`BuildError::Timeout`] を返す。
    pub async fn build_image<W>(&self, context: &StagedContext, out: &mut W) -> BuildResult<()>
    where
        W: Write + Send + ?Sized,
    {
        let archive = ContextBuilder::create_context(context.path())?;
        let request = self.config.request();

        tracing::info!("Building image: {}", request.options.tag);
        tracing::debug!(
            "Build deadline: {:?}, labels: {:?}",
            self.config.deadline,
            request.labels
        );

        let build = async {
            let lines = self.engine.submit(archive, &request).await?;
            interpret_build_log(lines, out).await
        };

        match tokio::time::timeout(self.config.deadline, build).await {
            Ok(Ok(())) => {
                tracing::info!("Successfully built: {}", request.options.tag);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(
                    "Build of {} cancelled after {:?}",
                    request.options.tag,
                    self.config.deadline
                );
                Err(BuildError::Timeout(self.config.deadline))
            }
        }
    }
}
