//! Convoy image build pipeline
//!
//! consul と envoy の実行ファイルを一時ディレクトリにステージングし、
//! Docker のビルドAPIへ送信して `consul-envoy:local` イメージを作成する。
//! ビルドの成否はログストリームの最終行で判定する。

pub mod assets;
pub mod builder;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod log;
pub mod pipeline;
pub mod resolver;

pub use builder::ImageBuilder;
pub use config::{BuildConfig, BuildOptions, BuildRequest};
pub use context::{BuildArchive, ContextBuilder, ContextStager, StagedContext};
pub use engine::{BuildEngine, BuildLogStream, DockerEngine};
pub use error::{BuildError, BuildResult};
pub use log::{StructuredBuildError, interpret_build_log};
pub use pipeline::{BuildOutcome, run};
pub use resolver::{ExecutableResolver, Executables};
