mod docker;

use clap::Parser;
use colored::Colorize;
use convoy_build::{BuildConfig, BuildError, DockerEngine, ExecutableResolver, ImageBuilder};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "convoy", version)]
#[command(
    about = "consul と envoy をサイドカーイメージ consul-envoy:local にまとめる",
    long_about = None
)]
struct Cli {
    /// consul 実行ファイルのパス（省略時は PATH から検索）
    #[arg(long, env = "CONVOY_CONSUL_PATH", value_name = "PATH")]
    consul: Option<PathBuf>,

    /// envoy 実行ファイルのパス（省略時は PATH から検索）
    #[arg(long, env = "CONVOY_ENVOY_PATH", value_name = "PATH")]
    envoy: Option<PathBuf>,

    /// ビルドの制限時間（秒）
    #[arg(
        long,
        env = "CONVOY_BUILD_TIMEOUT",
        value_name = "SECS",
        default_value_t = 120
    )]
    timeout: u64,

    /// レジストリのユーザーID（イメージのラベルに記録）
    #[arg(long, env = "CONVOY_REGISTRY_USER", value_name = "ID")]
    registry_user: Option<String>,

    /// ビルド後にステージングディレクトリを削除する
    #[arg(long)]
    cleanup: bool,

    /// デバッグログを表示
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn build_config(&self) -> BuildConfig {
        let mut config = BuildConfig::default()
            .with_deadline(Duration::from_secs(self.timeout))
            .with_cleanup(self.cleanup);
        if let Some(user) = &self.registry_user {
            config = config.with_registry_user(user);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdoutはビルドログ専用なので、ログはstderrに出力
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = match e.downcast_ref::<BuildError>() {
                Some(build_error) => build_error.user_message(),
                None => format!("{:#}", e),
            };
            eprintln!();
            eprintln!("{} {}", "✗".red().bold(), message);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // 作業を始める前に実行ファイルを解決する
    let executables = ExecutableResolver::from_env()
        .resolve_all(cli.consul.as_deref(), cli.envoy.as_deref())?;
    tracing::info!("Using consul: {}", executables.consul.display());
    tracing::info!("Using envoy: {}", executables.envoy.display());

    let config = cli.build_config();
    config.validate()?;

    let docker = docker::init_docker_with_error_handling().await?;
    let builder = ImageBuilder::new(DockerEngine::new(docker), config);

    let mut stdout = std::io::stdout();
    let outcome = convoy_build::run(&builder, &executables, &mut stdout).await?;

    eprintln!();
    eprintln!(
        "{} {}",
        "✓".green().bold(),
        format!("Successfully built {}", outcome.tag).green()
    );
    if let Some(dir) = outcome.context_dir {
        eprintln!("  build context: {}", dir.display().to_string().dimmed());
    }

    Ok(())
}
