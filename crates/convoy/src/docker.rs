use colored::Colorize;

/// Docker接続を初期化（エラーハンドリング付き）
///
/// 接続先は DOCKER_HOST などの環境変数から決まる。
pub async fn init_docker_with_error_handling() -> anyhow::Result<bollard::Docker> {
    let docker = match bollard::Docker::connect_with_local_defaults() {
        Ok(docker) => docker,
        Err(e) => {
            print_connection_hints(&e);
            return Err(anyhow::anyhow!("Docker接続に失敗しました"));
        }
    };

    // 接続テスト
    match docker.ping().await {
        Ok(_) => {
            tracing::debug!("Connected to Docker");
            Ok(docker)
        }
        Err(e) => {
            print_connection_hints(&e);
            Err(anyhow::anyhow!("Docker接続に失敗しました"))
        }
    }
}

fn print_connection_hints(e: &bollard::errors::Error) {
    eprintln!();
    eprintln!("{}", "✗ Docker接続エラー".red().bold());
    eprintln!();
    eprintln!("{}", "原因:".yellow());
    eprintln!("  {}", e);
    eprintln!();
    eprintln!("{}", "解決方法:".yellow());
    eprintln!("  • Dockerが起動しているか確認してください");
    eprintln!("  • DOCKER_HOST が正しいソケットを指しているか確認してください");
    eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
}
