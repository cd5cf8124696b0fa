//! 埋め込みアセット
//!
//! ビルドレシピ (Dockerfile) とエントリポイントはバイナリに同梱され、
//! 実行時にファイルシステムへ依存しない。

use crate::error::{BuildError, BuildResult};

pub const DOCKERFILE: &str = "Dockerfile";
pub const ENTRYPOINT: &str = "entrypoint.sh";

const DOCKERFILE_BYTES: &[u8] = include_bytes!("../assets/Dockerfile");
const ENTRYPOINT_BYTES: &[u8] = include_bytes!("../assets/entrypoint.sh");

/// 同梱されているアセット名の一覧
pub const ASSET_NAMES: [&str; 2] = [DOCKERFILE, ENTRYPOINT];

/// 名前からアセットの内容を取得
pub fn read_asset(name: &str) -> BuildResult<&'static [u8]> {
    match name {
        DOCKERFILE => Ok(DOCKERFILE_BYTES),
        ENTRYPOINT => Ok(ENTRYPOINT_BYTES),
        other => Err(BuildError::AssetNotFound(other.to_string())),
    }
}
