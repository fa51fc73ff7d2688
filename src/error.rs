use thiserror::Error;

/// パイプライン境界で発生するエラー
///
/// どれも致命的ではない。ドライバはステータス文字列として表示し、
/// アプリ自体は動き続ける。
#[derive(Debug, Error)]
pub enum PipelineError {
    /// アバターのアセットが読めない／パースできない
    #[error("asset load failed ({path}): {reason}")]
    AssetLoad { path: String, reason: String },

    /// カメラが拒否された、または存在しない
    #[error("capture unavailable: {0}")]
    CaptureDenied(String),

    /// 推論器の初期化・実行失敗
    #[error("pose estimator failed: {0}")]
    Estimator(String),
}

impl PipelineError {
    pub fn asset_load(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::AssetLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// UIに出す短いステータス文字列
    pub fn status_text(&self) -> String {
        match self {
            Self::AssetLoad { reason, .. } => format!("Model load failed: {}", reason),
            Self::CaptureDenied(reason) => format!("Camera unavailable: {}", reason),
            Self::Estimator(reason) => format!("Pose estimator error: {}", reason),
        }
    }
}
