#[cfg(feature = "desktop")]
pub mod capture;

#[cfg(feature = "desktop")]
pub use capture::{frame_to_mat, OpenCvCapture};

use crate::error::PipelineError;

/// キャプチャ済みフレーム（RGB8, 行優先）
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// 新フレームが到着するたびに増える番号
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl VideoFrame {
    pub fn new(id: u64, width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { id, width, height, rgb }
    }
}

/// カメラデバイス
///
/// `start` と `stop` は対で呼ぶ。`stop` は `start` が成功していなくても安全に呼べること。
pub trait CaptureDevice: Send + Sync {
    fn start(&mut self) -> Result<(), PipelineError>;

    fn stop(&mut self);

    /// 最新フレーム。初回フレーム到着前は None
    fn latest_frame(&self) -> Option<VideoFrame>;
}
