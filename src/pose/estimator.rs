use anyhow::Result;

use super::landmark::PoseLandmarks;
use crate::camera::VideoFrame;

/// 姿勢推定器
///
/// 推論スレッドに move されて使われる。
/// `Ok(None)` は「人物が検出されなかった」を意味し、エラーではない。
pub trait PoseEstimator: Send {
    fn estimate(&mut self, frame: &VideoFrame) -> Result<Option<PoseLandmarks>>;
}

impl<F> PoseEstimator for F
where
    F: FnMut(&VideoFrame) -> Result<Option<PoseLandmarks>> + Send,
{
    fn estimate(&mut self, frame: &VideoFrame) -> Result<Option<PoseLandmarks>> {
        self(frame)
    }
}
