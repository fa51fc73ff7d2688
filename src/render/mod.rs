pub mod overlay;
pub mod projection;
#[cfg(feature = "desktop")]
pub mod window;

pub use projection::Projection;
#[cfg(feature = "desktop")]
pub use window::MinifbRenderer;

use anyhow::Result;
use nalgebra::Point3;

use crate::skeleton::Skeleton;

/// 1回の描画に必要なもの。ボーン状態はリターゲット完了後に取り出す
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub status: String,
    /// 親 → 子 のボーン線（ワールド座標）
    pub segments: Vec<[Point3<f32>; 2]>,
    pub joints: Vec<Point3<f32>>,
}

impl Scene {
    /// アバター未ロード時はステータスのみ
    pub fn status_only(status: &str) -> Self {
        Self {
            status: status.to_string(),
            ..Self::default()
        }
    }

    pub fn from_skeleton(skeleton: &Skeleton, status: &str) -> Self {
        let joints = skeleton.world_positions();
        let segments = skeleton
            .bones()
            .filter_map(|(id, bone)| bone.parent.map(|p| [joints[p.index()], joints[id.index()]]))
            .collect();
        Self {
            status: status.to_string(),
            segments,
            joints,
        }
    }
}

/// 描画先
///
/// 描画ループのスレッドからのみ使う（Send は要求しない）。
pub trait SceneRenderer {
    fn render(&mut self, scene: &Scene) -> Result<()>;

    /// ユーザーがウィンドウを閉じたら false
    fn is_open(&self) -> bool;

    /// ウィンドウ等を解放する。複数回呼ばれてもよい
    fn release(&mut self);
}

/// 何も描かないレンダラー（ヘッドレス実行用）
#[derive(Debug, Default)]
pub struct NullRenderer {
    pub frames: usize,
    pub released: bool,
}

impl SceneRenderer for NullRenderer {
    fn render(&mut self, _scene: &Scene) -> Result<()> {
        if !self.released {
            self.frames += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.released
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::tests::arm_rig;

    #[test]
    fn test_scene_from_skeleton() {
        let s = arm_rig();
        let scene = Scene::from_skeleton(&s, "Pose detected");
        assert_eq!(scene.joints.len(), s.len());
        // ルート以外のボーンごとに1本
        assert_eq!(scene.segments.len(), s.len() - s.roots().len());
        assert_eq!(scene.status, "Pose detected");

        let hand = s.find("DEF-handL").unwrap();
        let fore = s.find("DEF-forearmL").unwrap();
        assert!(scene
            .segments
            .iter()
            .any(|[a, b]| *a == scene.joints[fore.index()] && *b == scene.joints[hand.index()]));
    }

    #[test]
    fn test_null_renderer_release() {
        let mut r = NullRenderer::default();
        r.render(&Scene::status_only("Initializing...")).unwrap();
        r.release();
        r.release();
        r.render(&Scene::default()).unwrap();
        assert_eq!(r.frames, 1);
        assert!(!r.is_open());
    }
}
