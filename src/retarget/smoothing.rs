use nalgebra::UnitQuaternion;

use super::Side;

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// 片腕ぶんの平滑化済みスカラー
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ArmSmoothing {
    /// 左腕基準の符号に揃えた yaw（左右で共通）
    pub yaw: f32,
    pub pitch: f32,
    pub bend: f32,
}

impl ArmSmoothing {
    /// 指数平滑。初期値はレストポーズ (0) なので最初の数フレームで追いつく
    pub fn blend(&mut self, yaw: f32, pitch: f32, alpha: f32) {
        self.yaw = lerp(self.yaw, yaw, alpha);
        self.pitch = lerp(self.pitch, pitch, alpha);
    }

    pub fn blend_bend(&mut self, bend: f32, alpha: f32) {
        self.bend = lerp(self.bend, bend, alpha);
    }
}

/// フレームをまたいで保持する平滑化状態
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothingState {
    pub left: ArmSmoothing,
    pub right: ArmSmoothing,
}

impl SmoothingState {
    pub fn arm_mut(&mut self, side: Side) -> &mut ArmSmoothing {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// `current` から `target` へ割合 `t` だけ近づけた回転
///
/// 対蹠に近い組で slerp が定義できない場合は近い方へ寄せる。
pub fn damp_toward(current: UnitQuaternion<f32>, target: UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    current
        .try_slerp(&target, t, 1e-6)
        .unwrap_or(if t < 0.5 { current } else { target })
}
