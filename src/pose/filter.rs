use nalgebra::Vector3;

use super::landmark::Joint;
use super::normalize::BodyPoints;
use crate::config::FilterConfig;

/// 平滑化係数 `alpha = r / (r + 1)`、`r = 2π · cutoff · dt`
fn alpha(dt: f32, cutoff: f32) -> f32 {
    let r = 2.0 * std::f32::consts::PI * cutoff * dt;
    r / (r + 1.0)
}

/// 1軸ぶんの One Euro 状態
#[derive(Debug, Clone, Copy, Default)]
struct AxisState {
    /// (平滑化済みの値, 平滑化済みの速度)
    last: Option<(f32, f32)>,
}

impl AxisState {
    fn step(&mut self, value: f32, dt: f32, min_cutoff: f32, beta: f32, d_cutoff: f32) -> f32 {
        let Some((prev, prev_dx)) = self.last else {
            self.last = Some((value, 0.0));
            return value;
        };
        let raw_dx = (value - prev) / dt;
        let a_d = alpha(dt, d_cutoff);
        let dx = prev_dx + a_d * (raw_dx - prev_dx);
        let a = alpha(dt, min_cutoff + beta * dx.abs());
        let out = prev + a * (value - prev);
        self.last = Some((out, dx));
        out
    }
}

/// 正規化済みランドマーク位置に関節ごとの One Euro フィルタをかける
///
/// そのフレームに無い関節は状態を保持し、次に現れたときはそこから続ける。
pub struct LandmarkFilter {
    min_cutoff: f32,
    beta: f32,
    d_cutoff: f32,
    joints: [[AxisState; 3]; Joint::COUNT],
}

/// dt が0以下のときに使う
const FALLBACK_DT: f32 = 1.0 / 30.0;

impl LandmarkFilter {
    pub fn new(min_cutoff: f32, beta: f32, d_cutoff: f32) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            joints: [[AxisState::default(); 3]; Joint::COUNT],
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.min_cutoff, config.beta, config.d_cutoff)
    }

    pub fn apply(&mut self, points: &mut BodyPoints, dt: f32) {
        let dt = if dt > 0.0 && dt.is_finite() { dt } else { FALLBACK_DT };
        for joint in Joint::ALL {
            let Some(p) = points.get(joint) else {
                continue;
            };
            let (min_cutoff, beta, d_cutoff) = (self.min_cutoff, self.beta, self.d_cutoff);
            let axes = &mut self.joints[joint.slot()];
            let filtered = Vector3::from_fn(|i, _| axes[i].step(p[i], dt, min_cutoff, beta, d_cutoff));
            points.set(joint, filtered);
        }
    }
}
