use nalgebra::Vector3;
use serde::Deserialize;

use super::landmark::{Joint, Landmark, LandmarkSchema, PoseLandmarks};
use crate::config::LandmarkConfig;

/// X軸の扱い
///
/// パイプライン全体で一つの規約だけを使う。
/// - `Mirrored`: 自撮り表示（鏡像）。`x' = (0.5 - x) * scale`
/// - `Direct`: カメラ画像そのまま。`x' = (x - 0.5) * scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorMode {
    Mirrored,
    Direct,
}

impl MirrorMode {
    fn sign(self) -> f32 {
        match self {
            MirrorMode::Mirrored => -1.0,
            MirrorMode::Direct => 1.0,
        }
    }
}

/// 推論モデルの正規化座標 → アバター正面向きの3D座標
///
/// 出力: +X 右, +Y 上, +Z カメラ側（前方）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    pub mirror: MirrorMode,
    pub scale: f32,
    pub depth_scale: f32,
}

impl Normalizer {
    pub fn new(mirror: MirrorMode, scale: f32, depth_scale: f32) -> Self {
        Self { mirror, scale, depth_scale }
    }

    pub fn from_config(config: &LandmarkConfig) -> Self {
        Self::new(config.mirror, config.scale, config.depth_scale)
    }

    pub fn normalize(&self, lm: &Landmark) -> Vector3<f32> {
        Vector3::new(
            (lm.x - 0.5) * self.mirror.sign() * self.scale,
            (0.5 - lm.y) * self.scale,
            -lm.z * self.depth_scale,
        )
    }

    /// スキーマ上の全関節を変換。可視性が閾値未満の関節は欠損扱い
    pub fn body_points(&self, pose: &PoseLandmarks, schema: &LandmarkSchema, min_visibility: f32) -> BodyPoints {
        let mut points = BodyPoints::default();
        for joint in Joint::ALL {
            if let Some(lm) = schema.lookup(pose, joint) {
                if lm.is_valid(min_visibility) {
                    points.set(joint, self.normalize(lm));
                }
            }
        }
        points
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(MirrorMode::Mirrored, 2.0, 2.0)
    }
}

/// 正規化済みの関節座標セット（1フレーム分、保持しない）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyPoints {
    points: [Option<Vector3<f32>>; Joint::COUNT],
}

impl BodyPoints {
    pub fn get(&self, joint: Joint) -> Option<Vector3<f32>> {
        self.points[joint.slot()]
    }

    pub fn set(&mut self, joint: Joint, p: Vector3<f32>) {
        self.points[joint.slot()] = Some(p);
    }

    /// 2関節の中点（どちらか欠損なら None）
    pub fn midpoint(&self, a: Joint, b: Joint) -> Option<Vector3<f32>> {
        Some((self.get(a)? + self.get(b)?) * 0.5)
    }

    pub fn is_empty(&self) -> bool {
        self.points.iter().all(|p| p.is_none())
    }
}

/// `end - start`。長さが `min_len` 未満なら None（正規化でNaNを出さない）
pub fn segment(start: Vector3<f32>, end: Vector3<f32>, min_len: f32) -> Option<Vector3<f32>> {
    let v = end - start;
    let len = v.norm();
    if !len.is_finite() || len < min_len {
        return None;
    }
    Some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_center_maps_to_origin() {
        let n = Normalizer::default();
        let v = n.normalize(&Landmark::new(0.5, 0.5, 0.0, 1.0));
        assert!(approx(v.x, 0.0) && approx(v.y, 0.0) && approx(v.z, 0.0));
    }

    #[test]
    fn test_vertical_inversion() {
        let n = Normalizer::new(MirrorMode::Direct, 2.0, 2.0);
        // 画像上部 (y=0) は +Y
        assert!(approx(n.normalize(&Landmark::new(0.5, 0.0, 0.0, 1.0)).y, 1.0));
        assert!(approx(n.normalize(&Landmark::new(0.5, 1.0, 0.0, 1.0)).y, -1.0));
    }

    #[test]
    fn test_depth_toward_camera_is_positive() {
        let n = Normalizer::new(MirrorMode::Direct, 2.0, 1.5);
        // モデルのzはカメラ側が負
        let v = n.normalize(&Landmark::new(0.5, 0.5, -0.2, 1.0));
        assert!(approx(v.z, 0.3));
    }

    #[test]
    fn test_mirror_modes_are_opposite() {
        let lm = Landmark::new(0.8, 0.5, 0.0, 1.0);
        let m = Normalizer::new(MirrorMode::Mirrored, 2.0, 2.0).normalize(&lm);
        let d = Normalizer::new(MirrorMode::Direct, 2.0, 2.0).normalize(&lm);
        assert!(approx(m.x, -0.6));
        assert!(approx(d.x, 0.6));
    }

    #[test]
    fn test_mirror_applies_uniformly_to_all_joints() {
        // 左右対称な姿勢: 鏡像モードでは全関節のxが同じ符号規則で反転する
        let n = Normalizer::new(MirrorMode::Mirrored, 2.0, 2.0);
        let mut lms = vec![Landmark::new(0.5, 0.5, 0.0, 1.0); 33];
        lms[11] = Landmark::new(0.6, 0.3, 0.0, 1.0); // left shoulder
        lms[12] = Landmark::new(0.4, 0.3, 0.0, 1.0); // right shoulder
        lms[13] = Landmark::new(0.7, 0.5, 0.0, 1.0); // left elbow
        lms[14] = Landmark::new(0.3, 0.5, 0.0, 1.0); // right elbow
        let pts = n.body_points(&PoseLandmarks::new(lms), &LandmarkSchema::default(), 0.5);

        let ls = pts.get(Joint::LeftShoulder).unwrap();
        let rs = pts.get(Joint::RightShoulder).unwrap();
        let le = pts.get(Joint::LeftElbow).unwrap();
        let re = pts.get(Joint::RightElbow).unwrap();
        assert!(approx(ls.x, -rs.x) && approx(le.x, -re.x));
        // 画像右側にある左肩は鏡像で -X 側
        assert!(ls.x < 0.0 && le.x < ls.x);
        // 上腕ベクトルのx成分も左右で符号が逆
        assert!(approx((le - ls).x, -(re - rs).x));
    }

    #[test]
    fn test_low_visibility_joint_is_missing() {
        let n = Normalizer::default();
        let mut lms = vec![Landmark::new(0.5, 0.5, 0.0, 1.0); 33];
        lms[15].visibility = 0.1;
        let pts = n.body_points(&PoseLandmarks::new(lms), &LandmarkSchema::default(), 0.5);
        assert!(pts.get(Joint::LeftWrist).is_none());
        assert!(pts.get(Joint::LeftElbow).is_some());
    }

    #[test]
    fn test_segment_guards_degenerate() {
        let a = Vector3::new(0.1, 0.2, 0.3);
        assert!(segment(a, a, 1e-4).is_none());
        assert!(segment(a, a + Vector3::new(0.0, 1e-6, 0.0), 1e-4).is_none());
        let v = segment(a, a + Vector3::new(0.0, -0.3, 0.0), 1e-4).unwrap();
        assert!(approx(v.y, -0.3));
    }

    #[test]
    fn test_midpoint() {
        let mut pts = BodyPoints::default();
        pts.set(Joint::LeftHip, Vector3::new(-1.0, 0.0, 0.0));
        assert!(pts.midpoint(Joint::LeftHip, Joint::RightHip).is_none());
        pts.set(Joint::RightHip, Vector3::new(1.0, 2.0, 0.0));
        let m = pts.midpoint(Joint::LeftHip, Joint::RightHip).unwrap();
        assert!(approx(m.x, 0.0) && approx(m.y, 1.0));
    }
}
