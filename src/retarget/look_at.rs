//! 注視方向によるリターゲット
//!
//! ボーンの +Z を次の関節へ向ける。ワールドでの向きを親ローカル
//! (`parent_world⁻¹ * world`) に直し、ローカル回転をそこへ寄せる。

use nalgebra::{UnitQuaternion, Vector3};
use std::f32::consts::PI;

use super::{direction, drive, resolve_bone, FrameReport, Limb, RetargetStrategy, Side};
use crate::config::LookAtConfig;
use crate::pose::{BodyPoints, Joint};
use crate::skeleton::{BoneId, BoneMap, BoneRole, Skeleton};

/// +Z を `dir` に向ける最小回転
///
/// 水平な `dir` では上方向を +Y に保つ `face_towards` と一致する。鉛直付近でもロールが連続する。
/// 不連続点は真後ろ (-Z) だけで、そこは +Y 軸まわりの半回転にする。
pub fn look_rotation(dir: &Vector3<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::rotation_between(&Vector3::z(), dir)
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::y_axis(), PI))
}

pub struct LookAtStrategy {
    config: LookAtConfig,
    min_segment: f32,
}

impl LookAtStrategy {
    pub fn new(config: LookAtConfig, min_segment: f32) -> Self {
        Self { config, min_segment }
    }

    /// 符号補正後の単位方向。補正で潰れた場合は None
    fn corrected(&self, v: &Vector3<f32>) -> Option<Vector3<f32>> {
        v.component_mul(&Vector3::from(self.config.axis_sign)).try_normalize(1e-6)
    }

    /// 書き込んだら true
    fn aim(&self, skeleton: &mut Skeleton, id: BoneId, v: &Vector3<f32>, damping: f32, report: &mut FrameReport) -> bool {
        let Some(dir) = self.corrected(v) else {
            report.degenerate += 1;
            return false;
        };
        let world = look_rotation(&dir);
        let parent_world = skeleton
            .parent(id)
            .map(|p| skeleton.world_rotation(p))
            .unwrap_or_else(UnitQuaternion::identity);
        drive(skeleton, id, parent_world.inverse() * world, damping, report);
        true
    }

    fn spine(&self, points: &BodyPoints, bones: &BoneMap, skeleton: &mut Skeleton, report: &mut FrameReport) {
        let hips = points.midpoint(Joint::LeftHip, Joint::RightHip);
        let shoulders = points.midpoint(Joint::LeftShoulder, Joint::RightShoulder);
        let Some(v) = direction(hips, shoulders, self.min_segment, report) else {
            return;
        };
        if let Some(id) = resolve_bone(bones, BoneRole::Spine, report) {
            self.aim(skeleton, id, &v, self.config.spine_damping, report);
        }
    }

    fn head(&self, points: &BodyPoints, bones: &BoneMap, skeleton: &mut Skeleton, report: &mut FrameReport) {
        let eyes = points.midpoint(Joint::LeftEye, Joint::RightEye);
        let Some(v) = direction(eyes, points.get(Joint::Nose), self.min_segment, report) else {
            return;
        };
        if let Some(id) = resolve_bone(bones, BoneRole::Neck, report) {
            self.aim(skeleton, id, &v, self.config.neck_damping, report);
        }
        if let Some(id) = resolve_bone(bones, BoneRole::Head, report) {
            self.aim(skeleton, id, &v, self.config.head_damping, report);
        }
    }

    fn arm(&self, side: Side, points: &BodyPoints, bones: &BoneMap, skeleton: &mut Skeleton, report: &mut FrameReport) {
        let (shoulder, elbow, wrist) = side.joints();
        let (upper_role, fore_role, hand_role) = side.roles();

        if let Some(v) = direction(points.get(shoulder), points.get(elbow), self.min_segment, report) {
            if let Some(id) = resolve_bone(bones, upper_role, report) {
                self.aim(skeleton, id, &v, self.config.upper_arm_damping, report);
            }
        }

        let Some(v) = direction(points.get(elbow), points.get(wrist), self.min_segment, report) else {
            return;
        };
        let Some(fore) = resolve_bone(bones, fore_role, report) else {
            return;
        };
        if !self.aim(skeleton, fore, &v, self.config.forearm_damping, report) {
            return;
        }

        // 手は前腕のローカル回転に追従
        if let Some(hand) = resolve_bone(bones, hand_role, report) {
            let target = skeleton.local_rotation(fore);
            drive(skeleton, hand, target, self.config.hand_follow, report);
        }
    }
}

impl RetargetStrategy for LookAtStrategy {
    fn name(&self) -> &'static str {
        "look_at"
    }

    fn retarget(
        &mut self,
        limb: Limb,
        points: &BodyPoints,
        bones: &BoneMap,
        skeleton: &mut Skeleton,
        report: &mut FrameReport,
    ) {
        match limb {
            Limb::Spine => self.spine(points, bones, skeleton, report),
            Limb::Head => self.head(points, bones, skeleton, report),
            Limb::LeftArm => self.arm(Side::Left, points, bones, skeleton, report),
            Limb::RightArm => self.arm(Side::Right, points, bones, skeleton, report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::tests::arm_rig;
    use crate::skeleton::BoneNames;
    use std::f32::consts::FRAC_PI_2;

    fn strategy(axis_sign: [f32; 3]) -> LookAtStrategy {
        LookAtStrategy::new(
            LookAtConfig {
                axis_sign,
                ..LookAtConfig::default()
            },
            1e-4,
        )
    }

    fn run(s: &mut LookAtStrategy, points: &BodyPoints, skeleton: &mut Skeleton, frames: usize) -> FrameReport {
        let bones = BoneMap::resolve(skeleton, &BoneNames::default());
        let mut report = FrameReport::default();
        for _ in 0..frames {
            report = FrameReport::default();
            for limb in Limb::ALL {
                s.retarget(limb, points, &bones, skeleton, &mut report);
            }
        }
        report
    }

    #[test]
    fn test_look_rotation_maps_forward_axis() {
        for dir in [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.3, -0.5, 0.8).normalize(),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, -1.0),
        ] {
            let q = look_rotation(&dir);
            let z = q * Vector3::z();
            assert!((z - dir).norm() < 1e-5, "{:?} -> {:?}", dir, z);
            assert!(q.coords.iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn test_look_rotation_matches_face_towards_when_level() {
        for dir in [Vector3::new(1.0, 0.0, 0.0), Vector3::new(-0.6, 0.0, 0.8), Vector3::new(0.0, 0.0, 1.0)] {
            let q = look_rotation(&dir);
            let expected = UnitQuaternion::face_towards(&dir, &Vector3::y());
            assert!(q.angle_to(&expected) < 1e-4, "{:?}", dir);
        }
    }

    #[test]
    fn test_look_rotation_has_no_roll_jump_near_vertical() {
        // 鉛直のまわりでわずかにずれた方向どうしは、ほぼ同じ回転になる
        for y in [1.0f32, -1.0] {
            let dirs: Vec<Vector3<f32>> = [
                Vector3::new(0.0, y, 0.0),
                Vector3::new(0.0009, y, 0.0),
                Vector3::new(0.0011, y, 0.0),
                Vector3::new(-0.0011, y, 0.0),
                Vector3::new(0.0, y, 0.0011),
                Vector3::new(0.0, y, -0.0011),
            ]
            .iter()
            .map(|v| v.normalize())
            .collect();
            for a in &dirs {
                for b in &dirs {
                    let jump = look_rotation(a).angle_to(&look_rotation(b));
                    assert!(jump < 0.01, "{:?} vs {:?}: {}", a, b, jump);
                }
            }
        }
    }

    #[test]
    fn test_local_rotation_is_relative_to_rotated_parent() {
        let mut skeleton = arm_rig();
        let chest = skeleton.find("DEF-chest").unwrap();
        skeleton.set_local_rotation(chest, UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2));
        let upper = skeleton.find("DEF-upper_armL").unwrap();

        let mut points = BodyPoints::default();
        let shoulder = Vector3::new(-0.2, 0.4, 0.0);
        let v = Vector3::new(0.3, -0.2, 0.1);
        points.set(Joint::LeftShoulder, shoulder);
        points.set(Joint::LeftElbow, shoulder + v);

        let mut s = strategy([-1.0, -1.0, 1.0]);
        run(&mut s, &points, &mut skeleton, 200);

        // ワールドで +Z が符号補正後の方向を向く
        let expected = Vector3::new(-0.3, 0.2, 0.1).normalize();
        let forward = skeleton.world_rotation(upper) * Vector3::z();
        assert!((forward - expected).norm() < 1e-3, "{:?}", forward);

        // 親の回転はローカルに含まれない
        let local_forward = skeleton.local_rotation(upper) * Vector3::z();
        assert!((local_forward - expected).norm() > 0.1);
    }

    #[test]
    fn test_single_frame_is_damped() {
        let mut skeleton = arm_rig();
        let upper = skeleton.find("DEF-upper_armL").unwrap();
        let mut points = BodyPoints::default();
        points.set(Joint::LeftShoulder, Vector3::zeros());
        points.set(Joint::LeftElbow, Vector3::new(-0.3, 0.0, 0.0));

        let mut s = strategy([1.0, 1.0, 1.0]);
        run(&mut s, &points, &mut skeleton, 1);
        let target = look_rotation(&Vector3::new(-1.0, 0.0, 0.0));
        let moved = skeleton.local_rotation(upper).angle();
        assert!(moved > 0.0);
        assert!((moved - target.angle() * 0.22).abs() < 1e-4);
    }

    #[test]
    fn test_hanging_arm_has_no_nan() {
        let mut skeleton = arm_rig();
        let mut points = BodyPoints::default();
        points.set(Joint::LeftShoulder, Vector3::zeros());
        points.set(Joint::LeftElbow, Vector3::new(0.0, -0.3, 0.0));
        points.set(Joint::LeftWrist, Vector3::new(0.0, -0.6, 0.0));
        let mut s = strategy([-1.0, -1.0, 1.0]);
        run(&mut s, &points, &mut skeleton, 30);
        for (id, _) in skeleton.bones() {
            assert!(skeleton.local_rotation(id).coords.iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn test_degenerate_and_collapsed_directions_are_skipped() {
        let mut skeleton = arm_rig();
        let mut points = BodyPoints::default();
        let p = Vector3::new(0.1, 0.1, 0.1);
        points.set(Joint::LeftShoulder, p);
        points.set(Joint::LeftElbow, p);
        let mut s = strategy([-1.0, -1.0, 1.0]);
        let report = run(&mut s, &points, &mut skeleton, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.degenerate, 1);

        // 軸補正で長さ0になる方向
        points.set(Joint::LeftElbow, p + Vector3::new(0.3, 0.0, 0.0));
        let mut s = strategy([0.0, 1.0, 1.0]);
        let report = run(&mut s, &points, &mut skeleton, 1);
        assert_eq!(report.degenerate, 1);
        for (id, _) in skeleton.bones() {
            assert_eq!(skeleton.local_rotation(id), UnitQuaternion::identity());
        }
    }

    #[test]
    fn test_hand_follows_forearm() {
        let mut skeleton = arm_rig();
        let fore = skeleton.find("DEF-forearmR").unwrap();
        let hand = skeleton.find("DEF-handR").unwrap();
        let mut points = BodyPoints::default();
        points.set(Joint::RightShoulder, Vector3::new(0.2, 0.4, 0.0));
        points.set(Joint::RightElbow, Vector3::new(0.5, 0.4, 0.0));
        points.set(Joint::RightWrist, Vector3::new(0.5, 0.7, 0.1));
        let mut s = strategy([-1.0, -1.0, 1.0]);
        run(&mut s, &points, &mut skeleton, 300);
        let f = skeleton.local_rotation(fore);
        assert!(f.angle() > 0.1);
        assert!(skeleton.local_rotation(hand).angle_to(&f) < 1e-3);
    }

    #[test]
    fn test_spine_and_head_targets() {
        let mut skeleton = arm_rig();
        let spine = skeleton.find("DEF-spine").unwrap();
        let neck = skeleton.find("DEF-neck").unwrap();
        let head = skeleton.find("DEF-head").unwrap();

        let mut points = BodyPoints::default();
        points.set(Joint::LeftHip, Vector3::new(-0.1, -0.5, 0.0));
        points.set(Joint::RightHip, Vector3::new(0.1, -0.5, 0.0));
        points.set(Joint::LeftShoulder, Vector3::new(-0.2, 0.4, 0.1));
        points.set(Joint::RightShoulder, Vector3::new(0.2, 0.4, 0.1));
        points.set(Joint::LeftEye, Vector3::new(-0.03, 0.7, 0.0));
        points.set(Joint::RightEye, Vector3::new(0.03, 0.7, 0.0));
        points.set(Joint::Nose, Vector3::new(0.0, 0.65, 0.1));

        let mut s = strategy([1.0, 1.0, 1.0]);
        run(&mut s, &points, &mut skeleton, 400);

        let spine_dir = Vector3::new(0.0, 0.9, 0.1).normalize();
        assert!((skeleton.world_rotation(spine) * Vector3::z() - spine_dir).norm() < 1e-3);

        let face_dir = Vector3::new(0.0, -0.05, 0.1).normalize();
        assert!((skeleton.world_rotation(head) * Vector3::z() - face_dir).norm() < 1e-2);
        assert!(skeleton.local_rotation(neck).angle() > 0.1);
    }
}
