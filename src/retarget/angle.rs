//! 角度分解による腕のリターゲット
//!
//! 腕ごとにピッチ（下ろした状態からの挙上）とヨー（横振り）、肘の曲げ角を求める。
//! 指数平滑してから `Ry(yaw) * Rx(pitch)` を目標にボーンを寄せる。
//! 体幹と頭はこの方式では動かさない。

use nalgebra::{UnitQuaternion, Vector3};
use std::f32::consts::FRAC_PI_2;

use super::smoothing::SmoothingState;
use super::{direction, drive, resolve_bone, FrameReport, Limb, RetargetStrategy, Side};
use crate::config::AngleConfig;
use crate::pose::BodyPoints;
use crate::skeleton::{BoneMap, Skeleton};

/// 1フレーム分の生の角度（クランプ済み、平滑化前）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmAngles {
    /// 左腕基準の符号。右腕は反転して格納する
    pub yaw: f32,
    pub pitch: f32,
    /// 前腕が取れないフレームは None
    pub bend: Option<f32>,
}

fn clamp_symmetric(v: f32, limit: f32) -> f32 {
    let limit = limit.abs();
    v.clamp(-limit, limit)
}

/// `upper` は非退化であること（`segment` を通したもの）
pub fn arm_angles(upper: &Vector3<f32>, fore: Option<&Vector3<f32>>, side: Side, config: &AngleConfig) -> ArmAngles {
    let d = upper.normalize();

    // 真下 (-Y) が 0、真上が π
    let elevation = FRAC_PI_2 + d.y.clamp(-1.0, 1.0).asin();
    let pitch = clamp_symmetric(config.pitch_gain * elevation, config.max_pitch);

    let swing = d.x.clamp(-1.0, 1.0).asin();
    let yaw = clamp_symmetric(side.sign() * config.yaw_gain * swing, config.max_yaw);

    let bend = fore.map(|f| (upper.angle(f) - config.bend_offset).clamp(0.0, config.max_bend.max(0.0)));

    ArmAngles { yaw, pitch, bend }
}

/// yaw（鉛直軸）→ pitch（水平軸）、ロールなし。右腕は yaw を反転
pub fn arm_target(yaw: f32, pitch: f32, side: Side) -> UnitQuaternion<f32> {
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), side.sign() * yaw)
        * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), pitch)
}

pub struct AngleStrategy {
    config: AngleConfig,
    min_segment: f32,
    state: SmoothingState,
}

impl AngleStrategy {
    pub fn new(config: AngleConfig, min_segment: f32) -> Self {
        Self {
            config,
            min_segment,
            state: SmoothingState::default(),
        }
    }

    pub fn state(&self) -> &SmoothingState {
        &self.state
    }

    fn drive_arm(
        &mut self,
        side: Side,
        points: &BodyPoints,
        bones: &BoneMap,
        skeleton: &mut Skeleton,
        report: &mut FrameReport,
    ) {
        let (shoulder, elbow, wrist) = side.joints();
        let Some(upper) = direction(points.get(shoulder), points.get(elbow), self.min_segment, report) else {
            return;
        };
        let fore = direction(points.get(elbow), points.get(wrist), self.min_segment, report);
        let angles = arm_angles(&upper, fore.as_ref(), side, &self.config);

        let arm = self.state.arm_mut(side);
        arm.blend(angles.yaw, angles.pitch, self.config.arm_alpha);
        if let Some(bend) = angles.bend {
            arm.blend_bend(bend, self.config.bend_alpha);
        }
        let arm = *arm;
        let cfg = &self.config;
        let (upper_role, fore_role, hand_role) = side.roles();

        if let Some(id) = resolve_bone(bones, upper_role, report) {
            drive(skeleton, id, arm_target(arm.yaw, arm.pitch, side), cfg.upper_arm_damping, report);
        }

        if angles.bend.is_some() {
            if let Some(id) = resolve_bone(bones, fore_role, report) {
                let target = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), arm.bend * cfg.bend_gain);
                drive(skeleton, id, target, cfg.forearm_damping, report);
            }
        }

        if let Some(id) = resolve_bone(bones, hand_role, report) {
            let target = arm_target(arm.yaw * cfg.hand_follow, arm.pitch * cfg.hand_follow, side);
            drive(skeleton, id, target, cfg.hand_damping, report);
        }
    }
}

impl RetargetStrategy for AngleStrategy {
    fn name(&self) -> &'static str {
        "angle"
    }

    fn retarget(
        &mut self,
        limb: Limb,
        points: &BodyPoints,
        bones: &BoneMap,
        skeleton: &mut Skeleton,
        report: &mut FrameReport,
    ) {
        if let Some(side) = limb.side() {
            self.drive_arm(side, points, bones, skeleton, report);
        }
    }
}
