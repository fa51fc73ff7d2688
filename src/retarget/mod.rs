//! ランドマーク → ボーンのローカル回転
//!
//! フレームをまたぐ状態（ランドマークフィルタ、方式ごとの平滑化値）はエンジンが持つ。
//! ボーンは親から順に書くので、親のワールド回転を読む方式も今フレームの値を見る。

pub mod angle;
pub mod look_at;
pub mod smoothing;

pub use angle::{arm_angles, AngleStrategy, ArmAngles};
pub use look_at::LookAtStrategy;
pub use smoothing::{damp_toward, ArmSmoothing, SmoothingState};

use nalgebra::{UnitQuaternion, Vector3};

use crate::config::{Config, StrategyKind};
use crate::pose::{segment, BodyPoints, Joint, LandmarkFilter, LandmarkSchema, Normalizer, PoseLandmarks};
use crate::skeleton::{BoneId, BoneMap, BoneRole, Skeleton};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// 右側は yaw を反転
    pub fn sign(self) -> f32 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }

    /// (肩, 肘, 手首)
    pub fn joints(self) -> (Joint, Joint, Joint) {
        match self {
            Side::Left => (Joint::LeftShoulder, Joint::LeftElbow, Joint::LeftWrist),
            Side::Right => (Joint::RightShoulder, Joint::RightElbow, Joint::RightWrist),
        }
    }

    /// (上腕, 前腕, 手)
    pub fn roles(self) -> (BoneRole, BoneRole, BoneRole) {
        match self {
            Side::Left => (BoneRole::LeftUpperArm, BoneRole::LeftForearm, BoneRole::LeftHand),
            Side::Right => (BoneRole::RightUpperArm, BoneRole::RightForearm, BoneRole::RightHand),
        }
    }
}

/// 1回の `retarget` 呼び出しで扱う単位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limb {
    Spine,
    Head,
    LeftArm,
    RightArm,
}

impl Limb {
    /// 親ボーンが先
    pub const ALL: [Limb; 4] = [Limb::Spine, Limb::Head, Limb::LeftArm, Limb::RightArm];

    pub fn side(self) -> Option<Side> {
        match self {
            Limb::LeftArm => Some(Side::Left),
            Limb::RightArm => Some(Side::Right),
            Limb::Spine | Limb::Head => None,
        }
    }
}

/// 1フレームの結果。スキップはエラーではなく件数として残す
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub pose_present: bool,
    /// 回転を書き込んだボーン数
    pub updated: usize,
    pub missing_bones: usize,
    pub missing_landmarks: usize,
    pub degenerate: usize,
}

/// リターゲット方式
pub trait RetargetStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `limb` に属するボーンを更新する。必要なボーンやランドマークがなければ何もしない
    fn retarget(
        &mut self,
        limb: Limb,
        points: &BodyPoints,
        bones: &BoneMap,
        skeleton: &mut Skeleton,
        report: &mut FrameReport,
    );
}

pub(crate) fn resolve_bone(bones: &BoneMap, role: BoneRole, report: &mut FrameReport) -> Option<BoneId> {
    let id = bones.get(role);
    if id.is_none() {
        report.missing_bones += 1;
    }
    id
}

/// 目標回転へ減衰付きで近づける
pub(crate) fn drive(
    skeleton: &mut Skeleton,
    id: BoneId,
    target: UnitQuaternion<f32>,
    damping: f32,
    report: &mut FrameReport,
) {
    let next = damp_toward(skeleton.local_rotation(id), target, damping);
    skeleton.set_local_rotation(id, next);
    report.updated += 1;
}

/// `start → end` の肢ベクトル。欠損・退化はレポートに数えて None
pub(crate) fn direction(
    start: Option<Vector3<f32>>,
    end: Option<Vector3<f32>>,
    min_len: f32,
    report: &mut FrameReport,
) -> Option<Vector3<f32>> {
    let (Some(start), Some(end)) = (start, end) else {
        report.missing_landmarks += 1;
        return None;
    };
    let v = segment(start, end, min_len);
    if v.is_none() {
        report.degenerate += 1;
    }
    v
}

pub fn strategy_from_config(config: &Config) -> Box<dyn RetargetStrategy> {
    let retarget = &config.retarget;
    match retarget.strategy {
        StrategyKind::Angle => Box::new(AngleStrategy::new(retarget.angle.clone(), retarget.min_segment)),
        StrategyKind::LookAt => Box::new(LookAtStrategy::new(retarget.look_at.clone(), retarget.min_segment)),
    }
}

pub struct RetargetEngine {
    normalizer: Normalizer,
    schema: LandmarkSchema,
    min_visibility: f32,
    filter: Option<LandmarkFilter>,
    strategy: Box<dyn RetargetStrategy>,
}

impl RetargetEngine {
    pub fn new(
        normalizer: Normalizer,
        schema: LandmarkSchema,
        min_visibility: f32,
        strategy: Box<dyn RetargetStrategy>,
    ) -> Self {
        Self {
            normalizer,
            schema,
            min_visibility,
            filter: None,
            strategy,
        }
    }

    pub fn with_filter(mut self, filter: LandmarkFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let engine = Self::new(
            Normalizer::from_config(&config.landmarks),
            config.landmarks.schema.clone(),
            config.landmarks.min_visibility,
            strategy_from_config(config),
        );
        if config.filter.enabled {
            engine.with_filter(LandmarkFilter::from_config(&config.filter))
        } else {
            engine
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// 1フレーム分の更新
    ///
    /// `landmarks` が None（人物なし）のフレームでは何も書き込まず、アバターは直前の姿勢を保つ。
    pub fn update(
        &mut self,
        landmarks: Option<&PoseLandmarks>,
        bones: &BoneMap,
        skeleton: &mut Skeleton,
        dt: f32,
    ) -> FrameReport {
        let mut report = FrameReport::default();
        let Some(pose) = landmarks else {
            return report;
        };

        let mut points = self.normalizer.body_points(pose, &self.schema, self.min_visibility);
        if points.is_empty() {
            return report;
        }
        report.pose_present = true;

        if let Some(filter) = self.filter.as_mut() {
            filter.apply(&mut points, dt);
        }

        for limb in Limb::ALL {
            self.strategy.retarget(limb, &points, bones, skeleton, &mut report);
        }
        report
    }
}
