use crate::pose::LandmarkIndex;

/// ランドマーク間の接続 (開始, 終了)
pub const LANDMARK_CONNECTIONS: [(LandmarkIndex, LandmarkIndex); 16] = [
    // 顔
    (LandmarkIndex::LeftEar, LandmarkIndex::LeftEye),
    (LandmarkIndex::LeftEye, LandmarkIndex::Nose),
    (LandmarkIndex::Nose, LandmarkIndex::RightEye),
    (LandmarkIndex::RightEye, LandmarkIndex::RightEar),
    // 上半身
    (LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder),
    (LandmarkIndex::LeftShoulder, LandmarkIndex::LeftElbow),
    (LandmarkIndex::LeftElbow, LandmarkIndex::LeftWrist),
    (LandmarkIndex::RightShoulder, LandmarkIndex::RightElbow),
    (LandmarkIndex::RightElbow, LandmarkIndex::RightWrist),
    (LandmarkIndex::LeftWrist, LandmarkIndex::LeftIndex),
    (LandmarkIndex::RightWrist, LandmarkIndex::RightIndex),
    // 胴体
    (LandmarkIndex::LeftShoulder, LandmarkIndex::LeftHip),
    (LandmarkIndex::RightShoulder, LandmarkIndex::RightHip),
    (LandmarkIndex::LeftHip, LandmarkIndex::RightHip),
    // 下半身（膝まで）
    (LandmarkIndex::LeftHip, LandmarkIndex::LeftKnee),
    (LandmarkIndex::RightHip, LandmarkIndex::RightKnee),
];

/// ランドマークの色 (RGB)
pub const LANDMARK_COLOR: u32 = 0x00FF00; // 緑

/// 接続線の色 (RGB)
pub const CONNECTION_COLOR: u32 = 0xFFFF00; // 黄色

/// 可視性が低いランドマークの色 (RGB)
pub const LOW_VISIBILITY_COLOR: u32 = 0xFF0000; // 赤

/// アバターのボーン線
pub const BONE_COLOR: u32 = 0x40C0FF;

/// アバターの関節点
pub const JOINT_COLOR: u32 = 0xFFFFFF;

pub const BACKGROUND_COLOR: u32 = 0x202020;
