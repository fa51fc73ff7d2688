use serde::Deserialize;

/// 推論モデルの 33 ランドマークインデックス
///
/// 値はモデル側の出力仕様で決まっている。推測で並べ替えないこと。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0, 画像左が0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0, 画像上が0)
    pub y: f32,
    /// 腰中心基準の相対深度 (Xと同スケール, カメラ側が負)
    pub z: f32,
    /// 可視性スコア (0.0〜1.0)
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    pub fn is_valid(&self, threshold: f32) -> bool {
        self.visibility >= threshold && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// ピクセル座標に変換
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        ((self.x * width as f32) as i32, (self.y * height as f32) as i32)
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

/// 1フレーム分の推論結果（人物検出あり）
///
/// 「人物なし」は `Option<PoseLandmarks>` の `None` で表す。
#[derive(Debug, Clone, PartialEq)]
pub struct PoseLandmarks {
    pub landmarks: Vec<Landmark>,
}

impl PoseLandmarks {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    /// インデックス指定。モデルの出力点数が少ない場合は None
    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }

    pub fn average_visibility(&self) -> f32 {
        if self.landmarks.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.landmarks.iter().map(|l| l.visibility).sum();
        sum / self.landmarks.len() as f32
    }
}

/// リターゲットで使う関節
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
}

impl Joint {
    pub const COUNT: usize = 11;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
    ];

    pub fn slot(self) -> usize {
        self as usize
    }
}

/// 関節 → ランドマークインデックスの対応表
///
/// モデルのバージョンが変わった場合に config.toml の `[landmarks.schema]` で上書きする。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LandmarkSchema {
    #[serde(default = "default_nose")]
    pub nose: usize,
    #[serde(default = "default_left_eye")]
    pub left_eye: usize,
    #[serde(default = "default_right_eye")]
    pub right_eye: usize,
    #[serde(default = "default_left_shoulder")]
    pub left_shoulder: usize,
    #[serde(default = "default_right_shoulder")]
    pub right_shoulder: usize,
    #[serde(default = "default_left_elbow")]
    pub left_elbow: usize,
    #[serde(default = "default_right_elbow")]
    pub right_elbow: usize,
    #[serde(default = "default_left_wrist")]
    pub left_wrist: usize,
    #[serde(default = "default_right_wrist")]
    pub right_wrist: usize,
    #[serde(default = "default_left_hip")]
    pub left_hip: usize,
    #[serde(default = "default_right_hip")]
    pub right_hip: usize,
}

fn default_nose() -> usize { LandmarkIndex::Nose as usize }
fn default_left_eye() -> usize { LandmarkIndex::LeftEye as usize }
fn default_right_eye() -> usize { LandmarkIndex::RightEye as usize }
fn default_left_shoulder() -> usize { LandmarkIndex::LeftShoulder as usize }
fn default_right_shoulder() -> usize { LandmarkIndex::RightShoulder as usize }
fn default_left_elbow() -> usize { LandmarkIndex::LeftElbow as usize }
fn default_right_elbow() -> usize { LandmarkIndex::RightElbow as usize }
fn default_left_wrist() -> usize { LandmarkIndex::LeftWrist as usize }
fn default_right_wrist() -> usize { LandmarkIndex::RightWrist as usize }
fn default_left_hip() -> usize { LandmarkIndex::LeftHip as usize }
fn default_right_hip() -> usize { LandmarkIndex::RightHip as usize }

impl Default for LandmarkSchema {
    fn default() -> Self {
        Self {
            nose: default_nose(),
            left_eye: default_left_eye(),
            right_eye: default_right_eye(),
            left_shoulder: default_left_shoulder(),
            right_shoulder: default_right_shoulder(),
            left_elbow: default_left_elbow(),
            right_elbow: default_right_elbow(),
            left_wrist: default_left_wrist(),
            right_wrist: default_right_wrist(),
            left_hip: default_left_hip(),
            right_hip: default_right_hip(),
        }
    }
}

impl LandmarkSchema {
    pub fn index_of(&self, joint: Joint) -> usize {
        match joint {
            Joint::Nose => self.nose,
            Joint::LeftEye => self.left_eye,
            Joint::RightEye => self.right_eye,
            Joint::LeftShoulder => self.left_shoulder,
            Joint::RightShoulder => self.right_shoulder,
            Joint::LeftElbow => self.left_elbow,
            Joint::RightElbow => self.right_elbow,
            Joint::LeftWrist => self.left_wrist,
            Joint::RightWrist => self.right_wrist,
            Joint::LeftHip => self.left_hip,
            Joint::RightHip => self.right_hip,
        }
    }

    pub fn lookup<'a>(&self, pose: &'a PoseLandmarks, joint: Joint) -> Option<&'a Landmark> {
        pose.get(self.index_of(joint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_matches_model_indices() {
        let schema = LandmarkSchema::default();
        assert_eq!(schema.index_of(Joint::LeftShoulder), 11);
        assert_eq!(schema.index_of(Joint::RightShoulder), 12);
        assert_eq!(schema.index_of(Joint::LeftElbow), 13);
        assert_eq!(schema.index_of(Joint::RightWrist), 16);
        assert_eq!(schema.index_of(Joint::LeftEye), 2);
        assert_eq!(schema.index_of(Joint::RightEye), 5);
        assert_eq!(schema.index_of(Joint::LeftHip), 23);
        assert_eq!(schema.index_of(Joint::RightHip), 24);
    }

    #[test]
    fn test_schema_override_from_toml() {
        let schema: LandmarkSchema = toml::from_str("left_shoulder = 5\nright_shoulder = 6").unwrap();
        assert_eq!(schema.left_shoulder, 5);
        assert_eq!(schema.right_shoulder, 6);
        // 未指定は既定値
        assert_eq!(schema.left_elbow, 13);
    }

    #[test]
    fn test_lookup_out_of_range() {
        let pose = PoseLandmarks::new(vec![Landmark::new(0.5, 0.5, 0.0, 1.0); 17]);
        let schema = LandmarkSchema::default();
        assert!(schema.lookup(&pose, Joint::LeftShoulder).is_some());
        assert!(schema.lookup(&pose, Joint::LeftHip).is_none());
    }

    #[test]
    fn test_landmark_is_valid() {
        assert!(Landmark::new(0.5, 0.5, 0.0, 0.7).is_valid(0.5));
        assert!(!Landmark::new(0.5, 0.5, 0.0, 0.3).is_valid(0.5));
        assert!(!Landmark::new(f32::NAN, 0.5, 0.0, 1.0).is_valid(0.5));
    }

    #[test]
    fn test_landmark_to_pixel() {
        let lm = Landmark::new(0.5, 0.25, 0.0, 1.0);
        assert_eq!(lm.to_pixel(640, 480), (320, 120));
    }

    #[test]
    fn test_joint_slots_are_dense() {
        for (i, j) in Joint::ALL.iter().enumerate() {
            assert_eq!(j.slot(), i);
        }
    }
}
