use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::pose::{LandmarkSchema, MirrorMode};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub landmarks: LandmarkConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub retarget: RetargetConfig,
    /// 論理ボーン名 → 物理ボーン候補名（例: `left_hand = ["mixamorig:LeftHand"]`）
    #[serde(default)]
    pub bones: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// 描画ループの目標FPS
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    /// アバター (.glb / .gltf)
    #[serde(default = "default_asset_path")]
    pub asset_path: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// 推論の遅延がこれを超えたらログに出す（ミリ秒）。結果はそのまま使う
    #[serde(default = "default_slow_inference_ms")]
    pub slow_inference_ms: u64,
    #[serde(default)]
    pub model: ModelConfig,
}

fn default_target_fps() -> u32 { 60 }
fn default_asset_path() -> String { "models/avatar.glb".to_string() }
fn default_log_dir() -> String { "logs".to_string() }
fn default_slow_inference_ms() -> u64 { 300 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
            asset_path: default_asset_path(),
            log_dir: default_log_dir(),
            slow_inference_ms: default_slow_inference_ms(),
            model: ModelConfig::default(),
        }
    }
}

/// ランドマークモデル (ONNX)
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_path")]
    pub path: String,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_landmark_output")]
    pub landmark_output: String,
    #[serde(default = "default_presence_output")]
    pub presence_output: String,
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold: f32,
}

fn default_model_path() -> String { "models/pose_landmark_full.onnx".to_string() }
fn default_input_name() -> String { "input_1".to_string() }
fn default_landmark_output() -> String { "Identity".to_string() }
fn default_presence_output() -> String { "Identity_1".to_string() }
fn default_presence_threshold() -> f32 { 0.5 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            input_name: default_input_name(),
            landmark_output: default_landmark_output(),
            presence_output: default_presence_output(),
            presence_threshold: default_presence_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_fps() -> u32 { 30 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LandmarkConfig {
    /// 自撮り（鏡像）表示なら mirrored
    #[serde(default = "default_mirror")]
    pub mirror: MirrorMode,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default = "default_depth_scale")]
    pub depth_scale: f32,
    /// これ未満の可視性のランドマークは欠損扱い
    #[serde(default = "default_min_visibility")]
    pub min_visibility: f32,
    #[serde(default)]
    pub schema: LandmarkSchema,
}

fn default_mirror() -> MirrorMode { MirrorMode::Mirrored }
fn default_scale() -> f32 { 2.0 }
fn default_depth_scale() -> f32 { 2.0 }
fn default_min_visibility() -> f32 { 0.5 }

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            mirror: default_mirror(),
            scale: default_scale(),
            depth_scale: default_depth_scale(),
            min_visibility: default_min_visibility(),
            schema: LandmarkSchema::default(),
        }
    }
}

/// One Euro フィルタ（正規化済みランドマーク位置）
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_cutoff")]
    pub min_cutoff: f32,
    #[serde(default = "default_beta")]
    pub beta: f32,
    #[serde(default = "default_d_cutoff")]
    pub d_cutoff: f32,
}

fn default_true() -> bool { true }
fn default_min_cutoff() -> f32 { 1.5 }
fn default_beta() -> f32 { 0.3 }
fn default_d_cutoff() -> f32 { 1.0 }

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            min_cutoff: default_min_cutoff(),
            beta: default_beta(),
            d_cutoff: default_d_cutoff(),
        }
    }
}

/// リターゲット方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// 上腕ベクトルから pitch/yaw/肘の曲がりを分解
    Angle,
    /// 次の関節へボーンを向ける
    LookAt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetargetConfig {
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    /// これより短い肢ベクトルは退化として更新をスキップ
    #[serde(default = "default_min_segment")]
    pub min_segment: f32,
    #[serde(default)]
    pub angle: AngleConfig,
    #[serde(default)]
    pub look_at: LookAtConfig,
}

fn default_strategy() -> StrategyKind { StrategyKind::Angle }
fn default_min_segment() -> f32 { 1e-4 }

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            min_segment: default_min_segment(),
            angle: AngleConfig::default(),
            look_at: LookAtConfig::default(),
        }
    }
}

/// 角度分解方式のパラメータ（角度はラジアン）
#[derive(Debug, Clone, Deserialize)]
pub struct AngleConfig {
    #[serde(default = "default_gain")]
    pub pitch_gain: f32,
    #[serde(default = "default_gain")]
    pub yaw_gain: f32,
    #[serde(default = "default_max_pitch")]
    pub max_pitch: f32,
    #[serde(default = "default_max_yaw")]
    pub max_yaw: f32,
    #[serde(default = "default_max_bend")]
    pub max_bend: f32,
    /// 肘がまっすぐでも残る角度を差し引く
    #[serde(default = "default_bend_offset")]
    pub bend_offset: f32,
    /// pitch/yaw の指数平滑係数
    #[serde(default = "default_arm_alpha")]
    pub arm_alpha: f32,
    #[serde(default = "default_bend_alpha")]
    pub bend_alpha: f32,
    #[serde(default = "default_bend_gain")]
    pub bend_gain: f32,
    #[serde(default = "default_upper_arm_damping")]
    pub upper_arm_damping: f32,
    #[serde(default = "default_forearm_damping")]
    pub forearm_damping: f32,
    /// 手首へ伝える上腕 pitch/yaw の割合
    #[serde(default = "default_hand_follow")]
    pub hand_follow: f32,
    #[serde(default = "default_hand_damping")]
    pub hand_damping: f32,
}

fn default_gain() -> f32 { 1.0 }
fn default_max_pitch() -> f32 { 2.4 }
fn default_max_yaw() -> f32 { 1.3 }
fn default_max_bend() -> f32 { 2.0 }
fn default_bend_offset() -> f32 { 0.2 }
fn default_arm_alpha() -> f32 { 0.18 }
fn default_bend_alpha() -> f32 { 0.25 }
fn default_bend_gain() -> f32 { 0.8 }
fn default_upper_arm_damping() -> f32 { 0.25 }
fn default_forearm_damping() -> f32 { 0.2 }
fn default_hand_follow() -> f32 { 0.4 }
fn default_hand_damping() -> f32 { 0.18 }

impl Default for AngleConfig {
    fn default() -> Self {
        Self {
            pitch_gain: default_gain(),
            yaw_gain: default_gain(),
            max_pitch: default_max_pitch(),
            max_yaw: default_max_yaw(),
            max_bend: default_max_bend(),
            bend_offset: default_bend_offset(),
            arm_alpha: default_arm_alpha(),
            bend_alpha: default_bend_alpha(),
            bend_gain: default_bend_gain(),
            upper_arm_damping: default_upper_arm_damping(),
            forearm_damping: default_forearm_damping(),
            hand_follow: default_hand_follow(),
            hand_damping: default_hand_damping(),
        }
    }
}

/// look-at 方式のパラメータ
#[derive(Debug, Clone, Deserialize)]
pub struct LookAtConfig {
    /// 方向ベクトルへの軸ごとの符号補正（リグの前方軸の向きに合わせる）
    #[serde(default = "default_axis_sign")]
    pub axis_sign: [f32; 3],
    #[serde(default = "default_upper_arm_look")]
    pub upper_arm_damping: f32,
    #[serde(default = "default_forearm_look")]
    pub forearm_damping: f32,
    /// 手は前腕のローカル回転を追従
    #[serde(default = "default_hand_look")]
    pub hand_follow: f32,
    #[serde(default = "default_spine_look")]
    pub spine_damping: f32,
    #[serde(default = "default_neck_look")]
    pub neck_damping: f32,
    #[serde(default = "default_head_look")]
    pub head_damping: f32,
}

fn default_axis_sign() -> [f32; 3] { [-1.0, -1.0, 1.0] }
fn default_upper_arm_look() -> f32 { 0.22 }
fn default_forearm_look() -> f32 { 0.25 }
fn default_hand_look() -> f32 { 0.3 }
fn default_spine_look() -> f32 { 0.15 }
fn default_neck_look() -> f32 { 0.1 }
fn default_head_look() -> f32 { 0.15 }

impl Default for LookAtConfig {
    fn default() -> Self {
        Self {
            axis_sign: default_axis_sign(),
            upper_arm_damping: default_upper_arm_look(),
            forearm_damping: default_forearm_look(),
            hand_follow: default_hand_look(),
            spine_damping: default_spine_look(),
            neck_damping: default_neck_look(),
            head_damping: default_head_look(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DebugConfig {
    /// 1秒ごとのFPSログ
    #[serde(default = "default_true")]
    pub log_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_fps: default_true(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        let config: Config = toml::from_str(&content).context("Failed to parse config")?;
        Ok(config)
    }

    /// ファイルがない・壊れている場合は既定値。理由を併せて返す
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<String>) {
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(format!("{:#}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.app.target_fps, 60);
        assert_eq!(config.app.slow_inference_ms, 300);
        assert_eq!(config.landmarks.mirror, MirrorMode::Mirrored);
        assert_eq!(config.landmarks.min_visibility, 0.5);
        assert_eq!(config.retarget.strategy, StrategyKind::Angle);
        assert_eq!(config.retarget.angle.arm_alpha, 0.18);
        assert_eq!(config.retarget.look_at.axis_sign, [-1.0, -1.0, 1.0]);
        assert!(config.bones.is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let text = r#"
            [landmarks]
            mirror = "direct"

            [landmarks.schema]
            left_wrist = 19

            [retarget]
            strategy = "look_at"

            [retarget.angle]
            max_pitch = 1.3

            [bones]
            left_hand = ["mixamorig:LeftHand"]
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.landmarks.mirror, MirrorMode::Direct);
        assert_eq!(config.landmarks.scale, 2.0);
        assert_eq!(config.landmarks.schema.left_wrist, 19);
        assert_eq!(config.landmarks.schema.right_wrist, 16);
        assert_eq!(config.retarget.strategy, StrategyKind::LookAt);
        assert_eq!(config.retarget.angle.max_pitch, 1.3);
        assert_eq!(config.retarget.angle.max_yaw, 1.3);
        assert_eq!(config.bones["left_hand"], vec!["mixamorig:LeftHand".to_string()]);
    }

    #[test]
    fn test_unknown_strategy_is_error() {
        let text = "[retarget]\nstrategy = \"ik\"\n";
        assert!(toml::from_str::<Config>(text).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let (config, reason) = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.camera.width, 640);
        assert!(reason.unwrap().contains("exist.toml"));
    }
}
