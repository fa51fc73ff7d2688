use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::estimator::PoseEstimator;
use super::landmark::{Landmark, LandmarkIndex, PoseLandmarks};
use super::preprocess::{preprocess_for_landmarks, unletterbox_pose, LANDMARK_INPUT_SIZE};
use crate::camera::VideoFrame;
use crate::config::ModelConfig;

/// 1点あたりの出力値数 (x, y, z, visibility, presence)
const VALUES_PER_LANDMARK: usize = 5;

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// ONNX ランドマークモデルを使用した姿勢検出器
pub struct PoseDetector {
    session: Session,
    input_name: String,
    landmark_output: String,
    presence_output: String,
    presence_threshold: f32,
}

impl PoseDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P, config: &ModelConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load ONNX model")?;

        Ok(Self {
            session,
            input_name: config.input_name.clone(),
            landmark_output: config.landmark_output.clone(),
            presence_output: config.presence_output.clone(),
            presence_threshold: config.presence_threshold,
        })
    }

    /// 前処理済みテンソルから姿勢を検出
    ///
    /// 入力: [1, 256, 256, 3] の f32 テンソル (0.0-1.0)
    /// 出力: 33 ランドマーク（入力画像の正規化座標）、人物なしなら None
    pub fn detect(&mut self, input: Array4<f32>) -> Result<Option<PoseLandmarks>> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Inference failed")?;

        let presence: ndarray::ArrayViewD<f32> = outputs[self.presence_output.as_str()]
            .try_extract_array()
            .context("Failed to extract presence tensor")?;
        let presence = presence.iter().next().copied().map(sigmoid).unwrap_or(0.0);
        if presence < self.presence_threshold {
            return Ok(None);
        }

        // 出力は [1, 39*5] (x, y, z, visibility, presence)。先頭33点のみ使う
        let output: ndarray::ArrayViewD<f32> = outputs[self.landmark_output.as_str()]
            .try_extract_array()
            .context("Failed to extract landmark tensor")?;
        let flat: Vec<f32> = output.iter().copied().collect();
        if flat.len() < LandmarkIndex::COUNT * VALUES_PER_LANDMARK {
            anyhow::bail!("landmark output too short: {}", flat.len());
        }

        let size = LANDMARK_INPUT_SIZE as f32;
        let landmarks = flat
            .chunks_exact(VALUES_PER_LANDMARK)
            .take(LandmarkIndex::COUNT)
            .map(|v| Landmark::new(v[0] / size, v[1] / size, v[2] / size, sigmoid(v[3])))
            .collect();

        Ok(Some(PoseLandmarks::new(landmarks)))
    }
}

impl PoseEstimator for PoseDetector {
    fn estimate(&mut self, frame: &VideoFrame) -> Result<Option<PoseLandmarks>> {
        let (input, letterbox) = preprocess_for_landmarks(frame, LANDMARK_INPUT_SIZE)?;
        let pose = self.detect(input)?;
        Ok(pose.map(|p| unletterbox_pose(&p, &letterbox)))
    }
}
