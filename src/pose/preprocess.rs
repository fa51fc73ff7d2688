#[cfg(feature = "desktop")]
use anyhow::Result;
#[cfg(feature = "desktop")]
use ndarray::Array4;
#[cfg(feature = "desktop")]
use opencv::{
    core::{self, Mat, Scalar, Size, Vec3f, CV_32FC3},
    imgproc,
    prelude::*,
};

use super::landmark::PoseLandmarks;
#[cfg(feature = "desktop")]
use crate::camera::{frame_to_mat, VideoFrame};

/// ランドマークモデルの入力サイズ
pub const LANDMARK_INPUT_SIZE: i32 = 256;

/// レターボックス情報（正規化座標の逆変換用）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    /// 入力画像内で元画像が占める割合
    pub scale_x: f32,
    pub scale_y: f32,
    /// 元画像の左上オフセット（入力画像の正規化座標）
    pub pad_x: f32,
    pub pad_y: f32,
}

/// RGBフレームをランドマークモデル用の入力テンソルに変換
///
/// - アスペクト比を保って size x size にレターボックス（余白は黒）
/// - バイリニア補間
/// - [1, size, size, 3] の f32 テンソル (0.0-1.0)
#[cfg(feature = "desktop")]
pub fn preprocess_for_landmarks(frame: &VideoFrame, size: i32) -> Result<(Array4<f32>, LetterboxInfo)> {
    let src = frame_to_mat(frame)?;
    let (w, h) = (src.cols(), src.rows());

    let scale = (size as f32 / w as f32).min(size as f32 / h as f32);
    let content_w = ((w as f32 * scale).round() as i32).clamp(1, size);
    let content_h = ((h as f32 * scale).round() as i32).clamp(1, size);
    let pad_left = (size - content_w) / 2;
    let pad_top = (size - content_h) / 2;

    let mut resized = Mat::default();
    imgproc::resize(
        &src,
        &mut resized,
        Size::new(content_w, content_h),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut boxed = Mat::default();
    core::copy_make_border(
        &resized,
        &mut boxed,
        pad_top,
        size - content_h - pad_top,
        pad_left,
        size - content_w - pad_left,
        core::BORDER_CONSTANT,
        Scalar::all(0.0),
    )?;

    // 0-255 → 0.0-1.0
    let mut float_mat = Mat::default();
    boxed.convert_to(&mut float_mat, CV_32FC3, 1.0 / 255.0, 0.0)?;

    let n = size as usize;
    let values: Vec<f32> = float_mat
        .data_typed::<Vec3f>()?
        .iter()
        .flat_map(|p| [p[0], p[1], p[2]])
        .collect();
    let tensor = Array4::from_shape_vec((1, n, n, 3), values)?;

    let info = LetterboxInfo {
        scale_x: content_w as f32 / size as f32,
        scale_y: content_h as f32 / size as f32,
        pad_x: pad_left as f32 / size as f32,
        pad_y: pad_top as f32 / size as f32,
    };
    Ok((tensor, info))
}

/// レターボックス座標を元画像の正規化座標に戻す
///
/// zはxと同じスケールなので scale_x で割る。
pub fn unletterbox_pose(pose: &PoseLandmarks, info: &LetterboxInfo) -> PoseLandmarks {
    let mut out = pose.clone();
    for lm in out.landmarks.iter_mut() {
        lm.x = (lm.x - info.pad_x) / info.scale_x;
        lm.y = (lm.y - info.pad_y) / info.scale_y;
        lm.z /= info.scale_x;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Landmark;

    #[test]
    fn test_unletterbox_roundtrip_center() {
        let info = LetterboxInfo {
            scale_x: 1.0,
            scale_y: 0.5,
            pad_x: 0.0,
            pad_y: 0.25,
        };
        let pose = PoseLandmarks::new(vec![Landmark::new(0.5, 0.25, 0.1, 1.0)]);
        let out = unletterbox_pose(&pose, &info);
        assert!((out.landmarks[0].x - 0.5).abs() < 1e-6);
        assert!(out.landmarks[0].y.abs() < 1e-6);
    }

    #[cfg(feature = "desktop")]
    fn solid_frame(w: u32, h: u32, rgb: [u8; 3]) -> VideoFrame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for _ in 0..(w * h) {
            data.extend_from_slice(&rgb);
        }
        VideoFrame::new(1, w, h, data)
    }

    #[cfg(feature = "desktop")]
    #[test]
    fn test_square_frame_fills_tensor() {
        let frame = solid_frame(64, 64, [255, 0, 0]);
        let (t, info) = preprocess_for_landmarks(&frame, 32).unwrap();
        assert_eq!(t.shape(), &[1, 32, 32, 3]);
        let full = LetterboxInfo {
            scale_x: 1.0,
            scale_y: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        assert_eq!(info, full);
        assert!((t[[0, 0, 0, 0]] - 1.0).abs() < 1e-5);
        assert!((t[[0, 31, 31, 1]]).abs() < 1e-6);
    }

    #[cfg(feature = "desktop")]
    #[test]
    fn test_wide_frame_is_letterboxed() {
        let frame = solid_frame(64, 32, [255, 255, 255]);
        let (t, info) = preprocess_for_landmarks(&frame, 32).unwrap();
        assert!((info.scale_y - 0.5).abs() < 1e-6);
        assert!((info.pad_y - 0.25).abs() < 1e-6);
        // 上下の余白は黒
        assert_eq!(t[[0, 0, 16, 0]], 0.0);
        assert_eq!(t[[0, 31, 16, 2]], 0.0);
        assert!((t[[0, 16, 16, 0]] - 1.0).abs() < 1e-5);
    }

    #[cfg(feature = "desktop")]
    #[test]
    fn test_tall_frame_pads_left_and_right() {
        let frame = solid_frame(16, 64, [0, 255, 0]);
        let (t, info) = preprocess_for_landmarks(&frame, 32).unwrap();
        assert!((info.scale_x - 0.25).abs() < 1e-6);
        assert!((info.pad_x - 0.375).abs() < 1e-6);
        assert_eq!(t[[0, 16, 0, 1]], 0.0);
        assert!((t[[0, 16, 16, 1]] - 1.0).abs() < 1e-5);
    }

    #[cfg(feature = "desktop")]
    #[test]
    fn test_short_buffer_is_an_error() {
        let frame = VideoFrame::new(1, 10, 10, vec![0; 5]);
        assert!(preprocess_for_landmarks(&frame, 8).is_err());
    }
}
