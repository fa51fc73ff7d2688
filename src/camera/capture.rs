use anyhow::{Context, Result};
use opencv::{
    core::{AlgorithmHint, Mat, Scalar, CV_8UC3},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use super::{CaptureDevice, VideoFrame};
use crate::config::CameraConfig;
use crate::error::PipelineError;

/// 解像度とFPSを指定してカメラを開く
fn open_camera(index: i32, width: u32, height: u32, fps: u32) -> Result<VideoCapture> {
    let mut capture =
        VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32).context("Failed to open camera")?;

    if !capture.is_opened()? {
        anyhow::bail!("Camera {} is not available", index);
    }

    capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
    capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
    capture.set(videoio::CAP_PROP_FPS, fps as f64)?;
    capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

    Ok(capture)
}

/// BGR Mat → RGB VideoFrame
pub fn mat_to_frame(id: u64, bgr: &Mat) -> Result<VideoFrame> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;
    let rgb = if rgb.is_continuous() { rgb } else { rgb.try_clone()? };
    Ok(VideoFrame::new(
        id,
        rgb.cols() as u32,
        rgb.rows() as u32,
        rgb.data_bytes()?.to_vec(),
    ))
}

/// RGB VideoFrame → 3ch Mat（コピー）
pub fn frame_to_mat(frame: &VideoFrame) -> Result<Mat> {
    let (w, h) = (frame.width as usize, frame.height as usize);
    if w == 0 || h == 0 || frame.rgb.len() < w * h * 3 {
        anyhow::bail!(
            "Frame {} buffer too short: {} bytes for {}x{}",
            frame.id,
            frame.rgb.len(),
            w,
            h
        );
    }
    let mut mat = Mat::new_rows_cols_with_default(h as i32, w as i32, CV_8UC3, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(&frame.rgb[..w * h * 3]);
    Ok(mat)
}

struct Running {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// 別スレッドでカメラキャプチャを行い、最新フレームを提供する
pub struct OpenCvCapture {
    index: i32,
    width: u32,
    height: u32,
    fps: u32,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    /// 最後に発行したフレームID（再スタートしても戻らない）
    frame_id: Arc<AtomicU64>,
    running: Option<Running>,
}

impl OpenCvCapture {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            index: config.index,
            width: config.width,
            height: config.height,
            fps: config.fps,
            latest: Arc::new(Mutex::new(None)),
            frame_id: Arc::new(AtomicU64::new(0)),
            running: None,
        }
    }
}

impl CaptureDevice for OpenCvCapture {
    fn start(&mut self) -> Result<(), PipelineError> {
        if self.running.is_some() {
            return Ok(());
        }
        let mut camera = open_camera(self.index, self.width, self.height, self.fps)
            .map_err(|e| PipelineError::CaptureDenied(format!("{:#}", e)))?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_ref = stop.clone();
        let latest_ref = self.latest.clone();
        let frame_id_ref = self.frame_id.clone();

        let handle = thread::spawn(move || {
            let mut mat = Mat::default();
            while !stop_ref.load(Ordering::Acquire) {
                match camera.read(&mut mat) {
                    Ok(true) if !mat.empty() => {
                        let id = frame_id_ref.load(Ordering::Acquire) + 1;
                        if let Ok(frame) = mat_to_frame(id, &mat) {
                            frame_id_ref.store(id, Ordering::Release);
                            if let Ok(mut latest) = latest_ref.lock() {
                                *latest = Some(frame);
                            }
                        }
                    }
                    _ => thread::sleep(std::time::Duration::from_millis(5)),
                }
            }
            // デバイス解放はスレッド側で行う
            let _ = camera.release();
        });

        self.running = Some(Running { stop, handle });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop.store(true, Ordering::Release);
            let _ = running.handle.join();
        }
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Drop for OpenCvCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Vec3b;

    #[test]
    fn test_frame_to_mat_keeps_rgb_layout() {
        let rgb = vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120];
        let frame = VideoFrame::new(3, 2, 2, rgb);
        let mat = frame_to_mat(&frame).unwrap();
        assert_eq!((mat.cols(), mat.rows(), mat.channels()), (2, 2, 3));
        let px = *mat.at_2d::<Vec3b>(1, 0).unwrap();
        assert_eq!((px[0], px[1], px[2]), (70, 80, 90));
    }

    #[test]
    fn test_frame_to_mat_rejects_short_buffer() {
        let frame = VideoFrame::new(1, 10, 10, vec![0; 5]);
        assert!(frame_to_mat(&frame).is_err());
    }

    #[test]
    fn test_mat_to_frame_swaps_to_rgb() {
        // 1x1 の Mat を BGR として読み直す
        let bgr = frame_to_mat(&VideoFrame::new(1, 1, 1, vec![1, 2, 3])).unwrap();
        let frame = mat_to_frame(7, &bgr).unwrap();
        assert_eq!(frame.id, 7);
        assert_eq!(frame.rgb, vec![3, 2, 1]);
    }
}
