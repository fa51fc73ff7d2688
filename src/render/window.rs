use anyhow::Result;
use minifb::{Key, Window, WindowOptions};
use opencv::{
    core::{Mat, Size, Vec3b},
    imgproc,
    prelude::*,
};

use super::overlay::{
    BACKGROUND_COLOR, BONE_COLOR, CONNECTION_COLOR, JOINT_COLOR, LANDMARK_COLOR, LANDMARK_CONNECTIONS,
    LOW_VISIBILITY_COLOR,
};
use super::{Projection, Scene, SceneRenderer};
use crate::camera::{frame_to_mat, VideoFrame};
use crate::pose::PoseLandmarks;

/// minifbを使用したレンダラー
pub struct MinifbRenderer {
    window: Option<Window>,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    title: String,
}

impl MinifbRenderer {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window: Some(window),
            buffer: vec![0u32; width * height],
            width,
            height,
            title: title.to_string(),
        })
    }

    pub fn clear(&mut self, color: u32) {
        self.buffer.fill(color);
    }

    /// RGB フレームをウィンドウサイズにリサイズして描画
    pub fn draw_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        let src = frame_to_mat(frame)?;
        let mut resized = Mat::default();
        imgproc::resize(
            &src,
            &mut resized,
            Size::new(self.width as i32, self.height as i32),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let pixels = resized.data_typed::<Vec3b>()?;
        for (dst, p) in self.buffer.iter_mut().zip(pixels) {
            *dst = ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32;
        }
        Ok(())
    }

    /// ランドマークを描画（正規化座標、ウィンドウ全体がフレーム）
    pub fn draw_landmarks(&mut self, pose: &PoseLandmarks, visibility_threshold: f32) {
        let w = self.width as u32;
        let h = self.height as u32;

        for (start_idx, end_idx) in LANDMARK_CONNECTIONS.iter() {
            let (Some(start), Some(end)) = (pose.get(*start_idx as usize), pose.get(*end_idx as usize)) else {
                continue;
            };
            if start.is_valid(visibility_threshold) && end.is_valid(visibility_threshold) {
                let (x1, y1) = start.to_pixel(w, h);
                let (x2, y2) = end.to_pixel(w, h);
                self.draw_line(x1, y1, x2, y2, CONNECTION_COLOR);
            }
        }

        for lm in pose.landmarks.iter() {
            let (px, py) = lm.to_pixel(w, h);
            let color = if lm.is_valid(visibility_threshold) {
                LANDMARK_COLOR
            } else {
                LOW_VISIBILITY_COLOR
            };
            self.draw_circle(px, py, 3, color);
        }
    }

    pub fn set_title(&mut self, title: &str) {
        if self.title != title {
            if let Some(window) = self.window.as_mut() {
                window.set_title(title);
            }
            self.title = title.to_string();
        }
    }

    /// バッファをウィンドウに表示
    pub fn update(&mut self) -> Result<()> {
        if let Some(window) = self.window.as_mut() {
            window.update_with_buffer(&self.buffer, self.width, self.height)?;
        }
        Ok(())
    }

    /// Bresenhamのアルゴリズムで線を描画
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.set_pixel(x, y, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 円を描画（塗りつぶし）
    fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// ピクセルをセット（境界チェック付き）
    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}

impl SceneRenderer for MinifbRenderer {
    /// ボーンの棒人間。ステータスはタイトルバーに出す
    fn render(&mut self, scene: &Scene) -> Result<()> {
        if self.window.is_none() {
            return Ok(());
        }
        self.clear(BACKGROUND_COLOR);
        if !scene.joints.is_empty() {
            let proj = Projection::fit(&scene.joints, self.width, self.height, 40);
            for [a, b] in scene.segments.iter() {
                let (x1, y1) = proj.project(a);
                let (x2, y2) = proj.project(b);
                self.draw_line(x1, y1, x2, y2, BONE_COLOR);
            }
            for p in scene.joints.iter() {
                let (x, y) = proj.project(p);
                self.draw_circle(x, y, 2, JOINT_COLOR);
            }
        }
        self.set_title(&format!("rehab-avatar - {}", scene.status));
        self.update()
    }

    /// ウィンドウが開いているか
    fn is_open(&self) -> bool {
        self.window
            .as_ref()
            .map(|w| w.is_open() && !w.is_key_down(Key::Escape))
            .unwrap_or(false)
    }

    fn release(&mut self) {
        // Window の drop で閉じる
        self.window = None;
    }
}
