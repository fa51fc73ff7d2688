use nalgebra::Point3;

/// 正面からの正射影。点群を余白付きでウィンドウに収める
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    scale: f32,
    center_x: f32,
    center_y: f32,
    width: usize,
    height: usize,
}

impl Projection {
    /// `points` の XY 範囲が `margin` ピクセルを残して収まるように合わせる
    pub fn fit(points: &[Point3<f32>], width: usize, height: usize, margin: usize) -> Self {
        let finite = points.iter().filter(|p| p.x.is_finite() && p.y.is_finite());
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (f32::MAX, f32::MIN, f32::MAX, f32::MIN);
        let mut any = false;
        for p in finite {
            any = true;
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        if !any {
            (min_x, max_x, min_y, max_y) = (-1.0, 1.0, -1.0, 1.0);
        }

        let avail_w = width.saturating_sub(2 * margin).max(1) as f32;
        let avail_h = height.saturating_sub(2 * margin).max(1) as f32;
        // 1点だけ・一直線の場合でも 0 除算しない
        let extent_x = (max_x - min_x).max(1e-3);
        let extent_y = (max_y - min_y).max(1e-3);
        let scale = (avail_w / extent_x).min(avail_h / extent_y);

        Self {
            scale,
            center_x: (min_x + max_x) * 0.5,
            center_y: (min_y + max_y) * 0.5,
            width,
            height,
        }
    }

    /// ワールド座標 → ピクセル座標（+Y は画面上）
    pub fn project(&self, p: &Point3<f32>) -> (i32, i32) {
        let x = (p.x - self.center_x) * self.scale + self.width as f32 * 0.5;
        let y = self.height as f32 * 0.5 - (p.y - self.center_y) * self.scale;
        (x.round() as i32, y.round() as i32)
    }
}
