use anyhow::Result;
use std::time::{Duration, Instant};

use rehab_avatar::camera::{CaptureDevice, OpenCvCapture};
use rehab_avatar::config::Config;
use rehab_avatar::pose::{PoseDetector, PoseEstimator};
use rehab_avatar::render::{MinifbRenderer, SceneRenderer};

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    let (config, config_err) = Config::load_or_default(CONFIG_PATH);
    if let Some(e) = config_err {
        println!("{}: {} (using defaults)", CONFIG_PATH, e);
    }

    println!("Pose Viewer");
    println!("Press ESC to exit");

    let mut camera = OpenCvCapture::new(&config.camera);
    camera.start()?;

    println!("Loading model from {}...", config.app.model.path);
    let mut detector = PoseDetector::new(&config.app.model.path, &config.app.model)?;
    println!("Model loaded");

    let width = config.camera.width as usize;
    let height = config.camera.height as usize;
    let mut renderer = MinifbRenderer::new("Pose Viewer", width, height)?;
    let threshold = config.landmarks.min_visibility;

    let mut frame_count = 0u32;
    let mut detected = 0u32;
    let mut visibility_sum = 0.0f32;
    let mut fps_timer = Instant::now();
    let mut last_id = None;

    while renderer.is_open() {
        let Some(frame) = camera.latest_frame() else {
            std::thread::sleep(Duration::from_millis(5));
            renderer.update()?;
            continue;
        };
        if last_id == Some(frame.id) {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        last_id = Some(frame.id);

        let pose = detector.estimate(&frame)?;

        renderer.draw_frame(&frame)?;
        if let Some(pose) = &pose {
            renderer.draw_landmarks(pose, threshold);
            detected += 1;
            visibility_sum += pose.average_visibility();
        }
        renderer.update()?;

        frame_count += 1;
        let elapsed = fps_timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            let avg = if detected > 0 { visibility_sum / detected as f32 } else { 0.0 };
            println!(
                "FPS: {:.1}, detected {}/{}, avg visibility: {:.2}",
                frame_count as f32 / elapsed,
                detected,
                frame_count,
                avg
            );
            frame_count = 0;
            detected = 0;
            visibility_sum = 0.0;
            fps_timer = Instant::now();
        }
    }

    camera.stop();
    println!("Shutting down...");
    Ok(())
}
