use anyhow::Result;
use std::sync::atomic::Ordering;

use rehab_avatar::camera::OpenCvCapture;
use rehab_avatar::config::Config;
use rehab_avatar::driver::{self, Controls, PipelineParts};
use rehab_avatar::error::PipelineError;
use rehab_avatar::log;
use rehab_avatar::logging::Logger;
use rehab_avatar::pose::{PoseDetector, PoseEstimator};
use rehab_avatar::render::{MinifbRenderer, NullRenderer, SceneRenderer};
use rehab_avatar::skeleton::spawn_load;

const CONFIG_PATH: &str = "config.toml";
const VIEW_WIDTH: usize = 640;
const VIEW_HEIGHT: usize = 720;

fn main() -> Result<()> {
    let (config, config_err) = Config::load_or_default(CONFIG_PATH);

    let logger = match Logger::open(&config.app.log_dir, "avatar") {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Log file unavailable ({}), console only", e);
            Logger::console()
        }
    };

    log!(logger, "Rehab Avatar {}", env!("AVATAR_BUILD_VERSION"));
    if let Some(e) = config_err {
        log!(logger, "{}: {} (using defaults)", CONFIG_PATH, e);
    }
    log!(logger, "Target FPS: {}", config.app.target_fps);
    log!(logger, "Avatar: {}", config.app.asset_path);
    log!(logger, "Model: {}", config.app.model.path);
    log!(
        logger,
        "Camera {}: {}x{} @ {}fps",
        config.camera.index,
        config.camera.width,
        config.camera.height,
        config.camera.fps
    );

    // アバターはバックグラウンドで読み込む（描画ループは先に回り始める）
    let asset = spawn_load(&config.app.asset_path);

    let estimator: Result<Box<dyn PoseEstimator>, PipelineError> =
        match PoseDetector::new(&config.app.model.path, &config.app.model) {
            Ok(detector) => {
                log!(logger, "Pose model loaded");
                Ok(Box::new(detector))
            }
            Err(e) => Err(PipelineError::Estimator(format!("{:#}", e))),
        };

    let renderer: Box<dyn SceneRenderer> = match MinifbRenderer::new("rehab-avatar", VIEW_WIDTH, VIEW_HEIGHT) {
        Ok(r) => Box::new(r),
        Err(e) => {
            log!(logger, "Window unavailable ({}), running headless", e);
            Box::new(NullRenderer::default())
        }
    };

    // 操作: SIGUSR1 またはコンソール入力 "p" で一時停止、"q" で終了
    let controls = Controls::new();
    signal_hook::flag::register(signal_hook::consts::SIGUSR1, controls.pause_flag())?;
    {
        let pause = controls.pause_flag();
        let quit = controls.quit_flag();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                match line.trim().to_ascii_lowercase().as_str() {
                    "p" => pause.store(true, Ordering::Release),
                    "q" => quit.store(true, Ordering::Release),
                    _ => {}
                }
            }
        });
    }

    log!(logger, "");
    log!(logger, "操作: [P + Enter] 一時停止/再開  [Q + Enter] 終了  [ESC] ウィンドウを閉じる");
    log!(logger, "");

    let parts = PipelineParts {
        capture: Box::new(OpenCvCapture::new(&config.camera)),
        estimator,
        asset,
        renderer,
        controls,
    };
    driver::run(&config, parts, logger)
}
