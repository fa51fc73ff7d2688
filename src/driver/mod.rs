//! 描画ループ
//!
//! ヘッドレスの bevy App を目標FPSで回す。1ティックの順序:
//! アセット確認 → 操作 → フレーム送信 → 結果受信 → リターゲット → 描画 → FPS → 終了処理。
//! 推論は `inference` のワーカースレッドで行い、ループはその完了を待たない。

pub mod inference;
pub mod lifecycle;

pub use inference::{classify, Disposition, InferenceRequest, InferenceResult, InferenceWorker, Submit};
pub use lifecycle::{Lifecycle, PipelineState};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bevy::app::{App, AppExit, PluginsState, Startup, Update};
use bevy::ecs::prelude::*;

use crate::camera::CaptureDevice;
use crate::config::Config;
use crate::error::PipelineError;
use crate::log;
use crate::logging::Logger;
use crate::pose::{PoseEstimator, PoseLandmarks};
use crate::render::{Scene, SceneRenderer};
use crate::retarget::RetargetEngine;
use crate::skeleton::{AssetLoad, BoneMap, BoneNames, Skeleton};

/// 外部スレッド（コンソール、シグナル）からの操作要求
#[derive(Resource, Clone, Default)]
pub struct Controls {
    pause: Arc<AtomicBool>,
    quit: Arc<AtomicBool>,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    /// 一時停止／再開の切り替え
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::Release);
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
    }

    /// SIGUSR1 などのフラグ登録用
    pub fn pause_flag(&self) -> Arc<AtomicBool> {
        self.pause.clone()
    }

    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        self.quit.clone()
    }
}

/// `build_app` に渡す外部デバイス一式
pub struct PipelineParts {
    pub capture: Box<dyn CaptureDevice>,
    /// 初期化に失敗した推論器はエラーのまま渡す（ステータスに表示して描画は続ける）
    pub estimator: Result<Box<dyn PoseEstimator>, PipelineError>,
    pub asset: AssetLoad,
    pub renderer: Box<dyn SceneRenderer>,
    pub controls: Controls,
}

// --- Bevy Resources ---

#[derive(Resource)]
struct CaptureInput {
    device: Box<dyn CaptureDevice>,
    last_frame_id: Option<u64>,
    stopped: bool,
}

#[derive(Resource)]
struct Inference {
    worker: Option<InferenceWorker>,
    in_flight: bool,
    next_seq: u64,
    /// 直近の結果が遅延しきい値を超えていた
    slow: bool,
}

#[derive(Resource)]
struct PendingAsset(Mutex<Option<AssetLoad>>);

#[derive(Resource, Default)]
struct Avatar {
    skeleton: Option<Skeleton>,
    bones: BoneMap,
}

#[derive(Resource)]
struct Retargeting {
    engine: RetargetEngine,
    /// 未適用の最新結果。内側の None は「人物なし」
    pending: Option<Option<PoseLandmarks>>,
    last_seq: Option<u64>,
    last_applied: Option<Instant>,
}

#[derive(Resource)]
struct DriverSettings {
    slow_inference: Duration,
    bone_names: BoneNames,
    default_dt: f32,
    log_fps: bool,
}

#[derive(Resource)]
struct FpsCounter {
    frame_count: u32,
    inference_count: u32,
    latency_total: Duration,
    timer: Instant,
}

#[derive(Resource)]
struct LogRes(Logger);

/// 描画はループのスレッドでのみ行う
struct RenderView(Box<dyn SceneRenderer>);

/// ランナーなしの App を組み立てる。テストでは `app.update()` で1ティックずつ進める
pub fn build_app(config: &Config, parts: PipelineParts, logger: Logger) -> App {
    let mut state = PipelineState::new();

    let worker = match parts.estimator {
        Ok(estimator) => Some(InferenceWorker::spawn(estimator, logger.clone())),
        Err(e) => {
            log!(logger, "Pose estimator unavailable: {}", e);
            state.estimator_failed(&e);
            None
        }
    };

    let (bone_names, unknown) = BoneNames::with_overrides(&config.bones);
    if !unknown.is_empty() {
        log!(logger, "Unknown bone roles in [bones]: {}", unknown.join(", "));
    }

    let engine = RetargetEngine::from_config(config);
    log!(logger, "Retarget strategy: {}", engine.strategy_name());

    let mut app = App::new();
    app.insert_resource(state)
        .insert_resource(CaptureInput {
            device: parts.capture,
            last_frame_id: None,
            stopped: false,
        })
        .insert_resource(Inference {
            worker,
            in_flight: false,
            next_seq: 0,
            slow: false,
        })
        .insert_resource(PendingAsset(Mutex::new(Some(parts.asset))))
        .insert_resource(Avatar::default())
        .insert_resource(Retargeting {
            engine,
            pending: None,
            last_seq: None,
            last_applied: None,
        })
        .insert_resource(DriverSettings {
            slow_inference: Duration::from_millis(config.app.slow_inference_ms),
            bone_names,
            default_dt: 1.0 / config.app.target_fps.max(1) as f32,
            log_fps: config.debug.log_fps,
        })
        .insert_resource(FpsCounter {
            frame_count: 0,
            inference_count: 0,
            latency_total: Duration::ZERO,
            timer: Instant::now(),
        })
        .insert_resource(parts.controls)
        .insert_resource(LogRes(logger))
        .insert_non_send_resource(RenderView(parts.renderer))
        .add_systems(Startup, startup_system)
        .add_systems(
            Update,
            (
                poll_asset_system,
                controls_system,
                submit_frame_system,
                receive_results_system,
                retarget_system,
                render_system,
                fps_system,
                teardown_system,
            )
                .chain(),
        );
    app
}

/// ループを回す。終了時の片付けはランナーが行う
pub fn run(config: &Config, parts: PipelineParts, logger: Logger) -> anyhow::Result<()> {
    let frame_duration = Duration::from_secs_f64(1.0 / config.app.target_fps.max(1) as f64);
    let mut app = build_app(config, parts, logger);
    app.set_runner(frame_loop(frame_duration));
    match app.run() {
        AppExit::Success => Ok(()),
        AppExit::Error(code) => anyhow::bail!("Render loop exited with code {}", code),
    }
}

/// 1ティックごとに `frame_duration` まで待つランナー
///
/// `App::run` は App を空のものと入れ替えてからランナーに渡すので、
/// 終了処理はここで、実際に回している World に対して行う。
/// どの経路で `AppExit` が来ても `teardown` を通る（2回目以降は何もしない）。
pub fn frame_loop(frame_duration: Duration) -> impl FnOnce(App) -> AppExit + 'static {
    move |mut app: App| {
        if app.plugins_state() == PluginsState::Ready {
            app.finish();
            app.cleanup();
        }
        loop {
            let started = Instant::now();
            app.update();
            if let Some(exit) = app.should_exit() {
                teardown(app.world_mut());
                return exit;
            }
            if let Some(rest) = frame_duration.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }
}

/// 停止処理。何度呼んでもよい
///
/// キャプチャ停止は1回だけ。推論ワーカーを切り離すので、推論中の結果は以後どこにも届かない。
pub fn teardown(world: &mut World) {
    let first = match world.get_resource_mut::<PipelineState>() {
        Some(mut state) => state.stop(),
        None => return,
    };
    if !first {
        return;
    }

    if let Some(mut capture) = world.get_resource_mut::<CaptureInput>() {
        if !capture.stopped {
            capture.device.stop();
            capture.stopped = true;
        }
    }
    if let Some(mut inference) = world.get_resource_mut::<Inference>() {
        if let Some(mut worker) = inference.worker.take() {
            worker.shutdown();
        }
        inference.in_flight = false;
    }
    if let Some(mut retargeting) = world.get_resource_mut::<Retargeting>() {
        retargeting.pending = None;
    }
    if let Some(mut view) = world.get_non_send_resource_mut::<RenderView>() {
        view.0.release();
    }
    if let Some(logger) = world.get_resource::<LogRes>() {
        log!(logger.0, "Shutting down...");
        logger.0.flush();
    }
    world.send_event(AppExit::Success);
}

// --- Systems ---

fn startup_system(mut state: ResMut<PipelineState>, mut capture: ResMut<CaptureInput>, logger: Res<LogRes>) {
    state.begin_loading();
    match capture.device.start() {
        Ok(()) => {
            log!(logger.0, "Capture started");
            state.capture_started();
        }
        Err(e) => {
            log!(logger.0, "{}", e);
            state.capture_failed(&e);
        }
    }
}

fn poll_asset_system(
    pending: Res<PendingAsset>,
    mut avatar: ResMut<Avatar>,
    mut state: ResMut<PipelineState>,
    settings: Res<DriverSettings>,
    logger: Res<LogRes>,
) {
    if state.is_stopped() {
        return;
    }
    let Ok(mut slot) = pending.0.lock() else {
        return;
    };
    let Some(result) = slot.as_ref().and_then(|load| load.poll()) else {
        return;
    };
    let path = slot.take().map(|load| load.path().to_string()).unwrap_or_default();

    match result {
        Ok(skeleton) => {
            let bones = BoneMap::resolve(&skeleton, &settings.bone_names);
            log!(
                logger.0,
                "Avatar loaded: {} ({} bones, {}/{} roles resolved)",
                path,
                skeleton.len(),
                bones.resolved_count(),
                crate::skeleton::BoneRole::COUNT
            );
            let missing = bones.missing();
            if !missing.is_empty() {
                let keys: Vec<&str> = missing.iter().map(|r| r.key()).collect();
                log!(logger.0, "Bones not found (skipped): {}", keys.join(", "));
            }
            avatar.skeleton = Some(skeleton);
            avatar.bones = bones;
            state.asset_loaded();
        }
        Err(e) => {
            log!(logger.0, "{}", e);
            state.asset_failed(&e);
        }
    }
}

fn controls_system(
    controls: Res<Controls>,
    mut state: ResMut<PipelineState>,
    mut retargeting: ResMut<Retargeting>,
    logger: Res<LogRes>,
) {
    if controls.quit.swap(false, Ordering::AcqRel) {
        log!(logger.0, "Quit requested");
        state.request_stop();
    }
    if controls.pause.swap(false, Ordering::AcqRel) && state.toggle_pause() {
        // 一時停止中の結果は適用しない。再開後の最初の dt は既定値
        retargeting.pending = None;
        retargeting.last_applied = None;
        log!(logger.0, "{}", if state.is_running() { "Resumed" } else { "Paused" });
    }
}

fn submit_frame_system(mut capture: ResMut<CaptureInput>, mut inference: ResMut<Inference>, state: Res<PipelineState>) {
    if !state.is_running() || inference.in_flight {
        return;
    }
    let Some(frame) = capture.device.latest_frame() else {
        return;
    };
    if capture.last_frame_id == Some(frame.id) {
        return;
    }

    let frame_id = frame.id;
    let seq = inference.next_seq;
    let req = InferenceRequest {
        seq,
        frame,
        submitted_at: Instant::now(),
    };
    let outcome = match inference.worker.as_ref() {
        Some(worker) => worker.try_submit(req),
        None => return,
    };
    match outcome {
        Submit::Sent => {
            capture.last_frame_id = Some(frame_id);
            inference.in_flight = true;
            inference.next_seq += 1;
        }
        // 推論中。このフレームは捨てる
        Submit::Busy => {}
        Submit::Closed => inference.worker = None,
    }
}

fn receive_results_system(
    mut inference: ResMut<Inference>,
    mut retargeting: ResMut<Retargeting>,
    mut state: ResMut<PipelineState>,
    mut fps: ResMut<FpsCounter>,
    settings: Res<DriverSettings>,
    logger: Res<LogRes>,
) {
    let results = match inference.worker.as_ref() {
        Some(worker) => worker.drain(),
        None => return,
    };
    let now = Instant::now();
    for result in results {
        // 返信が来た時点で次を送れる
        inference.in_flight = false;

        if classify(result.seq, retargeting.last_seq) == Disposition::OutOfOrder {
            log!(logger.0, "Discarding out-of-order result (seq {})", result.seq);
            continue;
        }
        retargeting.last_seq = Some(result.seq);

        // 遅くても最新の結果は使う。遅延はしきい値をまたいだときだけログに出す
        let latency = now.saturating_duration_since(result.submitted_at);
        let slow = latency > settings.slow_inference;
        if slow != inference.slow {
            if slow {
                log!(logger.0, "Pose estimation is slow: {} ms (seq {})", latency.as_millis(), result.seq);
            } else {
                log!(logger.0, "Pose estimation latency back to {} ms", latency.as_millis());
            }
            inference.slow = slow;
        }
        fps.inference_count += 1;
        fps.latency_total += latency;

        match result.outcome {
            Ok(landmarks) => {
                if state.is_running() {
                    retargeting.pending = Some(landmarks);
                }
            }
            Err(e) => state.estimate_failed(&e),
        }
    }
}

fn retarget_system(
    mut retargeting: ResMut<Retargeting>,
    mut avatar: ResMut<Avatar>,
    mut state: ResMut<PipelineState>,
    settings: Res<DriverSettings>,
) {
    if !state.is_running() {
        return;
    }
    let Some(landmarks) = retargeting.pending.take() else {
        return;
    };
    let Avatar { skeleton, bones } = &mut *avatar;
    let Some(skeleton) = skeleton.as_mut() else {
        return;
    };

    let now = Instant::now();
    let dt = retargeting
        .last_applied
        .map(|t| now.duration_since(t).as_secs_f32())
        .unwrap_or(settings.default_dt)
        .clamp(1e-3, 0.5);
    retargeting.last_applied = Some(now);

    let report = retargeting.engine.update(landmarks.as_ref(), bones, skeleton, dt);
    state.pose_applied(report.pose_present);
}

/// 推論の有無にかかわらず毎ティック描画する
fn render_system(
    mut view: NonSendMut<RenderView>,
    avatar: Res<Avatar>,
    mut state: ResMut<PipelineState>,
    logger: Res<LogRes>,
    mut last_status: Local<String>,
) {
    if state.is_stopped() {
        return;
    }
    if !view.0.is_open() {
        state.request_stop();
        return;
    }

    let status = state.status();
    if *last_status != status {
        log!(logger.0, "Status: {}", status);
        *last_status = status.clone();
    }

    let scene = match &avatar.skeleton {
        Some(skeleton) => Scene::from_skeleton(skeleton, &status),
        None => Scene::status_only(&status),
    };
    if let Err(e) = view.0.render(&scene) {
        log!(logger.0, "Render failed: {:#}", e);
    }
}

fn fps_system(mut fps: ResMut<FpsCounter>, settings: Res<DriverSettings>, logger: Res<LogRes>) {
    fps.frame_count += 1;
    let elapsed = fps.timer.elapsed();
    if elapsed >= Duration::from_secs(1) {
        if settings.log_fps {
            let secs = elapsed.as_secs_f32();
            let latency_ms = match fps.inference_count {
                0 => 0.0,
                n => fps.latency_total.as_secs_f32() * 1000.0 / n as f32,
            };
            log!(
                logger.0,
                "FPS: render {:.1} / inference {:.1} (latency {:.0} ms)",
                fps.frame_count as f32 / secs,
                fps.inference_count as f32 / secs,
                latency_ms
            );
        }
        fps.frame_count = 0;
        fps.inference_count = 0;
        fps.latency_total = Duration::ZERO;
        fps.timer = Instant::now();
    }
}

fn teardown_system(world: &mut World) {
    let requested = world
        .get_resource::<PipelineState>()
        .is_some_and(|state| state.stop_requested() && !state.is_stopped());
    if requested {
        teardown(world);
    }
}
