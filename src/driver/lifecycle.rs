use bevy::ecs::prelude::*;

use crate::error::PipelineError;

/// 描画ループの状態
///
/// `Idle → Loading → Ready → Running ⇄ Paused → Stopped`。
/// どの状態からでも `Stopped` へ移れる。アセット読み込みに失敗した場合は `Loading` に留まる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Loading,
    Ready,
    Running,
    Paused,
    Stopped,
}

#[derive(Resource, Debug, Clone)]
pub struct PipelineState {
    lifecycle: Lifecycle,
    asset_ready: bool,
    capture_ready: bool,
    /// 直近の推論結果で人物が見つかったか。Running 中で結果がまだなければ None
    pose_present: Option<bool>,
    /// 回復しない失敗（アセット、カメラ、推論器の初期化）
    fault: Option<String>,
    /// 1回の推論失敗。次の成功で消える
    transient: Option<String>,
    stop_requested: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            asset_ready: false,
            capture_ready: false,
            pose_present: None,
            fault: None,
            transient: None,
            stop_requested: false,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.lifecycle == Lifecycle::Stopped
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// ユーザーに表示する文字列
    pub fn status(&self) -> String {
        let fault = self.fault.as_ref().or(self.transient.as_ref());
        let text = match (self.lifecycle, fault) {
            (Lifecycle::Stopped, _) => "Stopped",
            (Lifecycle::Paused, _) => "Paused",
            (_, Some(fault)) => fault.as_str(),
            (Lifecycle::Idle, None) => "Initializing...",
            (Lifecycle::Loading, None) => "Loading model...",
            (Lifecycle::Ready, None) => "Model loaded. Waiting for camera...",
            (Lifecycle::Running, None) => match self.pose_present {
                None => "Waiting for pose...",
                Some(true) => "Pose detected",
                Some(false) => "No pose",
            },
        };
        text.to_string()
    }

    pub fn begin_loading(&mut self) {
        if self.lifecycle == Lifecycle::Idle {
            self.lifecycle = Lifecycle::Loading;
        }
    }

    pub fn asset_loaded(&mut self) {
        self.asset_ready = true;
        if self.lifecycle == Lifecycle::Loading {
            self.lifecycle = Lifecycle::Ready;
        }
        self.advance();
    }

    pub fn asset_failed(&mut self, err: &PipelineError) {
        self.asset_ready = false;
        self.fault = Some(err.status_text());
    }

    pub fn capture_started(&mut self) {
        self.capture_ready = true;
        self.advance();
    }

    pub fn capture_failed(&mut self, err: &PipelineError) {
        self.capture_ready = false;
        self.fault = Some(err.status_text());
    }

    pub fn estimator_failed(&mut self, err: &PipelineError) {
        self.fault = Some(err.status_text());
    }

    pub fn estimate_failed(&mut self, err: &PipelineError) {
        self.transient = Some(err.status_text());
    }

    /// 推論結果を適用した（`present` は人物の有無）
    pub fn pose_applied(&mut self, present: bool) {
        self.transient = None;
        if self.is_running() {
            self.pose_present = Some(present);
        }
    }

    /// Running ⇄ Paused。それ以外の状態では何もしない
    pub fn toggle_pause(&mut self) -> bool {
        match self.lifecycle {
            Lifecycle::Running => {
                self.lifecycle = Lifecycle::Paused;
                true
            }
            Lifecycle::Paused => {
                self.lifecycle = Lifecycle::Running;
                self.pose_present = None;
                true
            }
            _ => false,
        }
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// 最初の呼び出しのみ true
    pub fn stop(&mut self) -> bool {
        self.stop_requested = true;
        if self.is_stopped() {
            return false;
        }
        self.lifecycle = Lifecycle::Stopped;
        true
    }

    fn advance(&mut self) {
        if self.lifecycle == Lifecycle::Ready && self.asset_ready && self.capture_ready {
            self.lifecycle = Lifecycle::Running;
            self.pose_present = None;
        }
    }
}
