//! 姿勢推定ワーカー
//!
//! 推論器は専用スレッドが持つ。描画ループは容量1のチャネルに `try_send` するだけで待たない。
//! 結果は別チャネルで返り、ティックごとに回収する。

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use crate::camera::VideoFrame;
use crate::error::PipelineError;
use crate::log;
use crate::logging::Logger;
use crate::pose::{PoseEstimator, PoseLandmarks};

pub struct InferenceRequest {
    /// 送信ごとに増える番号
    pub seq: u64,
    pub frame: VideoFrame,
    pub submitted_at: Instant,
}

pub struct InferenceResult {
    pub seq: u64,
    pub submitted_at: Instant,
    /// `Ok(None)` は人物なし
    pub outcome: Result<Option<PoseLandmarks>, PipelineError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    Sent,
    /// キューが埋まっている。フレームは捨てる
    Busy,
    Closed,
}

/// 受信した結果の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accept,
    /// すでに新しい結果を受け取っている
    OutOfOrder,
}

/// 順序だけで判定する。遅れて届いた結果も最新なら使う
pub fn classify(seq: u64, last_seq: Option<u64>) -> Disposition {
    if last_seq.is_some_and(|last| seq <= last) {
        Disposition::OutOfOrder
    } else {
        Disposition::Accept
    }
}

pub struct InferenceWorker {
    tx: Option<mpsc::SyncSender<InferenceRequest>>,
    rx: Option<Mutex<mpsc::Receiver<InferenceResult>>>,
}

impl InferenceWorker {
    pub fn spawn(mut estimator: Box<dyn PoseEstimator>, logger: Logger) -> Self {
        let (frame_tx, frame_rx) = mpsc::sync_channel::<InferenceRequest>(1);
        let (result_tx, result_rx) = mpsc::channel::<InferenceResult>();

        // スレッドは切り離す。送信側が閉じれば推論を終えて抜ける
        thread::spawn(move || {
            while let Ok(req) = frame_rx.recv() {
                // キューに溜まったリクエストをドレインし、最新のみ処理
                let mut latest = req;
                while let Ok(queued) = frame_rx.try_recv() {
                    latest = queued;
                }

                let outcome = estimator
                    .estimate(&latest.frame)
                    .map_err(|e| PipelineError::Estimator(format!("{:#}", e)));
                if let Err(e) = &outcome {
                    log!(logger, "inference error (seq {}): {}", latest.seq, e);
                }

                let result = InferenceResult {
                    seq: latest.seq,
                    submitted_at: latest.submitted_at,
                    outcome,
                };
                if result_tx.send(result).is_err() {
                    // 受信側が破棄済み（終了処理後）
                    break;
                }
            }
        });

        Self {
            tx: Some(frame_tx),
            rx: Some(Mutex::new(result_rx)),
        }
    }

    pub fn try_submit(&self, req: InferenceRequest) -> Submit {
        let Some(tx) = &self.tx else {
            return Submit::Closed;
        };
        match tx.try_send(req) {
            Ok(()) => Submit::Sent,
            Err(mpsc::TrySendError::Full(_)) => Submit::Busy,
            Err(mpsc::TrySendError::Disconnected(_)) => Submit::Closed,
        }
    }

    /// 届いている結果をすべて取り出す（ブロックしない）
    pub fn drain(&self) -> Vec<InferenceResult> {
        let Some(rx) = &self.rx else {
            return Vec::new();
        };
        let Ok(rx) = rx.lock() else {
            return Vec::new();
        };
        rx.try_iter().collect()
    }

    /// 送受信を閉じる。推論中の結果は捨てられる
    pub fn shutdown(&mut self) {
        self.tx = None;
        self.rx = None;
    }
}
