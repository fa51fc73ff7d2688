//! glTF からスケルトンを読み込む
//!
//! 読むのはノード階層とレスト姿勢の変換だけ。メッシュやスキンは描画側の担当。

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use super::{BoneId, Skeleton};
use crate::error::PipelineError;

/// シーンから辿れる全ノードで `Skeleton` を組み立てる
///
/// どのシーンからも参照されないノードは追加のルートにする（シーン無しで書き出されたリグ用）。
pub fn skeleton_from_gltf(document: &gltf::Document) -> Skeleton {
    let mut skeleton = Skeleton::new();
    let mut visited = vec![false; document.nodes().count()];

    let mut roots: Vec<gltf::Node> = document.scenes().flat_map(|scene| scene.nodes()).collect();
    let mut has_parent = vec![false; visited.len()];
    for node in document.nodes() {
        for child in node.children() {
            has_parent[child.index()] = true;
        }
    }
    for node in document.nodes() {
        if !has_parent[node.index()] && !roots.iter().any(|r| r.index() == node.index()) {
            roots.push(node);
        }
    }

    let mut stack: Vec<(gltf::Node, Option<BoneId>)> = roots.into_iter().rev().map(|n| (n, None)).collect();
    while let Some((node, parent)) = stack.pop() {
        if visited[node.index()] {
            continue;
        }
        visited[node.index()] = true;

        let (t, r, s) = node.transform().decomposed();
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(r[3], r[0], r[1], r[2]));
        let name = node.name().map(str::to_string).unwrap_or_else(|| format!("node_{}", node.index()));
        let id = skeleton.add_scaled_bone(&name, parent, Vector3::from(t), rotation, Vector3::from(s));

        let children: Vec<gltf::Node> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push((child, Some(id)));
        }
    }

    skeleton
}

/// `.gltf` / `.glb` を読み込みノード階層を返す
pub fn load_gltf<P: AsRef<Path>>(path: P) -> Result<Skeleton, PipelineError> {
    let path_str = path.as_ref().display().to_string();
    let gltf = gltf::Gltf::open(path.as_ref()).map_err(|e| PipelineError::asset_load(&path_str, e))?;
    let skeleton = skeleton_from_gltf(&gltf.document);
    if skeleton.is_empty() {
        return Err(PipelineError::asset_load(path_str, "document has no nodes"));
    }
    Ok(skeleton)
}

/// バックグラウンド読み込み。描画ループからポーリングし、ブロックしない
pub struct AssetLoad {
    path: String,
    rx: mpsc::Receiver<Result<Skeleton, PipelineError>>,
}

impl AssetLoad {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 読み込み中は `None`
    pub fn poll(&self) -> Option<Result<Skeleton, PipelineError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                Some(Err(PipelineError::asset_load(&self.path, "loader thread exited")))
            }
        }
    }

    /// 読み込み済みの結果を包む（テストやメモリ上のアセット用）
    pub fn ready(path: &str, result: Result<Skeleton, PipelineError>) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(result);
        Self {
            path: path.to_string(),
            rx,
        }
    }
}

pub fn spawn_load(path: &str) -> AssetLoad {
    let (tx, rx) = mpsc::channel();
    let owned = path.to_string();
    thread::spawn(move || {
        let _ = tx.send(load_gltf(&owned));
    });
    AssetLoad {
        path: path.to_string(),
        rx,
    }
}
