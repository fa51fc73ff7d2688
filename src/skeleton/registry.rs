use std::collections::HashMap;

use super::{BoneId, Skeleton};

/// 論理ボーン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoneRole {
    LeftShoulder,
    LeftUpperArm,
    LeftForearm,
    LeftHand,
    RightShoulder,
    RightUpperArm,
    RightForearm,
    RightHand,
    Spine,
    Chest,
    Neck,
    Head,
}

impl BoneRole {
    pub const COUNT: usize = 12;

    pub const ALL: [BoneRole; BoneRole::COUNT] = [
        BoneRole::LeftShoulder,
        BoneRole::LeftUpperArm,
        BoneRole::LeftForearm,
        BoneRole::LeftHand,
        BoneRole::RightShoulder,
        BoneRole::RightUpperArm,
        BoneRole::RightForearm,
        BoneRole::RightHand,
        BoneRole::Spine,
        BoneRole::Chest,
        BoneRole::Neck,
        BoneRole::Head,
    ];

    /// config.toml の `[bones]` で使うキー
    pub fn key(self) -> &'static str {
        match self {
            BoneRole::LeftShoulder => "left_shoulder",
            BoneRole::LeftUpperArm => "left_upper_arm",
            BoneRole::LeftForearm => "left_forearm",
            BoneRole::LeftHand => "left_hand",
            BoneRole::RightShoulder => "right_shoulder",
            BoneRole::RightUpperArm => "right_upper_arm",
            BoneRole::RightForearm => "right_forearm",
            BoneRole::RightHand => "right_hand",
            BoneRole::Spine => "spine",
            BoneRole::Chest => "chest",
            BoneRole::Neck => "neck",
            BoneRole::Head => "head",
        }
    }

    /// 既定の候補名: 変形ボーン (DEF-) → 通常名 の順
    pub fn default_candidates(self) -> &'static [&'static str] {
        match self {
            BoneRole::LeftShoulder => &["DEF-shoulderL", "shoulderL_1"],
            BoneRole::LeftUpperArm => &["DEF-upper_armL", "upper_armL"],
            BoneRole::LeftForearm => &["DEF-forearmL", "forearmL"],
            BoneRole::LeftHand => &["DEF-handL", "handL"],
            BoneRole::RightShoulder => &["DEF-shoulderR", "shoulderR_1"],
            BoneRole::RightUpperArm => &["DEF-upper_armR", "upper_armR"],
            BoneRole::RightForearm => &["DEF-forearmR", "forearmR"],
            BoneRole::RightHand => &["DEF-handR", "handR"],
            BoneRole::Spine => &["DEF-spine", "spine"],
            BoneRole::Chest => &["DEF-chest", "chest"],
            BoneRole::Neck => &["DEF-neck", "neck"],
            BoneRole::Head => &["DEF-head", "head"],
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// 論理ボーン → 候補となる物理ボーン名（優先順）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoneNames {
    candidates: Vec<Vec<String>>,
}

impl Default for BoneNames {
    fn default() -> Self {
        Self {
            candidates: BoneRole::ALL
                .iter()
                .map(|r| r.default_candidates().iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }
}

impl BoneNames {
    /// 設定の上書きを適用。未知のキーは返り値で報告する
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> (Self, Vec<String>) {
        let mut names = Self::default();
        let mut unknown = Vec::new();
        for (key, list) in overrides {
            match BoneRole::ALL.iter().find(|r| r.key() == key) {
                Some(role) => names.candidates[role.slot()] = list.clone(),
                None => unknown.push(key.clone()),
            }
        }
        unknown.sort();
        (names, unknown)
    }

    pub fn candidates(&self, role: BoneRole) -> &[String] {
        &self.candidates[role.slot()]
    }

    /// 候補名を順に試し、最初に見つかったボーンを返す。見つからなければ None（エラーではない）
    pub fn resolve(&self, skeleton: &Skeleton, role: BoneRole) -> Option<BoneId> {
        self.candidates(role).iter().find_map(|name| skeleton.find(name))
    }
}

/// アセット読み込み時に一度だけ解決されるボーン対応表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoneMap {
    bones: [Option<BoneId>; BoneRole::COUNT],
}

impl BoneMap {
    pub fn resolve(skeleton: &Skeleton, names: &BoneNames) -> Self {
        let mut map = Self::default();
        for role in BoneRole::ALL {
            map.bones[role.slot()] = names.resolve(skeleton, role);
        }
        map
    }

    pub fn get(&self, role: BoneRole) -> Option<BoneId> {
        self.bones[role.slot()]
    }

    pub fn contains(&self, role: BoneRole) -> bool {
        self.get(role).is_some()
    }

    pub fn missing(&self) -> Vec<BoneRole> {
        BoneRole::ALL.iter().copied().filter(|r| !self.contains(*r)).collect()
    }

    pub fn resolved_count(&self) -> usize {
        self.bones.iter().filter(|b| b.is_some()).count()
    }
}
