//! アバターのボーン階層
//!
//! ボーンはすべて `Skeleton` が所有する。呼び出し側は参照ではなく `BoneId` を持つ。

pub mod asset;
pub mod registry;

pub use asset::{load_gltf, skeleton_from_gltf, spawn_load, AssetLoad};
pub use registry::{BoneMap, BoneNames, BoneRole};

use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoneId(usize);

impl BoneId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<BoneId>,
    pub children: Vec<BoneId>,
    pub translation: Vector3<f32>,
    /// 親からの相対回転（アニメーション対象）
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Bone {
    fn local_matrix(&self) -> Matrix4<f32> {
        Matrix4::new_translation(&self.translation)
            * self.rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    roots: Vec<BoneId>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// ノードを追加。親は先に追加されている必要がある
    pub fn add_bone(
        &mut self,
        name: &str,
        parent: Option<BoneId>,
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) -> BoneId {
        self.add_scaled_bone(name, parent, translation, rotation, Vector3::repeat(1.0))
    }

    pub fn add_scaled_bone(
        &mut self,
        name: &str,
        parent: Option<BoneId>,
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        scale: Vector3<f32>,
    ) -> BoneId {
        let id = BoneId(self.bones.len());
        self.bones.push(Bone {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            translation,
            rotation,
            scale,
        });
        match parent {
            Some(p) => self.bones[p.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bone(&self, id: BoneId) -> &Bone {
        &self.bones[id.0]
    }

    pub fn bones(&self) -> impl Iterator<Item = (BoneId, &Bone)> {
        self.bones.iter().enumerate().map(|(i, b)| (BoneId(i), b))
    }

    pub fn roots(&self) -> &[BoneId] {
        &self.roots
    }

    pub fn parent(&self, id: BoneId) -> Option<BoneId> {
        self.bones[id.0].parent
    }

    /// シーングラフを深さ優先で辿り、名前が一致する最初のノードを返す
    pub fn find(&self, name: &str) -> Option<BoneId> {
        let mut stack: Vec<BoneId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let bone = &self.bones[id.0];
            if bone.name == name {
                return Some(id);
            }
            stack.extend(bone.children.iter().rev().copied());
        }
        None
    }

    pub fn local_rotation(&self, id: BoneId) -> UnitQuaternion<f32> {
        self.bones[id.0].rotation
    }

    pub fn set_local_rotation(&mut self, id: BoneId, rotation: UnitQuaternion<f32>) {
        self.bones[id.0].rotation = rotation;
    }

    /// ルートからの回転の合成（スケールは含まない）
    pub fn world_rotation(&self, id: BoneId) -> UnitQuaternion<f32> {
        let mut q = self.bones[id.0].rotation;
        let mut cur = self.bones[id.0].parent;
        while let Some(p) = cur {
            q = self.bones[p.0].rotation * q;
            cur = self.bones[p.0].parent;
        }
        q
    }

    pub fn world_matrix(&self, id: BoneId) -> Matrix4<f32> {
        let mut m = self.bones[id.0].local_matrix();
        let mut cur = self.bones[id.0].parent;
        while let Some(p) = cur {
            m = self.bones[p.0].local_matrix() * m;
            cur = self.bones[p.0].parent;
        }
        m
    }

    pub fn world_position(&self, id: BoneId) -> Point3<f32> {
        self.world_matrix(id).transform_point(&Point3::origin())
    }

    /// 全ノードのワールド位置（親子順に1回ずつ計算）
    pub fn world_positions(&self) -> Vec<Point3<f32>> {
        let mut world = vec![Matrix4::identity(); self.bones.len()];
        let mut stack: Vec<BoneId> = self.roots.clone();
        while let Some(id) = stack.pop() {
            let bone = &self.bones[id.0];
            world[id.0] = match bone.parent {
                Some(p) => world[p.0] * bone.local_matrix(),
                None => bone.local_matrix(),
            };
            stack.extend(bone.children.iter().copied());
        }
        world.iter().map(|m| m.transform_point(&Point3::origin())).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    /// 腕だけの簡易リグ（DEF- 命名）
    pub(crate) fn arm_rig() -> Skeleton {
        let mut s = Skeleton::new();
        let id = UnitQuaternion::identity();
        let root = s.add_bone("Armature", None, Vector3::zeros(), id);
        let spine = s.add_bone("DEF-spine", Some(root), Vector3::new(0.0, 1.0, 0.0), id);
        let chest = s.add_bone("DEF-chest", Some(spine), Vector3::new(0.0, 0.3, 0.0), id);
        let neck = s.add_bone("DEF-neck", Some(chest), Vector3::new(0.0, 0.3, 0.0), id);
        s.add_bone("DEF-head", Some(neck), Vector3::new(0.0, 0.1, 0.0), id);
        for (side, x) in [("L", 0.15f32), ("R", -0.15f32)] {
            let sh = s.add_bone(&format!("DEF-shoulder{}", side), Some(chest), Vector3::new(x, 0.25, 0.0), id);
            let ua = s.add_bone(&format!("DEF-upper_arm{}", side), Some(sh), Vector3::new(x, 0.0, 0.0), id);
            let fa = s.add_bone(&format!("DEF-forearm{}", side), Some(ua), Vector3::new(0.0, -0.3, 0.0), id);
            s.add_bone(&format!("DEF-hand{}", side), Some(fa), Vector3::new(0.0, -0.25, 0.0), id);
        }
        s
    }

    #[test]
    fn test_find_traverses_hierarchy() {
        let s = arm_rig();
        let fa = s.find("DEF-forearmL").unwrap();
        assert_eq!(s.bone(fa).name, "DEF-forearmL");
        assert_eq!(s.bone(s.parent(fa).unwrap()).name, "DEF-upper_armL");
        assert!(s.find("DEF-tail").is_none());
    }

    #[test]
    fn test_world_rotation_composes_parents() {
        let mut s = Skeleton::new();
        let a = s.add_bone("a", None, Vector3::zeros(), UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2));
        let b = s.add_bone("b", Some(a), Vector3::new(1.0, 0.0, 0.0), UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2));
        let expected = s.local_rotation(a) * s.local_rotation(b);
        assert!(s.world_rotation(b).angle_to(&expected) < 1e-6);

        // 子の位置は親の回転で回る: +X → -Z
        let p = s.world_position(b);
        assert!((p.x).abs() < 1e-6 && (p.z + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_world_positions_match_single_lookup() {
        let s = arm_rig();
        let all = s.world_positions();
        for (id, _) in s.bones() {
            let single = s.world_position(id);
            assert!((all[id.index()] - single).norm() < 1e-5);
        }
    }

    #[test]
    fn test_scale_applies_to_children() {
        let mut s = Skeleton::new();
        let id = UnitQuaternion::identity();
        let root = s.add_scaled_bone("root", None, Vector3::zeros(), id, Vector3::repeat(0.01));
        let child = s.add_bone("child", Some(root), Vector3::new(0.0, 100.0, 0.0), id);
        assert!((s.world_position(child).y - 1.0).abs() < 1e-5);
    }
}
