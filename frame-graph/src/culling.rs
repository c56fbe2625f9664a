//! Scene culling: query interning, octree/brute-force culling, shadow-caster
//! filtering, and render-queue classification. Scene/asset state itself is
//! out of scope — this module only consumes the minimal view of it
//! described below.

use fnv::FnvHashMap;

pub type Id = u32;

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
}

/// A 4x4 transform, stored column-major. Only what shadow-bound
/// transformation needs (point transform) is implemented.
#[derive(Copy, Clone, Debug)]
pub struct Mat4 {
    pub cols: [[f32; 4]; 4],
}

impl Mat4 {
    pub fn identity() -> Self {
        let mut cols = [[0.0; 4]; 4];
        for i in 0..4 {
            cols[i][i] = 1.0;
        }
        Mat4 { cols }
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let c = &self.cols;
        Vec3::new(
            c[0][0] * p.x + c[1][0] * p.y + c[2][0] * p.z + c[3][0],
            c[0][1] * p.x + c[1][1] * p.y + c[2][1] * p.z + c[3][1],
            c[0][2] * p.x + c[1][2] * p.y + c[2][2] * p.z + c[3][2],
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Transform all 8 corners by `m` and take their bounds — an
    /// approximation, but sufficient for a pre-frustum shadow-bound
    /// transform by the shadow-light matrix.
    pub fn transform(&self, m: &Mat4) -> Aabb {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        let mut min = Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
        let mut max = Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
        for c in corners.iter().map(|&c| m.transform_point(c)) {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            min.z = min.z.min(c.z);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
            max.z = max.z.max(c.z);
        }
        Aabb { min, max }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    /// Signed distance from `p` to the plane.
    fn distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// Six-plane view frustum.
#[derive(Copy, Clone, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// True unless the AABB's positive vertex is behind any plane (a
    /// standard frustum-AABB test).
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if plane.distance(positive) < 0.0 {
                return false;
            }
        }
        true
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShadowKind {
    None,
    Regular,
    Planar,
}

#[derive(Clone, Debug)]
pub struct Camera {
    pub id: Id,
    pub position: Vec3,
    pub forward: Vec3,
    pub frustum: Frustum,
}

#[derive(Clone, Debug)]
pub struct Light {
    pub id: Id,
    pub shadow_kind: ShadowKind,
    pub view_matrix: Mat4,
}

#[derive(Clone, Debug)]
pub struct Probe {
    pub id: Id,
    pub is_cube: bool,
    pub bounds: Aabb,
}

/// Interned culling-query key: equal keys reuse the same result index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CullingQueryKey {
    pub camera: Id,
    pub light: Option<Id>,
    pub probe: Option<Id>,
    pub cast_shadow: bool,
    pub csm_level: u32,
}

#[derive(Clone, Debug)]
pub struct CullQuery {
    pub camera: Camera,
    pub light: Option<Light>,
    pub probe: Option<Probe>,
    pub cast_shadow: bool,
    pub csm_level: u32,
}

impl CullQuery {
    pub fn key(&self) -> CullingQueryKey {
        CullingQueryKey {
            camera: self.camera.id,
            light: self.light.as_ref().map(|l| l.id),
            probe: self.probe.as_ref().map(|p| p.id),
            cast_shadow: self.cast_shadow,
            csm_level: self.csm_level,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BatchingScheme {
    Instancing,
    Sorted,
}

#[derive(Clone, Debug)]
pub struct SubModelPass {
    pub phase_id: u32,
    pub blend_enabled: bool,
    pub batching: BatchingScheme,
}

#[derive(Clone, Debug)]
pub struct ModelInstance {
    pub id: Id,
    /// `None` for models the octree index has no world bounds for; these
    /// are appended unconditionally rather than frustum-tested.
    pub bounds: Option<Aabb>,
    pub visibility_mask: u32,
    pub lod: u32,
    pub disabled: bool,
    pub cast_shadow: bool,
    pub position: Vec3,
    pub passes: Vec<SubModelPass>,
}

#[derive(Clone, Debug)]
pub struct SceneView {
    pub octree_enabled: bool,
    pub models: Vec<ModelInstance>,
    pub visible_mask: u32,
    pub lod_level: u32,
}

/// Cull procedure over one [`SceneView`] for a single query.
pub struct SceneCuller<'a> {
    scene: &'a SceneView,
}

impl<'a> SceneCuller<'a> {
    pub fn new(scene: &'a SceneView) -> Self {
        SceneCuller { scene }
    }

    pub fn cull(&self, query: &CullQuery) -> Vec<Id> {
        let mut result = if self.scene.octree_enabled && query.probe.is_none() {
            self.cull_octree(query)
        } else {
            self.cull_brute_force(query)
        };

        if query.cast_shadow {
            result.retain(|&id| self.model(id).cast_shadow);
        }

        result
    }

    fn model(&self, id: Id) -> &ModelInstance {
        self.scene
            .models
            .iter()
            .find(|m| m.id == id)
            .expect("culled id did not name a model in this scene")
    }

    /// Octree-enabled branch: unbounded instances pass unconditionally
    /// (subject to visibility mask), bounded instances are frustum-tested,
    /// and the survivors are pruned by LOD.
    fn cull_octree(&self, query: &CullQuery) -> Vec<Id> {
        let mut out = Vec::new();

        for model in &self.scene.models {
            if model.disabled {
                continue;
            }
            if model.visibility_mask & self.scene.visible_mask == 0 {
                continue;
            }
            match model.bounds {
                None => out.push(model.id),
                Some(bounds) => {
                    let test_bounds = shadow_transformed_bounds(query, bounds);
                    if query.camera.frustum.intersects_aabb(&test_bounds) {
                        out.push(model.id);
                    }
                }
            }
        }

        out.retain(|&id| self.model(id).lod <= self.scene.lod_level);
        out
    }

    /// Brute-force branch: iterate every model, drop disabled /
    /// probe-mismatched / LOD-culled / frustum-outside instances. Probe
    /// queries without a cube probe test AABB-AABB instead of AABB-frustum.
    fn cull_brute_force(&self, query: &CullQuery) -> Vec<Id> {
        let mut out = Vec::new();

        for model in &self.scene.models {
            if model.disabled {
                continue;
            }
            if model.lod > self.scene.lod_level {
                continue;
            }

            let bounds = match model.bounds {
                Some(b) => shadow_transformed_bounds(query, b),
                None => {
                    out.push(model.id);
                    continue;
                }
            };

            if let Some(probe) = &query.probe {
                if !probe.is_cube {
                    if !bounds.intersects(&probe.bounds) {
                        continue;
                    }
                    out.push(model.id);
                    continue;
                }
            }

            if query.camera.frustum.intersects_aabb(&bounds) {
                out.push(model.id);
            }
        }

        out
    }
}

fn shadow_transformed_bounds(query: &CullQuery, bounds: Aabb) -> Aabb {
    match &query.light {
        Some(light) if query.cast_shadow && light.shadow_kind == ShadowKind::Planar => {
            bounds.transform(&light.view_matrix)
        }
        _ => bounds,
    }
}

/// Dedups culling queries by key, matching the source engine's
/// query-interning pass.
#[derive(Default)]
pub struct CulledResults {
    index: FnvHashMap<CullingQueryKey, usize>,
    sets: Vec<Vec<Id>>,
}

impl CulledResults {
    pub fn new() -> Self {
        CulledResults::default()
    }

    /// Run (or reuse) the cull for `query`, returning a stable result index.
    pub fn get_or_cull(&mut self, scene: &SceneView, query: &CullQuery) -> usize {
        let key = query.key();
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let result = SceneCuller::new(scene).cull(query);
        let idx = self.sets.len();
        self.sets.push(result);
        self.index.insert(key, idx);
        idx
    }

    pub fn results(&self, idx: usize) -> &[Id] {
        &self.sets[idx]
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }
}

#[derive(Copy, Clone, Debug)]
pub struct QueueTarget {
    pub phase_id: u32,
    pub scene_flags: u32,
}

const SCENE_FLAG_OPAQUE: u32 = 0x1;
const SCENE_FLAG_BLEND: u32 = 0x2;

#[derive(Copy, Clone, Debug)]
pub struct QueueEntry {
    pub model: Id,
    pub pass_index: usize,
    pub sort_depth: f32,
}

#[derive(Clone, Debug, Default)]
pub struct RenderQueues {
    pub instancing: Vec<QueueEntry>,
    pub sorted: Vec<QueueEntry>,
}

/// Classify surviving sub-model passes into the instancing queue or the
/// depth-sorted queue.
pub fn fill_queues(scene: &SceneView, survivors: &[Id], camera: &Camera, target: &QueueTarget) -> RenderQueues {
    let mut queues = RenderQueues::default();

    for &id in survivors {
        let model = scene.models.iter().find(|m| m.id == id).unwrap();
        for (pass_index, pass) in model.passes.iter().enumerate() {
            if pass.phase_id != target.phase_id {
                continue;
            }
            let category = if pass.blend_enabled { SCENE_FLAG_BLEND } else { SCENE_FLAG_OPAQUE };
            if target.scene_flags & category == 0 {
                continue;
            }

            let sort_depth = model.position.sub(camera.position).dot(camera.forward);
            let entry = QueueEntry { model: id, pass_index, sort_depth };

            match pass.batching {
                BatchingScheme::Instancing => queues.instancing.push(entry),
                BatchingScheme::Sorted => queues.sorted.push(entry),
            }
        }
    }

    queues
        .sorted
        .sort_by(|a, b| a.sort_depth.partial_cmp(&b.sort_depth).unwrap());

    queues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis_frustum() -> Frustum {
        // An effectively unbounded frustum (six planes, each always passing).
        let pass_always = Plane { normal: Vec3::new(0.0, 0.0, 0.0), d: 1.0 };
        Frustum { planes: [pass_always; 6] }
    }

    fn camera() -> Camera {
        Camera {
            id: 1,
            position: Vec3::new(0.0, 0.0, 0.0),
            forward: Vec3::new(0.0, 0.0, -1.0),
            frustum: axis_frustum(),
        }
    }

    fn model(id: Id) -> ModelInstance {
        ModelInstance {
            id,
            bounds: Some(Aabb { min: Vec3::new(-1.0, -1.0, -1.0), max: Vec3::new(1.0, 1.0, 1.0) }),
            visibility_mask: 1,
            lod: 0,
            disabled: false,
            cast_shadow: false,
            position: Vec3::new(0.0, 0.0, 0.0),
            passes: Vec::new(),
        }
    }

    #[test]
    fn identical_query_keys_dedup_to_one_culled_set() {
        let scene = SceneView {
            octree_enabled: false,
            models: vec![model(1), model(2)],
            visible_mask: 1,
            lod_level: 10,
        };

        let query_a = CullQuery {
            camera: camera(),
            light: None,
            probe: None,
            cast_shadow: false,
            csm_level: 0,
        };
        let query_b = CullQuery {
            camera: camera(),
            light: None,
            probe: None,
            cast_shadow: false,
            csm_level: 0,
        };

        let mut results = CulledResults::new();
        let idx_a = results.get_or_cull(&scene, &query_a);
        let idx_b = results.get_or_cull(&scene, &query_b);

        assert_eq!(idx_a, idx_b);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn disabled_models_are_dropped() {
        let mut m = model(1);
        m.disabled = true;
        let scene = SceneView {
            octree_enabled: false,
            models: vec![m],
            visible_mask: 1,
            lod_level: 10,
        };
        let query = CullQuery {
            camera: camera(),
            light: None,
            probe: None,
            cast_shadow: false,
            csm_level: 0,
        };
        let survivors = SceneCuller::new(&scene).cull(&query);
        assert!(survivors.is_empty());
    }

    #[test]
    fn sorted_queue_orders_by_camera_relative_depth() {
        let mut near = model(1);
        near.position = Vec3::new(0.0, 0.0, -1.0);
        near.passes.push(SubModelPass { phase_id: 0, blend_enabled: false, batching: BatchingScheme::Sorted });

        let mut far = model(2);
        far.position = Vec3::new(0.0, 0.0, -5.0);
        far.passes.push(SubModelPass { phase_id: 0, blend_enabled: false, batching: BatchingScheme::Sorted });

        let scene = SceneView {
            octree_enabled: false,
            models: vec![far.clone(), near.clone()],
            visible_mask: 1,
            lod_level: 10,
        };
        let cam = camera();
        let target = QueueTarget { phase_id: 0, scene_flags: SCENE_FLAG_OPAQUE };
        let queues = fill_queues(&scene, &[far.id, near.id], &cam, &target);

        assert_eq!(queues.sorted.len(), 2);
        assert_eq!(queues.sorted[0].model, near.id);
        assert_eq!(queues.sorted[1].model, far.id);
    }
}
