//! Scene descriptions, the built-in demo scenes, and splitting a scene across nodes.

use crate::{Color, Hittable, Light, LocalScene, Material, Model, SceneLayer, SceneObject, Sphere};
use az_math::{Aabb, Vec3};

/// Camera placement shared by every node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSetup {
    pub look_from: Vec3,
    pub look_at: Vec3,
    pub vup: Vec3,
    /// Vertical field of view in degrees
    pub vfov: f32,
}

impl Default for CameraSetup {
    fn default() -> Self {
        Self {
            look_from: Vec3::new(0.0, 0.0, 0.0),
            look_at: Vec3::new(0.0, 0.0, -1.0),
            vup: Vec3::Y,
            vfov: 90.0,
        }
    }
}

/// A whole scene before it is split across nodes.
#[derive(Debug, Clone)]
pub struct SceneDescription {
    pub name: String,
    pub objects: Vec<SceneObject>,
    pub lights: Vec<Light>,
    pub camera: CameraSetup,
}

impl SceneDescription {
    pub fn new(name: impl Into<String>, camera: CameraSetup) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
            lights: Vec::new(),
            camera,
        }
    }

    pub fn add(&mut self, object: SceneObject) {
        self.objects.push(object);
    }

    /// Add a light together with a glowing sphere standing in for it on the shadow-ignored
    /// layer, so the camera sees the light but shadow rays pass through it.
    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
        self.add(
            SceneObject::new(Sphere::new(
                light.center,
                light.radius,
                Material::diffuse_light(light.color),
            ))
            .on_layer(SceneLayer::SHADOW_IGNORED),
        );
    }

    /// Union bounds of every object.
    pub fn world_bounds(&self) -> Aabb {
        self.objects.iter().fold(Aabb::EMPTY, |acc, object| {
            Aabb::surrounding(&acc, &object.geometry.bounding_box())
        })
    }

    /// Split the scene into `nodes` local scenes.
    ///
    /// The world is cut into equal-width slabs along x; each object goes to the slab holding
    /// its bounds centroid. Lights are replicated on every node. A node whose slab holds no
    /// centroid gets an empty scene.
    pub fn distribute(&self, nodes: usize) -> Vec<LocalScene> {
        let nodes = nodes.max(1);
        let world = self.world_bounds();
        let mut per_node: Vec<Vec<SceneObject>> = vec![Vec::new(); nodes];

        for object in &self.objects {
            let slab = slab_index(&world, object.geometry.bounding_box().centroid().x, nodes);
            per_node[slab].push(object.clone());
        }

        per_node
            .into_iter()
            .map(|objects| LocalScene::new(objects, self.lights.clone()))
            .collect()
    }

    /// Look up a built-in scene by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "slabs" => Some(Self::slabs()),
            "spheres" => Some(Self::spheres()),
            _ => None,
        }
    }

    /// Names accepted by [`SceneDescription::builtin`].
    pub const BUILTIN_NAMES: [&'static str; 2] = ["slabs", "spheres"];

    /// A row of cubes on a tiled floor, laid out along x so that slab partitions stay
    /// disjoint for any node count up to the tile count.
    pub fn slabs() -> Self {
        let camera = CameraSetup {
            look_from: Vec3::new(0.0, 6.0, 16.0),
            look_at: Vec3::new(0.0, 0.5, 0.0),
            vup: Vec3::Y,
            vfov: 50.0,
        };
        let mut scene = Self::new("slabs", camera);

        let tiles = 8;
        let half_width = 8.0;
        let tile_width = 2.0 * half_width / tiles as f32;
        for i in 0..tiles {
            let x0 = -half_width + i as f32 * tile_width;
            let x1 = x0 + tile_width;
            let shade = if i % 2 == 0 { 0.75 } else { 0.55 };
            scene.add(SceneObject::new(Model::cuboid(
                Vec3::new(x0, -0.1, -4.0),
                Vec3::new(x1, 0.0, 4.0),
                Material::lambertian(Color::splat(shade)),
            )));

            let hue = i as f32 / tiles as f32;
            let albedo = Color::new(0.3 + 0.6 * hue, 0.4, 0.9 - 0.6 * hue);
            let inset = 0.25 * tile_width;
            let height = 0.6 + 0.25 * (i % 3) as f32;
            scene.add(SceneObject::new(Model::cuboid(
                Vec3::new(x0 + inset, 0.0, -inset - 0.5),
                Vec3::new(x1 - inset, height, inset + 0.5),
                Material::lambertian(albedo),
            )));
        }

        scene.add_light(Light::new(Vec3::new(-2.0, 7.0, 3.0), 0.5, Color::splat(1.0)));
        scene
    }

    /// Spheres of several materials over a tiled floor.
    pub fn spheres() -> Self {
        let camera = CameraSetup {
            look_from: Vec3::new(0.0, 2.0, 9.0),
            look_at: Vec3::new(0.0, 0.6, 0.0),
            vup: Vec3::Y,
            vfov: 45.0,
        };
        let mut scene = Self::new("spheres", camera);

        for i in 0..4 {
            let x0 = -8.0 + i as f32 * 4.0;
            scene.add(SceneObject::new(Model::cuboid(
                Vec3::new(x0, -0.1, -6.0),
                Vec3::new(x0 + 4.0, 0.0, 6.0),
                Material::lambertian(Color::splat(0.6)),
            )));
        }

        scene.add(SceneObject::new(Sphere::new(
            Vec3::new(-3.0, 1.0, 0.0),
            1.0,
            Material::lambertian(Color::new(0.8, 0.3, 0.3)),
        )));
        scene.add(SceneObject::new(Sphere::new(
            Vec3::new(-1.0, 0.6, 1.5),
            0.6,
            Material::lambertian(Color::new(0.3, 0.8, 0.3)).with_texture(Color::new(1.0, 0.9, 0.6)),
        )));
        scene.add(SceneObject::new(Sphere::new(
            Vec3::new(1.2, 1.0, 0.0),
            1.0,
            Material::dielectric(1.5),
        )));
        scene.add(SceneObject::new(Sphere::new(
            Vec3::new(3.5, 0.8, -0.5),
            0.8,
            Material::metal(Color::new(0.8, 0.8, 0.9)),
        )));

        scene.add_light(Light::new(Vec3::new(3.0, 6.0, 4.0), 0.6, Color::splat(1.0)));
        scene
    }
}

/// Equal-width x-slab holding `x`, clamped to `0..nodes`.
fn slab_index(world: &Aabb, x: f32, nodes: usize) -> usize {
    let width = world.x.size();
    if !width.is_finite() || width <= 0.0 {
        return 0;
    }
    let slab = ((x - world.x.min) / width * nodes as f32).floor();
    (slab.max(0.0) as usize).min(nodes - 1)
}
