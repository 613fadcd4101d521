use glam::{Mat4, Vec3};
use precull_types::{Camera, CameraProjection, Handedness};

/// Manages the camera's location and projection settings.
#[derive(Debug, Clone)]
pub struct CameraManager {
    handedness: Handedness,
    view: Mat4,
    proj: Mat4,
    location: Vec3,
    data: Camera,
    aspect_ratio: f32,
}

impl CameraManager {
    /// Builds a new camera, using the given aspect ratio. If no aspect
    /// ratio is given it is assumed that no aspect ratio scaling should be
    /// done.
    pub fn new(data: Camera, handedness: Handedness, aspect_ratio: Option<f32>) -> Self {
        let aspect_ratio = aspect_ratio.unwrap_or(1.0);
        let proj = compute_projection_matrix(data, handedness, aspect_ratio);
        let view = data.view;

        Self {
            handedness,
            view,
            proj,
            location: view.inverse().w_axis.truncate(),
            data,
            aspect_ratio,
        }
    }

    /// Sets the camera data, rebuilding with the previous aspect ratio.
    pub fn set_data(&mut self, data: Camera) {
        self.set_aspect_data(data, self.aspect_ratio)
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: Option<f32>) {
        self.set_aspect_data(self.data, aspect_ratio.unwrap_or(1.0));
    }

    pub fn set_aspect_data(&mut self, data: Camera, aspect_ratio: f32) {
        self.proj = compute_projection_matrix(data, self.handedness, aspect_ratio);
        self.view = data.view;
        self.location = data.view.inverse().w_axis.truncate();
        self.data = data;
        self.aspect_ratio = aspect_ratio;
    }

    pub fn get_data(&self) -> Camera {
        self.data
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    pub fn proj(&self) -> Mat4 {
        self.proj
    }

    /// Camera position in world space.
    pub fn location(&self) -> Vec3 {
        self.location
    }

    /// Tangent of the half vertical field of view, the reference scale for
    /// the projected-size LOD metric. Orthographic and raw projections have
    /// no meaningful angle and fall back to 1.
    pub fn tan_half_vfov(&self) -> f32 {
        match self.data.projection {
            CameraProjection::Perspective { vfov, .. } => (vfov.to_radians() * 0.5).tan(),
            CameraProjection::Orthographic { .. } | CameraProjection::Raw(_) => 1.0,
        }
    }
}

fn compute_projection_matrix(data: Camera, handedness: Handedness, aspect_ratio: f32) -> Mat4 {
    match data.projection {
        CameraProjection::Orthographic { size } => {
            let half = size * 0.5;
            match handedness {
                Handedness::Left => Mat4::orthographic_lh(-half.x, half.x, -half.y, half.y, -half.z, half.z),
                Handedness::Right => Mat4::orthographic_rh(-half.x, half.x, -half.y, half.y, -half.z, half.z),
            }
        }
        CameraProjection::Perspective { vfov, near, far } => match handedness {
            Handedness::Left => Mat4::perspective_lh(vfov.to_radians(), aspect_ratio, near, far),
            Handedness::Right => Mat4::perspective_rh(vfov.to_radians(), aspect_ratio, near, far),
        },
        CameraProjection::Raw(proj) => proj,
    }
}
