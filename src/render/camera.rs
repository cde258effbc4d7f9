use glam::{Mat4, Vec3};

const FOV_DEGREES: f32 = 55.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 100.0;

/// Slowly swaying perspective camera looking at the origin
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    aspect: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            aspect: width.max(1) as f32 / height.max(1) as f32,
        }
    }

    pub fn eye(&self, time_s: f32) -> Vec3 {
        Vec3::new(0.6 + 0.1 * time_s.sin(), 0.8, 3.8)
    }

    pub fn view_proj(&self, time_s: f32) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye(time_s), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(FOV_DEGREES.to_radians(), self.aspect, NEAR, FAR);
        proj * view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_projects_to_screen_center() {
        let cam = Camera::new(1280, 720);
        let clip = cam.view_proj(0.0) * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn eye_sways_along_x_only() {
        let cam = Camera::new(1, 1);
        let a = cam.eye(0.0);
        let b = cam.eye(std::f32::consts::FRAC_PI_2);
        assert!((b.x - a.x - 0.1).abs() < 1e-6);
        assert_eq!(a.y, b.y);
        assert_eq!(a.z, b.z);
    }
}
