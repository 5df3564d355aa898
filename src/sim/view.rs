//! Camera parameters derived from the level
//!
//! The renderer owns the projection; the level only tracks where the eye and
//! target sit and the mirrored view used to draw reflections in the ice.

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::entity::EntityState;
use super::state::Level;
use crate::settings::ViewSettings;

/// Eye, target and view matrices, y-up with the grid on the xz plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    pub eye: Vec3,
    pub target: Vec3,
    pub view: Mat4,
    /// `view` mirrored across the reflection plane
    pub view_reflect: Mat4,
    pub reflect_plane_height: f32,
    initialized: bool,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            eye: Vec3::ZERO,
            target: Vec3::ZERO,
            view: Mat4::IDENTITY,
            view_reflect: Mat4::IDENTITY,
            reflect_plane_height: 0.0,
            initialized: false,
        }
    }
}

impl ViewParams {
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Ease the camera towards `target`; the first call snaps
    pub fn track(&mut self, target: Vec3, settings: &ViewSettings) {
        let desired = target + Vec3::new(0.0, settings.eye_height, settings.eye_distance);
        if self.initialized {
            let t = settings.smoothing.clamp(0.0, 1.0);
            self.eye = self.eye.lerp(desired, t);
            self.target = self.target.lerp(target, t);
        } else {
            self.eye = desired;
            self.target = target;
            self.initialized = true;
        }
        self.view = Mat4::look_at_rh(self.eye, self.target, Vec3::Y);
        self.reflect_plane_height = settings.reflect_plane_height;
        self.view_reflect = self.view * reflection(settings.reflect_plane_height);
    }
}

/// Mirror across the horizontal plane `y = height`
pub fn reflection(height: f32) -> Mat4 {
    Mat4::from_cols(
        Vec4::X,
        Vec4::new(0.0, -1.0, 0.0, 0.0),
        Vec4::Z,
        Vec4::new(0.0, 2.0 * height, 0.0, 1.0),
    )
}

/// World position of a grid-plane point at `height`
#[inline]
pub fn world_point(pos: Vec2, height: f32) -> Vec3 {
    Vec3::new(pos.x, height, pos.y)
}

impl Level {
    /// Recompute the camera from the controlled entity
    ///
    /// Falls back to the first live penguin, then to the grid centre. Only
    /// the view parameters change.
    pub fn update_view(&mut self) {
        let focus = self
            .controlled()
            .map(|id| &self.entities[id.index()])
            .or_else(|| {
                self.entities
                    .iter()
                    .find(|e| e.is_active() && e.kind.is_penguin() && e.state != EntityState::Solved)
            })
            .map(|e| world_point(e.pos, e.height));
        let target = focus.unwrap_or_else(|| {
            let extent = Vec2::new(self.grid.width() as f32, self.grid.height() as f32) * self.cell_size;
            world_point(extent * 0.5, 0.0)
        });
        self.view.track(target, &self.settings.view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::entity::EntityType;
    use crate::sim::grid::BlockType;
    use crate::sim::layout::{EntityLayout, LevelLayout};

    #[test]
    fn test_first_update_snaps_to_penguin() {
        let layout = LevelLayout::filled(4, 4, BlockType::Ice)
            .with_entity(EntityLayout::new(EntityType::Penguin, 1, 2));
        let mut level = Level::from_layout(&layout, Settings::default()).unwrap();
        let entities = level.entities().to_vec();

        level.update_view();
        let view = level.view();
        assert!(view.is_initialized());
        assert_eq!(view.target, Vec3::new(1.5, 0.0, 2.5));
        assert_eq!(view.eye, Vec3::new(1.5, 5.0, 8.5));
        assert_eq!(level.entities(), &entities[..]);
    }

    #[test]
    fn test_empty_level_looks_at_grid_centre() {
        let mut level = Level::from_layout(&LevelLayout::filled(6, 2, BlockType::Snow), Settings::default()).unwrap();
        level.update_view();
        assert_eq!(level.view().target, Vec3::new(3.0, 0.0, 1.0));
    }

    #[test]
    fn test_tracking_eases() {
        let mut view = ViewParams::default();
        let settings = ViewSettings {
            smoothing: 0.5,
            ..Default::default()
        };
        view.track(Vec3::ZERO, &settings);
        view.track(Vec3::new(2.0, 0.0, 0.0), &settings);
        assert_eq!(view.target, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_reflected_view_mirrors_points() {
        let mut view = ViewParams::default();
        let settings = ViewSettings {
            reflect_plane_height: 0.5,
            ..Default::default()
        };
        view.track(Vec3::new(1.0, 0.0, 1.0), &settings);
        let above = Vec3::new(1.0, 2.0, 3.0);
        let below = Vec3::new(1.0, -1.0, 3.0);
        let a = view.view_reflect.transform_point3(above);
        let b = view.view.transform_point3(below);
        assert!((a - b).length() < 1e-4);
    }
}
