//! RGBA color with components in [0, 1].

use serde::{Deserialize, Serialize};

use super::error::{CoreError, ensure_range};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const RED: Rgba = Rgba::opaque(1.0, 0.0, 0.0);
    pub const GREEN: Rgba = Rgba::opaque(0.0, 1.0, 0.0);
    pub const BLUE: Rgba = Rgba::opaque(0.0, 0.0, 1.0);
    pub const BLACK: Rgba = Rgba::opaque(0.0, 0.0, 0.0);
    pub const WHITE: Rgba = Rgba::opaque(1.0, 1.0, 1.0);

    /// Checked constructor; every component must be finite and in [0, 1].
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Result<Self, CoreError> {
        let color = Self { r, g, b, a };
        color.validate()?;
        Ok(color)
    }

    pub const fn opaque(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        ensure_range("color.r", f64::from(self.r), 0.0, 1.0)?;
        ensure_range("color.g", f64::from(self.g), 0.0, 1.0)?;
        ensure_range("color.b", f64::from(self.b), 0.0, 1.0)?;
        ensure_range("color.a", f64::from(self.a), 0.0, 1.0)?;
        Ok(())
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::RED
    }
}
