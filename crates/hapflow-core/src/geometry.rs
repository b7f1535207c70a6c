//! Viewport geometry for frame drawing

use glam::Vec2;

/// Axis-aligned rectangle in pixels, origin top-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            min: Vec2::new(x, y),
            max: Vec2::new(x + width, y + height),
        }
    }

    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Scale `content` to fill as much of `self` as possible while keeping
    /// its aspect ratio, centered in `self`.
    pub fn centered_fit(&self, content: Vec2) -> Rect {
        if content.x <= 0.0 || content.y <= 0.0 || self.is_empty() {
            return Rect {
                min: self.center(),
                max: self.center(),
            };
        }

        let scale = (self.width() / content.x).min(self.height() / content.y);
        let half = content * scale * 0.5;
        let center = self.center();
        Rect {
            min: center - half,
            max: center + half,
        }
    }

    /// Map this rectangle into normalized device coordinates of `viewport`
    /// as `[x, y, width, height]`, y pointing up.
    pub fn to_ndc(&self, viewport: &Rect) -> [f32; 4] {
        let vw = viewport.width().max(f32::EPSILON);
        let vh = viewport.height().max(f32::EPSILON);
        let x = (self.min.x - viewport.min.x) / vw * 2.0 - 1.0;
        let y = 1.0 - (self.max.y - viewport.min.y) / vh * 2.0;
        [x, y, self.width() / vw * 2.0, self.height() / vh * 2.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_fit_wide_content() {
        let viewport = Rect::from_size(1000.0, 1000.0);
        let fit = viewport.centered_fit(Vec2::new(1920.0, 1080.0));
        assert_eq!(fit.width(), 1000.0);
        assert!((fit.height() - 562.5).abs() < 1e-3);
        assert!((fit.min.y - 218.75).abs() < 1e-3);
        assert_eq!(fit.center(), viewport.center());
    }

    #[test]
    fn test_centered_fit_expands_small_content() {
        let viewport = Rect::new(100.0, 0.0, 800.0, 400.0);
        let fit = viewport.centered_fit(Vec2::new(64.0, 64.0));
        assert_eq!(fit.height(), 400.0);
        assert_eq!(fit.width(), 400.0);
        assert_eq!(fit.min.x, 300.0);
    }

    #[test]
    fn test_centered_fit_degenerate_content() {
        let viewport = Rect::from_size(640.0, 480.0);
        assert!(viewport.centered_fit(Vec2::ZERO).is_empty());
    }

    #[test]
    fn test_to_ndc_full_viewport() {
        let viewport = Rect::from_size(640.0, 480.0);
        assert_eq!(viewport.to_ndc(&viewport), [-1.0, -1.0, 2.0, 2.0]);
    }
}
