//! Second-order IIR shelving filters (RBJ cookbook design).
//!
//! Used by the voice enhancer for the warmth (low shelf) and presence
//! (high shelf) bands. Coefficient updates leave the delay state untouched so
//! a running filter can be retuned without a click.

use std::f32::consts::PI;

// Shelf slope used for both shelves (Q-equivalent of 0.707).
const SHELF_SLOPE: f32 = 0.707;
// Gains below this magnitude collapse the filter to identity.
const FLAT_GAIN_DB: f32 = 0.01;

/// Direct-form-I biquad.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    pub fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        // Anti-denormal offset.
        self.y1 = out + 1e-25;

        out
    }

    /// Clear the delay state. Not called by coefficient updates.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    fn set_identity(&mut self) {
        self.b0 = 1.0;
        self.b1 = 0.0;
        self.b2 = 0.0;
        self.a1 = 0.0;
        self.a2 = 0.0;
    }

    // Slope-derived alpha term; keeps the shelf stable across the gain range.
    fn shelf_alpha(a: f32, sin_w0: f32) -> f32 {
        sin_w0 * 0.5 * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt()
    }

    pub fn update_low_shelf(&mut self, cutoff: f32, gain_db: f32, sr: f32) {
        if gain_db.abs() < FLAT_GAIN_DB {
            self.set_identity();
            return;
        }

        let a = 10.0f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * cutoff / sr;
        let (sin_w0, cos_w0) = (w0.sin(), w0.cos());
        let alpha = Self::shelf_alpha(a, sin_w0);
        let sqrt_a = a.sqrt();

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha);
        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha;

        let inv_a0 = 1.0 / a0;
        self.b0 = b0 * inv_a0;
        self.b1 = b1 * inv_a0;
        self.b2 = b2 * inv_a0;
        self.a1 = a1 * inv_a0;
        self.a2 = a2 * inv_a0;
    }

    pub fn update_high_shelf(&mut self, cutoff: f32, gain_db: f32, sr: f32) {
        if gain_db.abs() < FLAT_GAIN_DB {
            self.set_identity();
            return;
        }

        let a = 10.0f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * cutoff / sr;
        let (sin_w0, cos_w0) = (w0.sin(), w0.cos());
        let alpha = Self::shelf_alpha(a, sin_w0);
        let sqrt_a = a.sqrt();

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha;

        let inv_a0 = 1.0 / a0;
        self.b0 = b0 * inv_a0;
        self.b1 = b1 * inv_a0;
        self.b2 = b2 * inv_a0;
        self.a1 = a1 * inv_a0;
        self.a2 = a2 * inv_a0;
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}
