use crate::config::ColorConfig;

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// HSL (all components 0..1, hue wrapping) to linear RGB
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [f32; 3] {
    let h = h.rem_euclid(1.0);
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);

    if s == 0.0 {
        return [l, l, l];
    }

    let q = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    [
        hue_to_channel(p, q, h + 1.0 / 3.0),
        hue_to_channel(p, q, h),
        hue_to_channel(p, q, h - 1.0 / 3.0),
    ]
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = if t < 0.0 {
        t + 1.0
    } else if t > 1.0 {
        t - 1.0
    } else {
        t
    };
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * 6.0 * (2.0 / 3.0 - t)
    } else {
        p
    }
}

/// Center → edge color ramp in HSL
#[derive(Clone, Copy, Debug)]
pub struct ColorRamp {
    hue: (f32, f32),
    saturation: (f32, f32),
    luminance: (f32, f32),
}

impl ColorRamp {
    pub fn new(config: &ColorConfig) -> Self {
        Self {
            hue: (config.hue_center, config.hue_edge),
            saturation: (config.sat_center, config.sat_edge),
            luminance: (config.lum_center, config.lum_edge),
        }
    }

    /// `displacement` is 0 at rest and 1 at full pulse; it is eased with the
    /// same smoothstep before interpolating.
    pub fn at(&self, displacement: f32) -> [f32; 3] {
        let s = smoothstep(0.0, 1.0, displacement);
        hsl_to_rgb(
            lerp(self.hue.0, self.hue.1, s),
            lerp(self.saturation.0, self.saturation.1, s),
            lerp(self.luminance.0, self.luminance.1, s),
        )
    }
}
