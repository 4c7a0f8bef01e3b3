use std::collections::BTreeMap;

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, LinSrgb, Mix, Srgb};

use crate::chart::spec::Series;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            to_color32(rgb)
        })
        .collect()
}

fn to_color32(rgb: Srgb) -> Color32 {
    Color32::from_rgb(
        (rgb.red.clamp(0.0, 1.0) * 255.0).round() as u8,
        (rgb.green.clamp(0.0, 1.0) * 255.0).round() as u8,
        (rgb.blue.clamp(0.0, 1.0) * 255.0).round() as u8,
    )
}

// ---------------------------------------------------------------------------
// Color mapping: colour-dimension value → Color32
// ---------------------------------------------------------------------------

/// Maps the distinct colour-dimension values of a chart to distinct colours.
#[derive(Debug, Clone)]
pub struct ColorMap {
    mapping: BTreeMap<String, Color32>,
    default_color: Color32,
}

impl ColorMap {
    /// One colour per distinct `color` key among the series. Series without a
    /// colour key share the default.
    pub fn for_series(series: &[Series]) -> Self {
        let keys: std::collections::BTreeSet<&str> = series
            .iter()
            .filter_map(|s| s.key.color.as_deref())
            .collect();
        let palette = generate_palette(keys.len());
        let mapping = keys
            .into_iter()
            .zip(palette)
            .map(|(k, c)| (k.to_string(), c))
            .collect();

        ColorMap {
            mapping,
            default_color: Color32::from_rgb(31, 119, 180),
        }
    }

    pub fn color_for(&self, value: Option<&str>) -> Color32 {
        value
            .and_then(|v| self.mapping.get(v))
            .copied()
            .unwrap_or(self.default_color)
    }
}

// ---------------------------------------------------------------------------
// Continuous scale for heatmaps
// ---------------------------------------------------------------------------

const VIRIDIS_STOPS: [(u8, u8, u8); 5] = [
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

/// Viridis colour for `t` in `[0, 1]`; values outside are clamped.
pub fn viridis(t: f64) -> Color32 {
    let t = (if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 }) as f32;
    let scaled = t * (VIRIDIS_STOPS.len() - 1) as f32;
    let idx = (scaled.floor() as usize).min(VIRIDIS_STOPS.len() - 2);
    let frac = scaled - idx as f32;

    let stop = |(r, g, b): (u8, u8, u8)| -> LinSrgb {
        Srgb::new(r, g, b).into_format::<f32>().into_linear()
    };
    let mixed = stop(VIRIDIS_STOPS[idx]).mix(stop(VIRIDIS_STOPS[idx + 1]), frac);
    to_color32(Srgb::from_linear(mixed))
}
