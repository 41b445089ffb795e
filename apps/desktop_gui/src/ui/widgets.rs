//! Small reusable widgets: avatars and inline error labels.

use eframe::egui;

/// Two-letter initials: first letters of the first and last words, or the
/// first two letters of a single word. `?` for blank names.
pub fn initials_for(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    let initials: String = match words.as_slice() {
        [] => return "?".to_string(),
        [single] => single.chars().take(2).collect(),
        [first, .., last] => first.chars().take(1).chain(last.chars().take(1)).collect(),
    };
    initials.to_uppercase()
}

/// Deterministic hue in `0..360` for a name, case-insensitive. Blank names
/// share the hue of "user".
pub fn name_hue(name: &str) -> u32 {
    let name = if name.is_empty() { "user" } else { name };
    name.to_lowercase()
        .encode_utf16()
        .fold(0u32, |hue, unit| (hue * 31 + u32::from(unit)) % 360)
}

/// The avatar background: the name's hue at 70% saturation, 45% lightness.
pub fn avatar_color(name: &str) -> egui::Color32 {
    let [r, g, b] = hsl_to_rgb(name_hue(name) as f32, 0.70, 0.45);
    egui::Color32::from_rgb(r, g, b)
}

fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [u8; 3] {
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    let channel = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [channel(r), channel(g), channel(b)]
}

pub fn avatar(ui: &mut egui::Ui, name: &str, diameter: f32) -> egui::Response {
    let (rect, response) =
        ui.allocate_exact_size(egui::vec2(diameter, diameter), egui::Sense::hover());
    if ui.is_rect_visible(rect) {
        let painter = ui.painter();
        painter.circle_filled(rect.center(), diameter / 2.0, avatar_color(name));
        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            initials_for(name),
            egui::FontId::proportional(diameter * 0.4),
            egui::Color32::WHITE,
        );
    }
    response.on_hover_text(name)
}

pub fn inline_error(ui: &mut egui::Ui, message: Option<&str>) {
    if let Some(message) = message {
        ui.colored_label(ui.visuals().error_fg_color, message);
    }
}
