use eframe::egui;

/// Fixed colors for the chat surfaces, derived from the active visuals.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub own_bubble: egui::Color32,
    pub own_text: egui::Color32,
    pub other_bubble: egui::Color32,
    pub other_text: egui::Color32,
    pub sidebar_fill: egui::Color32,
    pub selected_row: egui::Color32,
}

impl Palette {
    pub fn for_visuals(visuals: &egui::Visuals) -> Self {
        let accent = egui::Color32::from_rgb(79, 70, 229);
        if visuals.dark_mode {
            Self {
                own_bubble: accent,
                own_text: egui::Color32::WHITE,
                other_bubble: egui::Color32::from_gray(52),
                other_text: egui::Color32::from_gray(230),
                sidebar_fill: egui::Color32::from_gray(24),
                selected_row: accent.gamma_multiply(0.35),
            }
        } else {
            Self {
                own_bubble: accent,
                own_text: egui::Color32::WHITE,
                other_bubble: egui::Color32::from_gray(236),
                other_text: egui::Color32::from_gray(20),
                sidebar_fill: egui::Color32::from_gray(246),
                selected_row: accent.gamma_multiply(0.15),
            }
        }
    }
}
