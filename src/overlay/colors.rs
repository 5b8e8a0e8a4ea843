use image::Rgba;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    #[error("expected LABEL=COLOR, got '{0}'")]
    Syntax(String),

    #[error("unknown colour '{0}'")]
    UnknownColor(String),
}

/// Label to display colour, with a fallback for labels not listed.
/// Entry order is the legend order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassColors {
    entries: Vec<(String, Rgba<u8>)>,
    fallback: Rgba<u8>,
}

impl Default for ClassColors {
    fn default() -> Self {
        let named = |name| named_color(name).unwrap_or(Rgba([255, 0, 0, 255]));
        Self {
            entries: vec![
                ("helmet".to_string(), named("red")),
                ("no_helmet".to_string(), named("orange")),
                ("rider".to_string(), named("blue")),
                ("platenumber".to_string(), named("green")),
            ],
            fallback: named("red"),
        }
    }
}

impl ClassColors {
    pub fn color_for(&self, label: &str) -> Rgba<u8> {
        self.entries
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, color)| *color)
            .unwrap_or(self.fallback)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, Rgba<u8>)> + '_ {
        self.entries.iter().map(|(name, color)| (name.as_str(), *color))
    }

    /// Recolour an existing label or append a new one to the legend
    pub fn set(&mut self, label: &str, color: Rgba<u8>) {
        match self.entries.iter_mut().find(|(name, _)| name == label) {
            Some(entry) => entry.1 = color,
            None => self.entries.push((label.to_string(), color)),
        }
    }

    /// Apply a `label=color` override; the label `*` sets the fallback
    pub fn apply_override(&mut self, assignment: &str) -> Result<(), ColorError> {
        let (label, color) = assignment
            .split_once('=')
            .map(|(l, c)| (l.trim(), c.trim()))
            .filter(|(l, c)| !l.is_empty() && !c.is_empty())
            .ok_or_else(|| ColorError::Syntax(assignment.to_string()))?;
        let color = named_color(color).ok_or_else(|| ColorError::UnknownColor(color.to_string()))?;

        if label == "*" {
            self.fallback = color;
        } else {
            self.set(label, color);
        }
        Ok(())
    }
}

/// CSS colour keyword or `#rrggbb`
pub fn named_color(name: &str) -> Option<Rgba<u8>> {
    let name = name.to_ascii_lowercase();
    if let Some(hex) = name.strip_prefix('#') {
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        return Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]));
    }

    let rgb = match name.as_str() {
        "red" => [255, 0, 0],
        "orange" => [255, 165, 0],
        "yellow" => [255, 255, 0],
        "green" => [0, 128, 0],
        "lime" => [0, 255, 0],
        "blue" => [0, 0, 255],
        "cyan" => [0, 255, 255],
        "magenta" => [255, 0, 255],
        "purple" => [128, 0, 128],
        "gray" | "grey" => [128, 128, 128],
        "white" => [255, 255, 255],
        "black" => [0, 0, 0],
        _ => return None,
    };
    Some(Rgba([rgb[0], rgb[1], rgb[2], 255]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_and_fallback() {
        let colors = ClassColors::default();
        assert_eq!(colors.color_for("helmet"), Rgba([255, 0, 0, 255]));
        assert_eq!(colors.color_for("rider"), Rgba([0, 0, 255, 255]));
        assert_eq!(colors.color_for("unknown"), Rgba([255, 0, 0, 255]));
        let labels: Vec<_> = colors.entries().map(|(label, _)| label).collect();
        assert_eq!(labels, ["helmet", "no_helmet", "rider", "platenumber"]);
    }

    #[test]
    fn overrides_recolour_append_and_set_fallback() {
        let mut colors = ClassColors::default();
        colors.apply_override("rider=#00ff00").unwrap();
        colors.apply_override("vest = yellow").unwrap();
        colors.apply_override("*=gray").unwrap();

        assert_eq!(colors.color_for("rider"), Rgba([0, 255, 0, 255]));
        assert_eq!(colors.color_for("vest"), Rgba([255, 255, 0, 255]));
        assert_eq!(colors.color_for("dog"), Rgba([128, 128, 128, 255]));
        assert_eq!(colors.entries().count(), 5);
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut colors = ClassColors::default();
        assert_eq!(
            colors.apply_override("helmet"),
            Err(ColorError::Syntax("helmet".to_string()))
        );
        assert_eq!(
            colors.apply_override("helmet=chartreuse"),
            Err(ColorError::UnknownColor("chartreuse".to_string()))
        );
        assert_eq!(named_color("#12345"), None);
    }
}
