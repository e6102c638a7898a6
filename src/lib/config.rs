//! Configuration module for page geometry and element styling.
//!
//! Styling is read from TOML. Every key is optional; anything missing, of the
//! wrong type or out of range keeps its built-in default, and a file that is
//! not valid TOML yields the defaults altogether.
//!
//! # Sections
//!
//! - `[page]` `width`, `height`, `margin` in millimetres
//! - `[text]` `size`, `textcolor`, `afterspacing`
//! - `[heading]` `sizes` (array indexed by level), `fallbacksize`, `topmargin1`,
//!   `topmargin`, `bottommargin`, `lineadvance`
//! - `[heading.N]` `textcolor`, plus `rulecolor` and `rulewidth` for levels 1-2
//! - `[code]` `size`, `textcolor`, `backgroundcolor`, `lineheight`, `padding`,
//!   `beforespacing`, `afterspacing`, `highlight`
//! - `[inline_code]` `size`, `textcolor`, `backgroundcolor`
//! - `[block_quote]` `textcolor`, `accentcolor`, `accentwidth`, `indent`,
//!   `beforespacing`, `afterspacing`
//! - `[list]` `indent`, `itemspacing`, `afterspacing`, `bullet`
//! - `[table]` `size`, `textcolor`, `headercolor`, `bordercolor`, `borderwidth`,
//!   `padding`, `minrowheight`, `beforespacing`, `afterspacing`
//! - `[link]` `textcolor`
//! - `[horizontal_rule]` `color`, `width`, `gap`
//! - `[math]` `oversample`, `inlinescale`, `displayscale`, `gap`, `cache`
//! - `[metadata]` `creator`, `author`
//! - `[render]` `strict`
//!
//! Colours are inline tables: `textcolor = { r = 0, g = 0, b = 0 }`.
//!
//! ```toml
//! [page]
//! margin = 25
//!
//! [heading]
//! sizes = [24, 20, 16, 14, 12, 11]
//!
//! [heading.1]
//! textcolor = { r = 0, g = 0, b = 0 }
//!
//! [math]
//! oversample = 4
//! ```
//!
//! The complete default file is embedded in the binary; see [`default_config_toml`].

use crate::styling::{Color, StyleMatch};
use crate::MdpError;
use log::{debug, warn};
use rust_embed::RustEmbed;
use std::fs;
use std::path::{Path, PathBuf};
use toml::Value;

/// Name of the per-project configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "mathdown2pdfrc.toml";

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Assets;

/// Configuration source for styling configuration.
/// Determines where the TOML configuration should be loaded from.
#[derive(Debug, Clone)]
pub enum ConfigSource<'a> {
    /// Use default built-in styling configuration
    Default,
    /// Load configuration from a file path
    File(&'a str),
    /// Use a TOML configuration string
    Embedded(&'a str),
}

/// Parses an RGB color from a TOML configuration value.
///
/// Returns `None` if the field is missing or any component is absent or
/// outside `0..=255`.
fn parse_color(value: Option<&Value>, field: &str) -> Option<(u8, u8, u8)> {
    value.and_then(|c| {
        let color = c.get(field)?;
        let channel = |name: &str| -> Option<u8> {
            let v = color.get(name)?.as_integer()?;
            u8::try_from(v).ok()
        };
        Some((channel("r")?, channel("g")?, channel("b")?))
    })
}

/// Reads a number that may be written as an integer or a float.
fn get_number(value: &Value, key: &str) -> Option<f32> {
    let v = value.get(key)?;
    v.as_float()
        .or_else(|| v.as_integer().map(|i| i as f64))
        .map(|f| f as f32)
        .filter(|f| f.is_finite())
}

fn positive(value: &Value, key: &str) -> Option<f32> {
    get_number(value, key).filter(|v| *v > 0.0)
}

fn non_negative(value: &Value, key: &str) -> Option<f32> {
    get_number(value, key).filter(|v| *v >= 0.0)
}

fn set_color(target: &mut Color, value: &Value, field: &str) {
    if let Some(rgb) = parse_color(Some(value), field) {
        *target = rgb.into();
    }
}

fn set_positive(target: &mut f32, value: &Value, key: &str) {
    if let Some(v) = positive(value, key) {
        *target = v;
    }
}

fn set_non_negative(target: &mut f32, value: &Value, key: &str) {
    if let Some(v) = non_negative(value, key) {
        *target = v;
    }
}

fn set_bool(target: &mut bool, value: &Value, key: &str) {
    if let Some(v) = value.get(key).and_then(|v| v.as_bool()) {
        *target = v;
    }
}

fn set_string(target: &mut String, value: &Value, key: &str) {
    if let Some(v) = value.get(key).and_then(|v| v.as_str()) {
        *target = v.to_string();
    }
}

fn apply_page(style: &mut StyleMatch, page: &Value) {
    let mut geometry = style.page;
    set_positive(&mut geometry.page_width, page, "width");
    set_positive(&mut geometry.page_height, page, "height");
    set_non_negative(&mut geometry.margin, page, "margin");
    // Margins must leave some room to write in.
    if geometry.content_width() > 10.0 && geometry.content_height() > 10.0 {
        style.page = geometry;
    } else {
        warn!("ignoring [page] settings that leave no content area");
    }
}

fn apply_heading(style: &mut StyleMatch, heading: &Value) {
    let h = &mut style.heading;
    if let Some(sizes) = heading.get("sizes").and_then(|v| v.as_array()) {
        let parsed: Option<Vec<f32>> = sizes
            .iter()
            .map(|v| {
                v.as_float()
                    .or_else(|| v.as_integer().map(|i| i as f64))
                    .map(|f| f as f32)
                    .filter(|f| *f > 0.0)
            })
            .collect();
        match parsed {
            Some(sizes) if !sizes.is_empty() => h.sizes = sizes,
            _ => warn!("ignoring invalid [heading] sizes"),
        }
    }
    set_positive(&mut h.fallback_size, heading, "fallbacksize");
    set_non_negative(&mut h.top_margin_first, heading, "topmargin1");
    set_non_negative(&mut h.top_margin, heading, "topmargin");
    set_non_negative(&mut h.bottom_margin, heading, "bottommargin");
    set_positive(&mut h.line_advance, heading, "lineadvance");

    for level in 1..=6usize {
        let Some(section) = heading.get(level.to_string()) else {
            continue;
        };
        set_color(&mut h.colors[level - 1], section, "textcolor");
        if level <= 2 {
            set_color(&mut h.rule_colors[level - 1], section, "rulecolor");
            set_non_negative(&mut h.rule_widths[level - 1], section, "rulewidth");
        }
    }
}

/// Parses a TOML configuration string and returns a complete StyleMatch.
///
/// Invalid TOML returns the defaults.
///
/// # Example
/// ```rust
/// use mathdown2pdf::config::parse_config_string;
///
/// let style = parse_config_string(r#"
/// [text]
/// size = 12
///
/// [heading.1]
/// textcolor = { r = 200, g = 0, b = 0 }
///
/// [math]
/// oversample = 4
/// "#);
/// assert_eq!(style.text.size, 12.0);
/// assert_eq!(style.heading.colors[0].r, 200);
/// assert_eq!(style.math.oversample, 4.0);
/// ```
pub fn parse_config_string(config_str: &str) -> StyleMatch {
    let config: Value = match toml::from_str(config_str) {
        Ok(v) => v,
        Err(e) => {
            warn!("invalid configuration, using defaults: {}", e);
            return StyleMatch::default();
        }
    };
    let mut style = StyleMatch::default();

    if let Some(page) = config.get("page") {
        apply_page(&mut style, page);
    }

    if let Some(text) = config.get("text") {
        set_positive(&mut style.text.size, text, "size");
        set_color(&mut style.text.color, text, "textcolor");
        set_non_negative(&mut style.text.after_spacing, text, "afterspacing");
    }

    if let Some(heading) = config.get("heading") {
        apply_heading(&mut style, heading);
    }

    if let Some(code) = config.get("code") {
        let c = &mut style.code;
        set_positive(&mut c.size, code, "size");
        set_color(&mut c.color, code, "textcolor");
        set_color(&mut c.background, code, "backgroundcolor");
        set_positive(&mut c.line_height, code, "lineheight");
        set_non_negative(&mut c.padding, code, "padding");
        set_non_negative(&mut c.before_spacing, code, "beforespacing");
        set_non_negative(&mut c.after_spacing, code, "afterspacing");
        set_bool(&mut c.highlight, code, "highlight");
    }

    if let Some(inline) = config.get("inline_code") {
        let c = &mut style.inline_code;
        set_positive(&mut c.size, inline, "size");
        set_color(&mut c.color, inline, "textcolor");
        set_color(&mut c.background, inline, "backgroundcolor");
    }

    if let Some(quote) = config.get("block_quote") {
        let q = &mut style.block_quote;
        set_color(&mut q.color, quote, "textcolor");
        set_color(&mut q.accent, quote, "accentcolor");
        set_non_negative(&mut q.accent_width, quote, "accentwidth");
        set_non_negative(&mut q.indent, quote, "indent");
        set_non_negative(&mut q.before_spacing, quote, "beforespacing");
        set_non_negative(&mut q.after_spacing, quote, "afterspacing");
    }

    if let Some(list) = config.get("list") {
        let l = &mut style.list;
        set_non_negative(&mut l.indent, list, "indent");
        set_non_negative(&mut l.item_spacing, list, "itemspacing");
        set_non_negative(&mut l.after_spacing, list, "afterspacing");
        set_string(&mut l.bullet, list, "bullet");
    }

    if let Some(table) = config.get("table") {
        let t = &mut style.table;
        set_positive(&mut t.size, table, "size");
        set_color(&mut t.color, table, "textcolor");
        set_color(&mut t.header_background, table, "headercolor");
        set_color(&mut t.border, table, "bordercolor");
        set_non_negative(&mut t.border_width, table, "borderwidth");
        set_non_negative(&mut t.padding, table, "padding");
        set_non_negative(&mut t.min_row_height, table, "minrowheight");
        set_non_negative(&mut t.before_spacing, table, "beforespacing");
        set_non_negative(&mut t.after_spacing, table, "afterspacing");
    }

    if let Some(link) = config.get("link") {
        set_color(&mut style.link_color, link, "textcolor");
    }

    if let Some(rule) = config.get("horizontal_rule") {
        let r = &mut style.horizontal_rule;
        set_color(&mut r.color, rule, "color");
        set_non_negative(&mut r.width, rule, "width");
        set_non_negative(&mut r.gap, rule, "gap");
    }

    if let Some(math) = config.get("math") {
        let m = &mut style.math;
        if let Some(factor) = positive(math, "oversample") {
            m.oversample = factor.max(2.0);
        }
        set_positive(&mut m.inline_scale, math, "inlinescale");
        set_positive(&mut m.display_scale, math, "displayscale");
        set_non_negative(&mut m.gap, math, "gap");
        set_bool(&mut m.cache, math, "cache");
    }

    if let Some(metadata) = config.get("metadata") {
        set_string(&mut style.metadata.creator, metadata, "creator");
        set_string(&mut style.metadata.author, metadata, "author");
    }

    if let Some(render) = config.get("render") {
        set_bool(&mut style.strict, render, "strict");
    }

    style
}

/// Loads and parses the complete styling configuration based on the provided source.
///
/// A file that cannot be read falls back to the defaults.
///
/// # Examples
/// ```rust
/// use mathdown2pdf::config::{ConfigSource, load_config_from_source};
///
/// let style = load_config_from_source(ConfigSource::Default);
/// assert_eq!(style.page.margin, 20.0);
///
/// let style = load_config_from_source(ConfigSource::File("nonexistent.toml"));
/// assert_eq!(style.page.margin, 20.0);
///
/// let style = load_config_from_source(ConfigSource::Embedded("[page]\nmargin = 15"));
/// assert_eq!(style.page.margin, 15.0);
/// ```
pub fn load_config_from_source(source: ConfigSource) -> StyleMatch {
    match source {
        ConfigSource::Default => StyleMatch::default(),
        ConfigSource::File(path) => {
            let config_str = match fs::read_to_string(Path::new(path)) {
                Ok(s) => s,
                Err(e) => {
                    debug!("could not read {}: {}, using defaults", path, e);
                    return StyleMatch::default();
                }
            };
            parse_config_string(&config_str)
        }
        ConfigSource::Embedded(content) => parse_config_string(content),
    }
}

/// Like [`load_config_from_source`] with a file, but reports unreadable or
/// invalid files instead of falling back.
pub fn load_config_file(path: &str) -> Result<StyleMatch, MdpError> {
    let content = fs::read_to_string(path).map_err(|e| MdpError::IoError {
        message: format!("Cannot read configuration file: {}", e),
        path: path.to_string(),
        suggestion: "Check the path passed to --config".to_string(),
    })?;
    if let Err(e) = toml::from_str::<Value>(&content) {
        return Err(MdpError::ConfigError {
            message: format!("{} is not valid TOML: {}", path, e),
            suggestion: "Compare with the output of --get-default-configuration".to_string(),
        });
    }
    Ok(parse_config_string(&content))
}

/// Finds the configuration file to use when none is given explicitly:
/// `./mathdown2pdfrc.toml`, then `<config dir>/mathdown2pdf/config.toml`.
pub fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    let user = dirs::config_dir()?.join("mathdown2pdf").join("config.toml");
    if user.is_file() {
        Some(user)
    } else {
        None
    }
}

/// The commented default configuration shipped with the binary.
pub fn default_config_toml() -> Option<String> {
    let file = Assets::get("default-config.toml")?;
    String::from_utf8(file.data.into_owned()).ok()
}

/// The example document inserted by `--example`.
pub fn example_markdown() -> Option<String> {
    let file = Assets::get("example.md")?;
    String::from_utf8(file.data.into_owned()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        let color_toml: Value = toml::from_str(
            r#"
            color = { r = 255, g = 128, b = 64 }
        "#,
        )
        .unwrap();
        assert_eq!(
            parse_color(Some(&color_toml), "color"),
            Some((255, 128, 64))
        );

        assert_eq!(parse_color(None, "color"), None);

        let invalid_color: Value = toml::from_str(
            r#"
            color = { r = 255, g = 128 }
        "#,
        )
        .unwrap();
        assert_eq!(parse_color(Some(&invalid_color), "color"), None);

        let out_of_range: Value = toml::from_str(
            r#"
            color = { r = 300, g = 0, b = 0 }
        "#,
        )
        .unwrap();
        assert_eq!(parse_color(Some(&out_of_range), "color"), None);
    }

    #[test]
    fn test_numbers_accept_integers_and_floats() {
        let v: Value = toml::from_str("a = 3\nb = 2.5\nc = \"x\"").unwrap();
        assert_eq!(get_number(&v, "a"), Some(3.0));
        assert_eq!(get_number(&v, "b"), Some(2.5));
        assert_eq!(get_number(&v, "c"), None);
    }

    #[test]
    fn test_parse_config_string() {
        let style = parse_config_string(
            r#"
            [page]
            margin = 25.0

            [heading]
            sizes = [30, 22, 18]
            topmargin1 = 12

            [heading.2]
            textcolor = { r = 1, g = 2, b = 3 }
            rulewidth = 1.0

            [code]
            highlight = false
            backgroundcolor = { r = 240, g = 240, b = 240 }

            [list]
            bullet = "-"

            [render]
            strict = true
        "#,
        );
        assert_eq!(style.page.margin, 25.0);
        assert_eq!(style.heading.sizes, vec![30.0, 22.0, 18.0]);
        assert_eq!(style.heading.size_for(5), style.heading.fallback_size);
        assert_eq!(style.heading.top_margin_first, 12.0);
        assert_eq!(style.heading.colors[1], Color::rgb(1, 2, 3));
        assert_eq!(style.heading.rule_widths[1], 1.0);
        assert!(!style.code.highlight);
        assert_eq!(style.code.background, Color::rgb(240, 240, 240));
        assert_eq!(style.list.bullet, "-");
        assert!(style.strict);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let defaults = StyleMatch::default();
        let style = parse_config_string(
            r#"
            [text]
            size = -4
            afterspacing = "wide"

            [page]
            margin = 200

            [math]
            oversample = 1
            "#,
        );
        assert_eq!(style.text.size, defaults.text.size);
        assert_eq!(style.text.after_spacing, defaults.text.after_spacing);
        assert_eq!(style.page, defaults.page);
        assert_eq!(style.math.oversample, 2.0);
    }

    #[test]
    fn test_parse_config_string_invalid_toml() {
        let style = parse_config_string("this is not valid toml {{{");
        assert_eq!(style, StyleMatch::default());
    }

    #[test]
    fn test_load_config() {
        let default_style = StyleMatch::default();
        assert_eq!(load_config_from_source(ConfigSource::Default), default_style);
        assert_eq!(
            load_config_from_source(ConfigSource::File("nonexistent.toml")),
            default_style
        );
    }

    #[test]
    fn test_load_config_file_reports_problems() {
        assert!(matches!(
            load_config_file("definitely/missing.toml"),
            Err(MdpError::IoError { .. })
        ));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[[[").unwrap();
        assert!(matches!(
            load_config_file(path.to_str().unwrap()),
            Err(MdpError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_default_file_matches_builtin_defaults() {
        let text = default_config_toml().expect("default config is embedded");
        assert_eq!(parse_config_string(&text), StyleMatch::default());
    }

    #[test]
    fn test_example_document_is_embedded() {
        let example = example_markdown().expect("example is embedded");
        assert!(example.contains("$$"));
    }
}
