//! Font metrics for the PDF base-14 faces the writer uses.
//!
//! Text is emitted with printpdf's built-in Helvetica and Courier families,
//! which carry no font program and expose no glyph widths, so advances come
//! from the standard AFM tables below. Characters outside WinAnsi are
//! transliterated with `deunicode` first; measurement runs on the same
//! transliterated text the writer draws.

use crate::styling::MM_PER_PT;
use printpdf::BuiltinFont;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFamily {
    Helvetica,
    Courier,
}

/// One of the eight built-in faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontFace {
    pub family: FontFamily,
    pub bold: bool,
    pub italic: bool,
}

impl FontFace {
    pub const fn new(family: FontFamily, bold: bool, italic: bool) -> Self {
        Self {
            family,
            bold,
            italic,
        }
    }

    pub const REGULAR: FontFace = FontFace::new(FontFamily::Helvetica, false, false);
    pub const MONO: FontFace = FontFace::new(FontFamily::Courier, false, false);

    /// The matching standard PDF font.
    pub fn builtin(&self) -> BuiltinFont {
        match (self.family, self.bold, self.italic) {
            (FontFamily::Helvetica, false, false) => BuiltinFont::Helvetica,
            (FontFamily::Helvetica, false, true) => BuiltinFont::HelveticaOblique,
            (FontFamily::Helvetica, true, false) => BuiltinFont::HelveticaBold,
            (FontFamily::Helvetica, true, true) => BuiltinFont::HelveticaBoldOblique,
            (FontFamily::Courier, false, false) => BuiltinFont::Courier,
            (FontFamily::Courier, false, true) => BuiltinFont::CourierOblique,
            (FontFamily::Courier, true, false) => BuiltinFont::CourierBold,
            (FontFamily::Courier, true, true) => BuiltinFont::CourierBoldOblique,
        }
    }
}

impl Default for FontFace {
    fn default() -> Self {
        FontFace::REGULAR
    }
}

// Advance widths in 1/1000 em for bytes 32..=126.
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, //
    333, 333, 584, 584, 584, 611, 975, //
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, //
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, //
    333, 278, 333, 584, 556, 333, //
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, //
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, //
    389, 280, 389, 584, //
];

const COURIER_WIDTH: u16 = 600;

/// WinAnsi code points 0x80..=0x9F that differ from Latin-1.
const WINANSI_SPECIALS: [(char, u8); 27] = [
    ('\u{20AC}', 0x80),
    ('\u{201A}', 0x82),
    ('\u{0192}', 0x83),
    ('\u{201E}', 0x84),
    ('\u{2026}', 0x85),
    ('\u{2020}', 0x86),
    ('\u{2021}', 0x87),
    ('\u{02C6}', 0x88),
    ('\u{2030}', 0x89),
    ('\u{0160}', 0x8A),
    ('\u{2039}', 0x8B),
    ('\u{0152}', 0x8C),
    ('\u{017D}', 0x8E),
    ('\u{2018}', 0x91),
    ('\u{2019}', 0x92),
    ('\u{201C}', 0x93),
    ('\u{201D}', 0x94),
    ('\u{2022}', 0x95),
    ('\u{2013}', 0x96),
    ('\u{2014}', 0x97),
    ('\u{02DC}', 0x98),
    ('\u{2122}', 0x99),
    ('\u{0161}', 0x9A),
    ('\u{203A}', 0x9B),
    ('\u{0153}', 0x9C),
    ('\u{017E}', 0x9E),
    ('\u{0178}', 0x9F),
];

fn winansi_byte(c: char) -> Option<u8> {
    match c as u32 {
        0x20..=0x7E | 0xA0..=0xFF => Some(c as u32 as u8),
        _ => WINANSI_SPECIALS
            .iter()
            .find(|(ch, _)| *ch == c)
            .map(|(_, b)| *b),
    }
}

/// Whether `c` can be drawn without transliteration.
pub fn is_winansi(c: char) -> bool {
    c == '\t' || winansi_byte(c).is_some()
}

/// Rewrites text so every character exists in WinAnsi.
///
/// Tabs become a space, other control characters are dropped and anything
/// outside the code page is transliterated; characters with no ASCII
/// rendition become `?`.
pub fn to_winansi_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\t' {
            out.push(' ');
            continue;
        }
        if c.is_control() {
            continue;
        }
        if winansi_byte(c).is_some() {
            out.push(c);
            continue;
        }
        match deunicode::deunicode_char(c) {
            Some(ascii) if !ascii.is_empty() => {
                out.extend(ascii.chars().filter(|ch| (' '..='~').contains(ch)));
            }
            _ => out.push('?'),
        }
    }
    out
}

fn byte_width(byte: u8, face: FontFace) -> u16 {
    if face.family == FontFamily::Courier {
        return COURIER_WIDTH;
    }
    let table = if face.bold {
        &HELVETICA_BOLD
    } else {
        &HELVETICA
    };
    match byte {
        0x20..=0x7E => table[(byte - 0x20) as usize],
        0x80 | 0x83 | 0x86 | 0x87 => 556,
        0x82 | 0x91 | 0x92 => {
            if face.bold {
                278
            } else {
                222
            }
        }
        0x84 | 0x93 | 0x94 => {
            if face.bold {
                500
            } else {
                333
            }
        }
        0x85 | 0x89 | 0x97 | 0x99 => 1000,
        0x8C | 0x9C => 1000,
        0x95 => 350,
        0x96 => 556,
        0x88 | 0x98 | 0x8B | 0x9B => 333,
        0xA0 => 278,
        _ => {
            // Latin-1 letters: measure the unaccented base letter.
            let c = byte as char;
            deunicode::deunicode_char(c)
                .and_then(|s| s.bytes().next())
                .filter(|b| (0x20..=0x7E).contains(b))
                .map(|b| table[(b - 0x20) as usize])
                .unwrap_or(556)
        }
    }
}

/// Width of `text` set in `face` at `size_pt`, in millimetres.
pub fn text_width_mm(text: &str, face: FontFace, size_pt: f32) -> f32 {
    let units: u32 = to_winansi_text(text)
        .chars()
        .filter_map(winansi_byte)
        .map(|b| byte_width(b, face) as u32)
        .sum();
    units as f32 / 1000.0 * size_pt * MM_PER_PT
}
