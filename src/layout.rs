use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allocator::{ColorToken, GraphLine, GraphNode};

pub const DEFAULT_COLUMN_PITCH: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color '{0}', expected #rrggbb")]
pub struct ColorParseError(String);

impl FromStr for Rgb {
    type Err = ColorParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let Some(hex) = raw.trim().strip_prefix('#') else {
            return Err(ColorParseError(raw.to_string()));
        };
        if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(ColorParseError(raw.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ColorParseError(raw.to_string()))
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorParseError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Rgb> for String {
    fn from(color: Rgb) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

pub const DEFAULT_FALLBACK_COLOR: Rgb = Rgb::new(0x80, 0x80, 0x80);

pub fn default_palette_colors() -> Vec<Rgb> {
    vec![
        Rgb::new(0x1f, 0x77, 0xb4),
        Rgb::new(0xff, 0x7f, 0x0e),
        Rgb::new(0x2c, 0xa0, 0x2c),
        Rgb::new(0xd6, 0x27, 0x28),
        Rgb::new(0x94, 0x67, 0xbd),
        Rgb::new(0x8c, 0x56, 0x4b),
        Rgb::new(0xe3, 0x77, 0xc2),
        Rgb::new(0x17, 0xbe, 0xcf),
    ]
}

/// Maps color tokens to concrete colors.
///
/// Explicit overrides win; otherwise tokens cycle through `colors`. A token
/// that resolves to nothing gets `fallback`.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<Rgb>,
    overrides: BTreeMap<ColorToken, Rgb>,
    fallback: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(default_palette_colors(), DEFAULT_FALLBACK_COLOR)
    }
}

impl Palette {
    pub fn new(colors: Vec<Rgb>, fallback: Rgb) -> Self {
        Self {
            colors,
            overrides: BTreeMap::new(),
            fallback,
        }
    }

    pub fn with_override(mut self, token: ColorToken, color: Rgb) -> Self {
        self.overrides.insert(token, color);
        self
    }

    pub fn resolve(&self, token: ColorToken) -> Rgb {
        if let Some(color) = self.overrides.get(&token) {
            return *color;
        }
        if self.colors.is_empty() {
            return self.fallback;
        }
        let index = usize::try_from(token.0).unwrap_or(usize::MAX) % self.colors.len();
        self.colors.get(index).copied().unwrap_or(self.fallback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from_x: f32,
    pub to_x: f32,
    pub color: Rgb,
}

/// Horizontal geometry of one row. Vertical placement belongs to the
/// presentation layer: top segments run from the row's top edge to the node
/// center, bottom segments from the node center to the bottom edge, through
/// segments span the whole row.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderGeometry {
    pub node_x: f32,
    pub node_color: Rgb,
    pub width: f32,
    pub top: Vec<Segment>,
    pub bottom: Vec<Segment>,
    pub through: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutEmitter {
    column_pitch: f32,
    origin_x: f32,
    palette: Palette,
}

impl Default for LayoutEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMN_PITCH, Palette::default())
    }
}

impl LayoutEmitter {
    pub fn new(column_pitch: f32, palette: Palette) -> Self {
        Self {
            column_pitch,
            origin_x: 0.0,
            palette,
        }
    }

    pub fn with_origin(mut self, origin_x: f32) -> Self {
        self.origin_x = origin_x;
        self
    }

    pub fn column_pitch(&self) -> f32 {
        self.column_pitch
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn column_x(&self, column: usize) -> f32 {
        self.origin_x + column as f32 * self.column_pitch + self.column_pitch / 2.0
    }

    pub fn emit(&self, node: &GraphNode) -> RenderGeometry {
        RenderGeometry {
            node_x: self.column_x(node.column),
            node_color: self.palette.resolve(node.color),
            width: node.column_count as f32 * self.column_pitch,
            top: self.segments(&node.top_lines),
            bottom: self.segments(&node.bottom_lines),
            through: self.segments(&node.through_lines),
        }
    }

    fn segments(&self, lines: &[GraphLine]) -> Vec<Segment> {
        lines
            .iter()
            .map(|line| Segment {
                from_x: self.column_x(line.from_column),
                to_x: self.column_x(line.to_column),
                color: self.palette.resolve(line.color),
            })
            .collect()
    }
}
