//! Annotation classes and the class id -> display color mapping.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Color as written in a class definition file.
///
/// Accepts either a `"#rrggbb"` string or an `[r, g, b]` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    /// Hex notation, `#rrggbb`
    Hex(String),
    /// Plain RGB triple
    Rgb([u8; 3]),
}

impl ColorSpec {
    /// Resolve to an RGB triple.
    pub fn to_rgb(&self) -> Result<[u8; 3], StoreError> {
        match self {
            ColorSpec::Rgb(rgb) => Ok(*rgb),
            ColorSpec::Hex(hex) => parse_hex_color(hex),
        }
    }
}

fn parse_hex_color(hex: &str) -> Result<[u8; 3], StoreError> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(StoreError::invalid_palette(format!(
            "color '{}' is not #rrggbb",
            hex
        )));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16)
            .map_err(|_| StoreError::invalid_palette(format!("color '{}' is not hex", hex)))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// One entry of the class definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntry {
    /// Class id written into the label mask
    pub id: u8,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Display color
    pub color: ColorSpec,
}

/// Class definition file (`classes.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassFile {
    /// Classes in declared order
    pub classes: Vec<ClassEntry>,
}

/// An annotation class with a name and color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    /// Class id written into the label mask (1..=255)
    pub id: u8,
    /// Display name of the class
    pub name: String,
    /// RGB color used when rendering the class
    pub color: [u8; 3],
}

impl ClassDef {
    /// Create a new class with the given id, name, and color.
    pub fn new(id: u8, name: &str, color: [u8; 3]) -> Self {
        Self {
            id,
            name: name.to_string(),
            color,
        }
    }
}

/// Ordered class id -> color mapping. Iteration follows declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPalette {
    classes: Vec<ClassDef>,
    lookup: Vec<Option<[u8; 3]>>,
}

impl Default for ClassPalette {
    fn default() -> Self {
        Self {
            classes: Vec::new(),
            lookup: vec![None; 256],
        }
    }
}

impl ClassPalette {
    /// Build a palette, rejecting id 0 (reserved for unlabeled) and duplicates.
    pub fn new(classes: Vec<ClassDef>) -> Result<Self, StoreError> {
        let mut lookup = vec![None; 256];
        for class in &classes {
            if class.id == 0 {
                return Err(StoreError::invalid_palette(format!(
                    "class '{}' uses reserved id 0",
                    class.name
                )));
            }
            let slot = &mut lookup[usize::from(class.id)];
            if slot.is_some() {
                return Err(StoreError::invalid_palette(format!(
                    "class id {} declared twice",
                    class.id
                )));
            }
            *slot = Some(class.color);
        }
        Ok(Self { classes, lookup })
    }

    /// Parse a class definition file.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let file: ClassFile = serde_json::from_str(json)?;
        let classes = file
            .classes
            .into_iter()
            .map(|entry| {
                Ok(ClassDef {
                    id: entry.id,
                    color: entry.color.to_rgb()?,
                    name: entry.name,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Self::new(classes)
    }

    /// Display color for a class id, `None` for unlabeled or unknown ids.
    pub fn color(&self, id: u8) -> Option<[u8; 3]> {
        self.lookup[usize::from(id)]
    }

    /// Whether a class id is declared.
    pub fn contains(&self, id: u8) -> bool {
        self.color(id).is_some()
    }

    /// Classes in declared order.
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    /// First declared class, used as the initial paint class.
    pub fn first(&self) -> Option<&ClassDef> {
        self.classes.first()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
