//! Raster layers and their shared compositing plumbing.
//!
//! Every layer is a pixel buffer plus an [`Opacity`]. The three kinds behave
//! differently:
//! - [`ImageLayer`]: the photograph, read-only, defines canonical dimensions
//! - [`OverlayLayer`]: model-assist or region-of-interest raster, replaced wholesale
//! - [`LabelLayer`]: the single paintable class-id mask
//!
//! [`Layer`] is the tagged view the canvas composites through.

use image::{DynamicImage, GrayImage, Luma, RgbImage, RgbaImage};

use crate::constants::{MAX_OPACITY, UNLABELED};
use crate::palette::ClassPalette;

/// Role a layer plays in the canvas, listed bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerRole {
    /// The sample photograph
    Image,
    /// Mask produced by the segmentation model
    ModelAssist,
    /// Region-of-interest mask
    RegionOfInterest,
    /// Editable annotation mask
    Label,
}

impl LayerRole {
    /// Compositing order, bottom first.
    pub const Z_ORDER: [LayerRole; 4] = [
        LayerRole::Image,
        LayerRole::ModelAssist,
        LayerRole::RegionOfInterest,
        LayerRole::Label,
    ];

    /// Get the display name for this role.
    pub fn name(&self) -> &'static str {
        match self {
            LayerRole::Image => "Image",
            LayerRole::ModelAssist => "Model assist",
            LayerRole::RegionOfInterest => "Region of interest",
            LayerRole::Label => "Label",
        }
    }
}

impl std::fmt::Display for LayerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Layer opacity in percent, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Opacity(u8);

impl Opacity {
    /// Fully opaque.
    pub const OPAQUE: Opacity = Opacity(MAX_OPACITY);

    /// Create an opacity, clamping to 100.
    pub fn new(percent: u8) -> Self {
        Self(percent.min(MAX_OPACITY))
    }

    /// Opacity in percent.
    pub fn percent(self) -> u8 {
        self.0
    }

    /// Opacity as a blend weight in `0.0..=1.0`.
    pub fn fraction(self) -> f32 {
        f32::from(self.0) / f32::from(MAX_OPACITY)
    }
}

impl Default for Opacity {
    fn default() -> Self {
        Self::OPAQUE
    }
}

/// The read-only photograph of a sample.
#[derive(Debug, Clone)]
pub struct ImageLayer {
    pixels: RgbImage,
    opacity: Opacity,
}

impl ImageLayer {
    pub fn new(pixels: RgbImage) -> Self {
        Self {
            pixels,
            opacity: Opacity::OPAQUE,
        }
    }

    /// Decode from any image the `image` crate can read.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::new(image.to_rgb8())
    }

    /// Canonical `(width, height)` of the sample.
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Pixel content of an overlay.
#[derive(Debug, Clone)]
pub enum OverlayPixels {
    /// Single-channel class-id mask rendered through the palette
    ClassMask(GrayImage),
    /// Pre-colored raster with its own alpha
    Rgba(RgbaImage),
}

impl OverlayPixels {
    /// Single-channel 8-bit rasters are class masks, everything else is color.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(mask) => OverlayPixels::ClassMask(mask),
            other => OverlayPixels::Rgba(other.to_rgba8()),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            OverlayPixels::ClassMask(mask) => mask.dimensions(),
            OverlayPixels::Rgba(rgba) => rgba.dimensions(),
        }
    }
}

/// A read-only auxiliary raster (model-assist or region of interest).
///
/// An overlay without pixels is empty and contributes nothing to the composite.
#[derive(Debug, Clone)]
pub struct OverlayLayer {
    role: LayerRole,
    pixels: Option<OverlayPixels>,
    opacity: Opacity,
}

impl OverlayLayer {
    pub fn new(role: LayerRole, opacity: Opacity) -> Self {
        Self {
            role,
            pixels: None,
            opacity,
        }
    }

    pub fn role(&self) -> LayerRole {
        self.role
    }

    /// Replace the whole raster.
    pub fn replace(&mut self, pixels: OverlayPixels) {
        self.pixels = Some(pixels);
    }

    /// Drop the raster, leaving the overlay empty.
    pub fn clear(&mut self) {
        self.pixels = None;
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_none()
    }

    pub fn pixels(&self) -> Option<&OverlayPixels> {
        self.pixels.as_ref()
    }
}

/// The editable class-id mask. 0 means unlabeled.
#[derive(Debug, Clone)]
pub struct LabelLayer {
    mask: GrayImage,
    opacity: Opacity,
}

impl LabelLayer {
    /// Create an all-unlabeled mask.
    pub fn new(width: u32, height: u32, opacity: Opacity) -> Self {
        Self {
            mask: GrayImage::new(width, height),
            opacity,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub(crate) fn mask_mut(&mut self) -> &mut GrayImage {
        &mut self.mask
    }

    /// Replace the mask content (bulk load or history restore).
    pub fn replace(&mut self, mask: GrayImage) {
        self.mask = mask;
    }

    /// Reset every pixel to unlabeled at the current dimensions.
    pub fn clear(&mut self) {
        let (width, height) = self.mask.dimensions();
        self.mask = GrayImage::from_pixel(width, height, Luma([UNLABELED]));
    }

    /// Class id at a pixel.
    pub fn class_at(&self, x: u32, y: u32) -> u8 {
        self.mask.get_pixel(x, y).0[0]
    }

    /// Whether no pixel carries a class.
    pub fn is_blank(&self) -> bool {
        self.mask.as_raw().iter().all(|&v| v == UNLABELED)
    }
}

/// Tagged view over one canvas layer, giving every role the same
/// render/opacity capability.
#[derive(Debug, Clone, Copy)]
pub enum Layer<'a> {
    Image(&'a ImageLayer),
    Overlay(&'a OverlayLayer),
    Label(&'a LabelLayer),
}

impl Layer<'_> {
    pub fn role(&self) -> LayerRole {
        match self {
            Layer::Image(_) => LayerRole::Image,
            Layer::Overlay(overlay) => overlay.role,
            Layer::Label(_) => LayerRole::Label,
        }
    }

    pub fn opacity(&self) -> Opacity {
        match self {
            Layer::Image(layer) => layer.opacity,
            Layer::Overlay(layer) => layer.opacity,
            Layer::Label(layer) => layer.opacity,
        }
    }

    /// Straight-alpha RGBA of this layer at a pixel, `None` where transparent.
    ///
    /// Label ids are colored through the palette; ids missing from it render
    /// transparent. A model-assist mask is colored the same way but shows
    /// palette misses as gray. Any other single-channel overlay is shown as
    /// loaded, in gray.
    pub fn render_pixel(&self, x: u32, y: u32, palette: &ClassPalette) -> Option<[u8; 4]> {
        match self {
            Layer::Image(layer) => {
                let [r, g, b] = layer.pixels.get_pixel(x, y).0;
                Some([r, g, b, u8::MAX])
            }
            Layer::Overlay(layer) => match layer.pixels.as_ref()? {
                OverlayPixels::ClassMask(mask) => {
                    let value = mask.get_pixel(x, y).0[0];
                    match layer.role {
                        LayerRole::ModelAssist if value == UNLABELED => None,
                        LayerRole::ModelAssist => {
                            Some(class_color(value, palette).unwrap_or(gray(value)))
                        }
                        _ => Some(gray(value)),
                    }
                }
                OverlayPixels::Rgba(rgba) => {
                    let px = rgba.get_pixel(x, y).0;
                    (px[3] > 0).then_some(px)
                }
            },
            Layer::Label(layer) => class_color(layer.class_at(x, y), palette),
        }
    }
}

fn gray(value: u8) -> [u8; 4] {
    [value, value, value, u8::MAX]
}

fn class_color(id: u8, palette: &ClassPalette) -> Option<[u8; 4]> {
    if id == UNLABELED {
        return None;
    }
    palette.color(id).map(|[r, g, b]| [r, g, b, u8::MAX])
}

/// Opacity setter shared by the mutable layer kinds.
pub trait SetOpacity {
    fn set_opacity(&mut self, opacity: Opacity);
}

impl SetOpacity for ImageLayer {
    fn set_opacity(&mut self, opacity: Opacity) {
        self.opacity = opacity;
    }
}

impl SetOpacity for OverlayLayer {
    fn set_opacity(&mut self, opacity: Opacity) {
        self.opacity = opacity;
    }
}

impl SetOpacity for LabelLayer {
    fn set_opacity(&mut self, opacity: Opacity) {
        self.opacity = opacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ClassDef;
    use image::Rgba;

    fn palette() -> ClassPalette {
        ClassPalette::new(vec![ClassDef::new(1, "leaf", [0, 200, 0])]).unwrap()
    }

    #[test]
    fn test_opacity_clamps() {
        assert_eq!(Opacity::new(250).percent(), 100);
        assert_eq!(Opacity::new(40).percent(), 40);
        assert!((Opacity::new(50).fraction() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_label_clear_keeps_dimensions() {
        let mut label = LabelLayer::new(4, 3, Opacity::new(50));
        label.mask_mut().put_pixel(1, 1, Luma([2]));
        assert!(!label.is_blank());

        label.clear();
        assert!(label.is_blank());
        assert_eq!(label.dimensions(), (4, 3));
    }

    #[test]
    fn test_unlabeled_renders_transparent() {
        let mut label = LabelLayer::new(2, 1, Opacity::OPAQUE);
        label.mask_mut().put_pixel(1, 0, Luma([1]));
        let palette = palette();

        assert_eq!(Layer::Label(&label).render_pixel(0, 0, &palette), None);
        assert_eq!(
            Layer::Label(&label).render_pixel(1, 0, &palette),
            Some([0, 200, 0, 255])
        );
    }

    #[test]
    fn test_unknown_class_renders_transparent() {
        let mut label = LabelLayer::new(1, 1, Opacity::OPAQUE);
        label.mask_mut().put_pixel(0, 0, Luma([7]));
        assert_eq!(Layer::Label(&label).render_pixel(0, 0, &palette()), None);
    }

    #[test]
    fn test_overlay_kinds() {
        let gray = DynamicImage::ImageLuma8(GrayImage::new(2, 2));
        assert!(matches!(
            OverlayPixels::from_dynamic(gray),
            OverlayPixels::ClassMask(_)
        ));

        let rgba = RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 0]));
        let mut overlay = OverlayLayer::new(LayerRole::RegionOfInterest, Opacity::OPAQUE);
        assert!(overlay.is_empty());
        assert_eq!(Layer::Overlay(&overlay).render_pixel(0, 0, &palette()), None);

        overlay.replace(OverlayPixels::from_dynamic(DynamicImage::ImageRgba8(rgba)));
        // fully transparent pixels contribute nothing
        assert_eq!(Layer::Overlay(&overlay).render_pixel(0, 0, &palette()), None);
        assert_eq!(overlay.pixels().map(|p| p.dimensions()), Some((2, 2)));
    }

    #[test]
    fn test_gray_overlays() {
        let mut mask = GrayImage::new(3, 1);
        mask.put_pixel(1, 0, Luma([1]));
        mask.put_pixel(2, 0, Luma([255]));
        let palette = palette();

        let mut roi = OverlayLayer::new(LayerRole::RegionOfInterest, Opacity::OPAQUE);
        roi.replace(OverlayPixels::ClassMask(mask.clone()));
        let roi = Layer::Overlay(&roi);
        assert_eq!(roi.render_pixel(0, 0, &palette), Some([0, 0, 0, 255]));
        assert_eq!(roi.render_pixel(1, 0, &palette), Some([1, 1, 1, 255]));
        assert_eq!(roi.render_pixel(2, 0, &palette), Some([255, 255, 255, 255]));

        let mut assist = OverlayLayer::new(LayerRole::ModelAssist, Opacity::OPAQUE);
        assist.replace(OverlayPixels::ClassMask(mask));
        let assist = Layer::Overlay(&assist);
        assert_eq!(assist.render_pixel(0, 0, &palette), None);
        assert_eq!(assist.render_pixel(1, 0, &palette), Some([0, 200, 0, 255]));
        // not in the palette
        assert_eq!(assist.render_pixel(2, 0, &palette), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_z_order() {
        assert_eq!(LayerRole::Z_ORDER[0], LayerRole::Image);
        assert_eq!(LayerRole::Z_ORDER[3], LayerRole::Label);
    }
}
