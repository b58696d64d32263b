//! The layered canvas of one sample.
//!
//! A canvas owns the image, the two overlays and the label mask, all with the
//! image's dimensions. It composites them bottom to top
//! (image, model assist, region of interest, label) with alpha-over blending
//! weighted by each layer's opacity.

use std::path::Path;

use image::{DynamicImage, RgbaImage};

use crate::config::LayerConfig;
use crate::error::{CanvasError, StoreError};
use crate::layer::{
    ImageLayer, LabelLayer, Layer, LayerRole, Opacity, OverlayLayer, OverlayPixels, SetOpacity,
};
use crate::palette::ClassPalette;
use crate::store::{DatasetStore, SamplePaths};

/// Opacity of every layer that can be faded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerOpacities {
    pub label: Opacity,
    pub model_assist: Opacity,
    pub roi: Opacity,
}

impl From<&LayerConfig> for LayerOpacities {
    fn from(config: &LayerConfig) -> Self {
        Self {
            label: Opacity::new(config.label_opacity),
            model_assist: Opacity::new(config.model_assist_opacity),
            roi: Opacity::new(config.roi_opacity),
        }
    }
}

/// Layers rejected while loading a sample. The sample itself still loaded.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub rejected: Vec<CanvasError>,
    /// A stored label exists but could not be used; the canvas label is blank
    pub label_rejected: bool,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Image, overlays and label of the current sample.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: ImageLayer,
    model_assist: OverlayLayer,
    roi: OverlayLayer,
    label: LabelLayer,
}

impl Canvas {
    /// Canvas with empty overlays and an unlabeled mask sized to the image.
    pub fn new(image: ImageLayer, opacities: LayerOpacities) -> Self {
        let (width, height) = image.dimensions();
        Self {
            image,
            model_assist: OverlayLayer::new(LayerRole::ModelAssist, opacities.model_assist),
            roi: OverlayLayer::new(LayerRole::RegionOfInterest, opacities.roi),
            label: LabelLayer::new(width, height, opacities.label),
        }
    }

    /// Load every layer of a sample.
    ///
    /// A missing or unreadable image fails the whole load. Missing overlays
    /// and labels leave their layer empty; unreadable or wrongly sized ones
    /// are left empty and listed in the report.
    pub fn load_sample(
        store: &dyn DatasetStore,
        paths: &SamplePaths,
        opacities: LayerOpacities,
    ) -> Result<(Self, LoadReport), CanvasError> {
        let image = read_raster(store, &paths.image)?.ok_or_else(|| CanvasError::ImageMissing {
            path: paths.image.clone(),
        })?;
        let mut canvas = Self::new(ImageLayer::from_dynamic(image), opacities);
        let mut report = LoadReport::default();

        if let Err(e) = canvas.load_label(store, &paths.label) {
            report.label_rejected = true;
            report.rejected.push(e);
        }
        for (role, path) in [
            (LayerRole::ModelAssist, &paths.model_assist),
            (LayerRole::RegionOfInterest, &paths.roi),
        ] {
            if let Err(e) = canvas.load_overlay(store, role, path) {
                report.rejected.push(e);
            }
        }

        for e in &report.rejected {
            log::warn!("{}", e);
        }
        let (width, height) = canvas.dimensions();
        log::info!(
            "Loaded sample {:?} ({}x{})",
            paths.image,
            width,
            height
        );
        Ok((canvas, report))
    }

    /// Replace the label from a raster. A missing file clears the label.
    ///
    /// Returns whether a raster was read. On error the label is unchanged.
    pub fn load_label(&mut self, store: &dyn DatasetStore, path: &Path) -> Result<bool, CanvasError> {
        let Some(raster) = read_raster(store, path)? else {
            self.label.clear();
            return Ok(false);
        };
        let mask = raster.into_luma8();
        self.check_dimensions(LayerRole::Label, mask.dimensions())?;
        self.label.replace(mask);
        log::debug!("Label loaded from {:?}", path);
        Ok(true)
    }

    /// Replace an overlay from a raster. A missing file leaves the overlay untouched.
    ///
    /// Returns whether a raster was read. On error the overlay is unchanged.
    pub fn load_overlay(
        &mut self,
        store: &dyn DatasetStore,
        role: LayerRole,
        path: &Path,
    ) -> Result<bool, CanvasError> {
        let Some(raster) = read_raster(store, path)? else {
            log::debug!("No {} raster at {:?}", role, path);
            return Ok(false);
        };
        let pixels = OverlayPixels::from_dynamic(raster);
        self.check_dimensions(role, pixels.dimensions())?;
        let Some(overlay) = self.overlay_mut(role) else {
            return Ok(false);
        };
        overlay.replace(pixels);
        log::debug!("{} overlay loaded from {:?}", role, path);
        Ok(true)
    }

    /// Persist the label mask.
    pub fn save_label(&self, store: &dyn DatasetStore, path: &Path) -> Result<(), CanvasError> {
        store.write_raster(self.label.mask(), path)?;
        log::info!("Saved label to {:?}", path);
        Ok(())
    }

    /// Reset the label to unlabeled.
    pub fn clear_label(&mut self) {
        self.label.clear();
        log::debug!("Label cleared");
    }

    fn check_dimensions(&self, role: LayerRole, found: (u32, u32)) -> Result<(), CanvasError> {
        let expected = self.dimensions();
        if found != expected {
            return Err(CanvasError::dimension_mismatch(role, expected, found));
        }
        Ok(())
    }

    /// Canonical `(width, height)`, taken from the image.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn label(&self) -> &LabelLayer {
        &self.label
    }

    pub fn label_mut(&mut self) -> &mut LabelLayer {
        &mut self.label
    }

    pub fn overlay(&self, role: LayerRole) -> Option<&OverlayLayer> {
        match role {
            LayerRole::ModelAssist => Some(&self.model_assist),
            LayerRole::RegionOfInterest => Some(&self.roi),
            LayerRole::Image | LayerRole::Label => None,
        }
    }

    fn overlay_mut(&mut self, role: LayerRole) -> Option<&mut OverlayLayer> {
        match role {
            LayerRole::ModelAssist => Some(&mut self.model_assist),
            LayerRole::RegionOfInterest => Some(&mut self.roi),
            LayerRole::Image | LayerRole::Label => None,
        }
    }

    pub fn set_opacity(&mut self, role: LayerRole, opacity: Opacity) {
        match role {
            LayerRole::Image => self.image.set_opacity(opacity),
            LayerRole::ModelAssist => self.model_assist.set_opacity(opacity),
            LayerRole::RegionOfInterest => self.roi.set_opacity(opacity),
            LayerRole::Label => self.label.set_opacity(opacity),
        }
        log::debug!("{} opacity: {}%", role, opacity.percent());
    }

    pub fn opacities(&self) -> LayerOpacities {
        LayerOpacities {
            label: self.layer(LayerRole::Label).opacity(),
            model_assist: self.layer(LayerRole::ModelAssist).opacity(),
            roi: self.layer(LayerRole::RegionOfInterest).opacity(),
        }
    }

    /// The layer playing `role`.
    pub fn layer(&self, role: LayerRole) -> Layer<'_> {
        match role {
            LayerRole::Image => Layer::Image(&self.image),
            LayerRole::ModelAssist => Layer::Overlay(&self.model_assist),
            LayerRole::RegionOfInterest => Layer::Overlay(&self.roi),
            LayerRole::Label => Layer::Label(&self.label),
        }
    }

    /// Layers in compositing order, bottom first.
    pub fn layers(&self) -> [Layer<'_>; 4] {
        LayerRole::Z_ORDER.map(|role| self.layer(role))
    }

    /// Flatten all layers into one opaque raster for display.
    pub fn composite(&self, palette: &ClassPalette) -> RgbaImage {
        let (width, height) = self.dimensions();
        let layers = self.layers();
        RgbaImage::from_fn(width, height, |x, y| {
            let mut out = [0.0f32; 3];
            for layer in &layers {
                let Some(src) = layer.render_pixel(x, y, palette) else {
                    continue;
                };
                let alpha = f32::from(src[3]) / 255.0 * layer.opacity().fraction();
                for (channel, value) in out.iter_mut().zip(src) {
                    *channel = f32::from(value) * alpha + *channel * (1.0 - alpha);
                }
            }
            let [r, g, b] = out.map(|c| c.round().clamp(0.0, 255.0) as u8);
            image::Rgba([r, g, b, u8::MAX])
        })
    }
}

fn read_raster(store: &dyn DatasetStore, path: &Path) -> Result<Option<DynamicImage>, CanvasError> {
    store.read_raster(path).map_err(|e| match e {
        StoreError::Image(source) => CanvasError::Load {
            path: path.to_path_buf(),
            source,
        },
        other => CanvasError::Store(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ClassDef;
    use crate::store::FsDatasetStore;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    fn palette() -> ClassPalette {
        ClassPalette::new(vec![
            ClassDef::new(1, "leaf", [0, 200, 0]),
            ClassDef::new(2, "hole", [255, 0, 0]),
        ])
        .unwrap()
    }

    fn opacities(label: u8, assist: u8) -> LayerOpacities {
        LayerOpacities {
            label: Opacity::new(label),
            model_assist: Opacity::new(assist),
            roi: Opacity::new(0),
        }
    }

    fn gray_canvas(opacities: LayerOpacities) -> Canvas {
        let image = RgbImage::from_pixel(2, 1, Rgb([100, 100, 100]));
        Canvas::new(ImageLayer::new(image), opacities)
    }

    fn setup() -> (TempDir, FsDatasetStore, SamplePaths) {
        let dir = TempDir::new().unwrap();
        let store = FsDatasetStore::new(dir.path(), "work", "accepted");
        std::fs::create_dir_all(store.image_dir()).unwrap();
        let image = store.image_dir().join("s1.png");
        RgbImage::from_pixel(6, 4, Rgb([10, 20, 30]))
            .save(&image)
            .unwrap();
        let paths = store.sample_paths(&image);
        (dir, store, paths)
    }

    #[test]
    fn test_composite_label_over_overlay() {
        let mut canvas = gray_canvas(opacities(40, 100));
        canvas
            .model_assist
            .replace(OverlayPixels::ClassMask(GrayImage::from_pixel(2, 1, Luma([1]))));
        canvas.label.mask_mut().put_pixel(1, 0, Luma([2]));

        let out = canvas.composite(&palette());
        // unlabeled pixel shows the opaque overlay, not a label tint
        assert_eq!(out.get_pixel(0, 0).0, [0, 200, 0, 255]);
        // label at 40% over the overlay
        assert_eq!(out.get_pixel(1, 0).0, [102, 120, 0, 255]);
    }

    #[test]
    fn test_composite_without_overlay_shows_image() {
        let mut canvas = gray_canvas(opacities(40, 100));
        canvas.label.mask_mut().put_pixel(1, 0, Luma([2]));
        let out = canvas.composite(&palette());
        assert_eq!(out.get_pixel(0, 0).0, [100, 100, 100, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [162, 60, 60, 255]);
    }

    #[test]
    fn test_composite_shows_roi_mask_as_loaded() {
        let image = RgbImage::from_pixel(2, 1, Rgb([120, 120, 120]));
        let mut canvas = Canvas::new(ImageLayer::new(image), opacities(50, 100));
        canvas.set_opacity(LayerRole::RegionOfInterest, Opacity::OPAQUE);
        let mut roi = GrayImage::new(2, 1);
        roi.put_pixel(0, 0, Luma([255]));
        canvas.roi.replace(OverlayPixels::ClassMask(roi));

        let out = canvas.composite(&palette());
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(out.get_pixel(1, 0).0, [0, 0, 0, 255]);

        canvas.set_opacity(LayerRole::RegionOfInterest, Opacity::new(20));
        let out = canvas.composite(&palette());
        // 255 * 0.2 + 120 * 0.8
        assert_eq!(out.get_pixel(0, 0).0, [147, 147, 147, 255]);
    }

    #[test]
    fn test_layers_follow_z_order() {
        let canvas = gray_canvas(opacities(50, 50));
        let roles = canvas.layers().map(|layer| layer.role());
        assert_eq!(roles, LayerRole::Z_ORDER);
    }

    #[test]
    fn test_opacity_zero_hides_layer() {
        let mut canvas = gray_canvas(opacities(100, 100));
        canvas.label.mask_mut().put_pixel(0, 0, Luma([1]));
        canvas.set_opacity(LayerRole::Label, Opacity::new(0));
        let out = canvas.composite(&palette());
        assert_eq!(out.get_pixel(0, 0).0, [100, 100, 100, 255]);
        assert_eq!(canvas.opacities().label.percent(), 0);
    }

    #[test]
    fn test_load_sample_without_extras() {
        let (_dir, store, paths) = setup();
        let (canvas, report) = Canvas::load_sample(&store, &paths, opacities(50, 50)).unwrap();
        assert!(report.is_clean());
        assert_eq!(canvas.dimensions(), (6, 4));
        assert!(canvas.label().is_blank());
        assert!(canvas.overlay(LayerRole::ModelAssist).unwrap().is_empty());
    }

    #[test]
    fn test_load_sample_missing_image() {
        let (_dir, store, paths) = setup();
        std::fs::remove_file(&paths.image).unwrap();
        let result = Canvas::load_sample(&store, &paths, opacities(50, 50));
        assert!(matches!(result, Err(CanvasError::ImageMissing { .. })));
    }

    #[test]
    fn test_load_sample_corrupt_image() {
        let (_dir, store, paths) = setup();
        std::fs::write(&paths.image, b"garbage").unwrap();
        let result = Canvas::load_sample(&store, &paths, opacities(50, 50));
        assert!(matches!(result, Err(CanvasError::Load { .. })));
    }

    #[test]
    fn test_corrupt_label_is_flagged() {
        let (_dir, store, paths) = setup();
        std::fs::create_dir_all(paths.label.parent().unwrap()).unwrap();
        std::fs::write(&paths.label, b"garbage").unwrap();
        let (canvas, report) = Canvas::load_sample(&store, &paths, opacities(50, 50)).unwrap();
        assert!(report.label_rejected);
        assert!(matches!(report.rejected[0], CanvasError::Load { .. }));
        assert!(canvas.label().is_blank());
    }

    #[test]
    fn test_mismatched_overlay_is_rejected_alone() {
        let (_dir, store, paths) = setup();
        store
            .write_raster(&GrayImage::new(3, 3), &paths.model_assist)
            .unwrap();
        let mut label = GrayImage::new(6, 4);
        label.put_pixel(5, 3, Luma([2]));
        store.write_raster(&label, &paths.label).unwrap();

        let (canvas, report) = Canvas::load_sample(&store, &paths, opacities(50, 50)).unwrap();
        assert_eq!(report.rejected.len(), 1);
        assert!(!report.label_rejected);
        assert!(matches!(
            report.rejected[0],
            CanvasError::DimensionMismatch {
                role: LayerRole::ModelAssist,
                expected: (6, 4),
                found: (3, 3),
            }
        ));
        assert!(canvas.overlay(LayerRole::ModelAssist).unwrap().is_empty());
        assert_eq!(canvas.label().class_at(5, 3), 2);
    }

    #[test]
    fn test_missing_overlay_keeps_previous() {
        let (_dir, store, paths) = setup();
        store
            .write_raster(&GrayImage::new(6, 4), &paths.roi)
            .unwrap();
        let (mut canvas, _) = Canvas::load_sample(&store, &paths, opacities(50, 50)).unwrap();
        assert!(!canvas.overlay(LayerRole::RegionOfInterest).unwrap().is_empty());

        std::fs::remove_file(&paths.roi).unwrap();
        let loaded = canvas
            .load_overlay(&store, LayerRole::RegionOfInterest, &paths.roi)
            .unwrap();
        assert!(!loaded);
        assert!(!canvas.overlay(LayerRole::RegionOfInterest).unwrap().is_empty());
    }

    #[test]
    fn test_save_then_reload_label() {
        let (_dir, store, paths) = setup();
        let (mut canvas, _) = Canvas::load_sample(&store, &paths, opacities(50, 50)).unwrap();
        canvas.label_mut().mask_mut().put_pixel(0, 0, Luma([1]));
        canvas.save_label(&store, &paths.label).unwrap();

        let (reloaded, _) = Canvas::load_sample(&store, &paths, opacities(50, 50)).unwrap();
        assert_eq!(reloaded.label().mask(), canvas.label().mask());
    }
}
