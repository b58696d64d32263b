//! Sample session: navigation, persistence and history lifecycle.
//!
//! A [`Session`] walks the dataset's images (oldest first, wrapping at both
//! ends) and owns the canvas, stroke engine and undo history of the current
//! sample. Every sample switch persists the outgoing label first, then loads
//! the new sample, then resets the history so index 0 is the new sample's
//! clean state.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use image::RgbaImage;

use crate::canvas::{Canvas, LayerOpacities, LoadReport};
use crate::config::{AppConfig, BrushConfig, LayerConfig};
use crate::error::{CanvasError, SegmentError};
use crate::history::{DirSnapshotStore, HistoryState, SnapshotStore, UndoHistory};
use crate::keybindings::Action;
use crate::layer::{LayerRole, Opacity};
use crate::palette::ClassPalette;
use crate::segment::{CommandSegmenter, Segmenter};
use crate::store::{AcceptedSample, DatasetStore, FsDatasetStore, SamplePaths};
use crate::stroke::{BrushEvent, BrushMode, Point, StrokeEngine};


/// Pointer buttons the canvas distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    /// Draws strokes
    Primary,
    /// Pans the view; handled by the presentation layer
    Secondary,
}

/// Pointer input in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Pressed { button: PointerButton, pos: Point },
    /// Movement with or without a button held. `resize` is the brush-resize modifier.
    Moved { pos: Point, resize: bool },
    Released { button: PointerButton },
}

/// Which sample is current.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Paths of the current sample, `None` before the first load
    pub current: Option<SamplePaths>,
    /// The stored label was rejected at load and is not overwritten until
    /// the label is edited
    pub label_on_hold: bool,
}

impl SessionState {
    pub fn current_image(&self) -> Option<&Path> {
        self.current.as_ref().map(|paths| paths.image.as_path())
    }
}

/// One annotation session over a dataset store.
pub struct Session<S: DatasetStore, H: SnapshotStore = DirSnapshotStore> {
    store: S,
    palette: ClassPalette,
    state: SessionState,
    canvas: Option<Canvas>,
    history: UndoHistory<H>,
    engine: StrokeEngine,
    segmenter: Option<Box<dyn Segmenter>>,
    initial_opacities: LayerOpacities,
    last_report: LoadReport,
}

impl Session<FsDatasetStore, DirSnapshotStore> {
    /// Open the filesystem dataset described by a configuration.
    pub fn open(config: &AppConfig) -> Result<Self, CanvasError> {
        let store = FsDatasetStore::from_config(&config.workspace);
        let history = UndoHistory::new(DirSnapshotStore::new(store.undo_dir()));
        let mut session = Self::new(store, history, &config.brush, &config.layers)?;
        if let Some(segmenter) =
            CommandSegmenter::from_config(config.workspace.segmentation_model.as_deref())
        {
            session = session.with_segmenter(Box::new(segmenter));
        }
        Ok(session)
    }
}

impl<S: DatasetStore, H: SnapshotStore> Session<S, H> {
    /// Create a session with no sample loaded. Paints the first declared class.
    pub fn new(
        store: S,
        history: UndoHistory<H>,
        brush: &BrushConfig,
        layers: &LayerConfig,
    ) -> Result<Self, CanvasError> {
        let palette = store.class_palette()?;
        let first_class = palette.first().map_or(1, |class| class.id);
        Ok(Self {
            store,
            palette,
            state: SessionState::default(),
            canvas: None,
            history,
            engine: StrokeEngine::new(brush, first_class),
            segmenter: None,
            initial_opacities: LayerOpacities::from(layers),
            last_report: LoadReport::default(),
        })
    }

    /// Attach the segmentation model used by [`Session::run_segmentation`].
    pub fn with_segmenter(mut self, segmenter: Box<dyn Segmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_image(&self) -> Option<&Path> {
        self.state.current_image()
    }

    pub fn canvas(&self) -> Option<&Canvas> {
        self.canvas.as_ref()
    }

    pub fn palette(&self) -> &ClassPalette {
        &self.palette
    }

    pub fn history_state(&self) -> HistoryState {
        self.history.state()
    }

    pub fn history(&self) -> &UndoHistory<H> {
        &self.history
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn brush_mode(&self) -> BrushMode {
        self.engine.mode()
    }

    pub fn brush_size(&self) -> u32 {
        self.engine.size()
    }

    pub fn assist_enabled(&self) -> bool {
        self.engine.assist_enabled()
    }

    /// Layers rejected by the most recent sample load.
    pub fn last_report(&self) -> &LoadReport {
        &self.last_report
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Load the most recently modified sample.
    pub fn load_latest(&mut self) -> Result<(), CanvasError> {
        let images = self.store.list_images()?;
        let Some(latest) = images.last() else {
            return Ok(());
        };
        self.persist()?;
        self.activate(latest)
    }

    /// Move `step` samples forward (negative: backward), wrapping around.
    ///
    /// Returns `false` for `step == 0`, which changes nothing.
    pub fn switch_by(&mut self, step: isize) -> Result<bool, CanvasError> {
        if step == 0 {
            return Ok(false);
        }
        let images = self.store.list_images()?;
        let current = self
            .current_image()
            .and_then(|current| images.iter().position(|image| image == current))
            .unwrap_or(0);
        let count = isize::try_from(images.len()).unwrap_or(isize::MAX);
        let anchor = isize::try_from(current).unwrap_or(0);
        let offset = step.rem_euclid(count);
        let target = usize::try_from((anchor + offset).rem_euclid(count)).unwrap_or(0);

        self.persist()?;
        self.activate(&images[target])?;
        Ok(true)
    }

    /// Load a sample and start its history. The previous sample, canvas and
    /// history are kept on failure.
    fn activate(&mut self, image: &Path) -> Result<(), CanvasError> {
        let paths = self.store.sample_paths(image);
        let opacities = self
            .canvas
            .as_ref()
            .map_or(self.initial_opacities, Canvas::opacities);
        let (canvas, report) = Canvas::load_sample(&self.store, &paths, opacities)?;

        self.history.reset(canvas.label())?;
        self.engine.cancel();
        self.canvas = Some(canvas);
        self.state.current = Some(paths);
        self.state.label_on_hold = report.label_rejected;
        self.last_report = report;
        Ok(())
    }

    /// Write the current label back to the dataset store.
    ///
    /// Returns whether a label was written. A stored label that was rejected
    /// at load is left alone until the label is edited.
    pub fn persist(&self) -> Result<bool, CanvasError> {
        let (Some(canvas), Some(paths)) = (&self.canvas, &self.state.current) else {
            return Ok(false);
        };
        if self.state.label_on_hold {
            log::warn!("Keeping rejected label {:?}; it is replaced once edited", paths.label);
            return Ok(false);
        }
        canvas.save_label(&self.store, &paths.label)?;
        Ok(true)
    }

    /// Persist before the application exits.
    pub fn close(&mut self) -> Result<bool, CanvasError> {
        self.engine.cancel();
        self.persist()
    }

    /// Copy the current image and label into the accepted corpus.
    pub fn accept(&self) -> Result<AcceptedSample, CanvasError> {
        let (Some(canvas), Some(paths)) = (&self.canvas, &self.state.current) else {
            return Err(CanvasError::NoSample);
        };
        Ok(self.store.accept(&paths.image, canvas.label().mask())?)
    }

    // ========================================================================
    // Editing
    // ========================================================================

    fn canvas_mut(&mut self) -> Result<&mut Canvas, CanvasError> {
        self.canvas.as_mut().ok_or(CanvasError::NoSample)
    }

    /// Feed pointer input to the stroke engine.
    ///
    /// Returns `true` when a stroke completed and a snapshot was taken.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Result<bool, CanvasError> {
        let canvas = self.canvas.as_mut().ok_or(CanvasError::NoSample)?;
        let label = canvas.label_mut();
        match event {
            PointerEvent::Pressed {
                button: PointerButton::Primary,
                pos,
            } => {
                self.engine.begin(pos);
                Ok(false)
            }
            PointerEvent::Moved { pos, resize } => {
                self.engine.pointer_moved(pos, resize, label);
                Ok(false)
            }
            PointerEvent::Released {
                button: PointerButton::Primary,
            } => {
                if !self.engine.end(label) {
                    return Ok(false);
                }
                self.state.label_on_hold = false;
                self.history.snapshot(label)?;
                Ok(true)
            }
            PointerEvent::Pressed {
                button: PointerButton::Secondary,
                ..
            }
            | PointerEvent::Released {
                button: PointerButton::Secondary,
            } => Ok(false),
        }
    }

    /// Draw one complete stroke through `points`.
    pub fn stroke(&mut self, points: &[Point]) -> Result<bool, CanvasError> {
        let Some((first, rest)) = points.split_first() else {
            return Ok(false);
        };
        self.handle_pointer(PointerEvent::Pressed {
            button: PointerButton::Primary,
            pos: *first,
        })?;
        for &pos in rest {
            self.handle_pointer(PointerEvent::Moved { pos, resize: false })?;
        }
        self.handle_pointer(PointerEvent::Released {
            button: PointerButton::Primary,
        })
    }

    /// Stamp assisted-segmentation points. No-op unless assist mode is on.
    pub fn stamp_points(&mut self, points: &[(u32, u32)]) -> Result<bool, CanvasError> {
        let canvas = self.canvas.as_mut().ok_or(CanvasError::NoSample)?;
        if !self.engine.stamp_points(points, canvas.label_mut()) {
            return Ok(false);
        }
        self.state.label_on_hold = false;
        self.history.snapshot(canvas.label())?;
        Ok(true)
    }

    pub fn undo(&mut self) -> Result<bool, CanvasError> {
        let canvas = self.canvas.as_mut().ok_or(CanvasError::NoSample)?;
        Ok(self.history.undo(canvas.label_mut())?)
    }

    pub fn redo(&mut self) -> Result<bool, CanvasError> {
        let canvas = self.canvas.as_mut().ok_or(CanvasError::NoSample)?;
        Ok(self.history.redo(canvas.label_mut())?)
    }

    /// Clear the label and record the cleared state in the history.
    pub fn clear_label(&mut self) -> Result<(), CanvasError> {
        let canvas = self.canvas.as_mut().ok_or(CanvasError::NoSample)?;
        canvas.clear_label();
        self.state.label_on_hold = false;
        self.history.snapshot(canvas.label())?;
        Ok(())
    }

    // ========================================================================
    // Brush and layers
    // ========================================================================

    /// Paint with a declared class. Unknown ids are ignored.
    pub fn select_class(&mut self, class_id: u8) -> bool {
        if !self.palette.contains(class_id) {
            log::debug!("Ignoring undeclared class {}", class_id);
            return false;
        }
        self.engine.select_class(class_id);
        true
    }

    /// Erase mode; also switches assist mode off.
    pub fn activate_eraser(&mut self) {
        self.engine.set_eraser(true);
        self.engine.set_assist(false);
    }

    pub fn set_assist(&mut self, enabled: bool) {
        self.engine.set_assist(enabled);
    }

    pub fn set_brush_size(&mut self, size: u32) {
        self.engine.set_size(size);
    }

    /// Brush size changes made by the resize gesture.
    pub fn subscribe_brush(&mut self) -> Receiver<BrushEvent> {
        self.engine.subscribe()
    }

    /// Set a layer's opacity in percent; kept across sample switches.
    pub fn set_opacity(&mut self, role: LayerRole, percent: u8) -> Result<(), CanvasError> {
        self.canvas_mut()?.set_opacity(role, Opacity::new(percent));
        Ok(())
    }

    /// Flatten the current sample for display.
    pub fn composite(&self) -> Result<RgbaImage, CanvasError> {
        let canvas = self.canvas.as_ref().ok_or(CanvasError::NoSample)?;
        Ok(canvas.composite(&self.palette))
    }

    // ========================================================================
    // Segmentation model
    // ========================================================================

    /// Run the model on the current image and show its output as the
    /// model-assist overlay. The canvas is unchanged on failure.
    pub fn run_segmentation(&mut self) -> Result<PathBuf, CanvasError> {
        let segmenter = self
            .segmenter
            .as_ref()
            .ok_or(SegmentError::ModelUnavailable)?;
        let paths = self.state.current.as_ref().ok_or(CanvasError::NoSample)?;
        let canvas = self.canvas.as_mut().ok_or(CanvasError::NoSample)?;

        segmenter.segment(&paths.image, &paths.model_assist)?;
        canvas.load_overlay(&self.store, LayerRole::ModelAssist, &paths.model_assist)?;
        log::info!("Segmentation written to {:?}", paths.model_assist);
        Ok(paths.model_assist.clone())
    }

    // ========================================================================
    // Keyboard
    // ========================================================================

    /// Run the core operation bound to a shortcut.
    ///
    /// Returns whether anything changed.
    pub fn apply(&mut self, action: Action) -> Result<bool, CanvasError> {
        log::debug!("Action: {:?}", action);
        match action {
            Action::Undo => self.undo(),
            Action::Redo => self.redo(),
            Action::ClearLabel => self.clear_label().map(|()| true),
            Action::NextSample => self.switch_by(1),
            Action::PreviousSample => self.switch_by(-1),
            Action::SelectClass(id) => Ok(self.select_class(id)),
            Action::ToggleAssist => {
                let enabled = !self.engine.assist_enabled();
                self.set_assist(enabled);
                Ok(true)
            }
            Action::Eraser => {
                self.activate_eraser();
                Ok(true)
            }
        }
    }
}
