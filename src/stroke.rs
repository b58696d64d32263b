//! Stroke engine: turns pointer input into paint/erase operations on the label mask.
//!
//! A stroke is `begin` → any number of `extend` → `end`. Every `extend` draws a
//! round-capped segment from the previous position straight into the mask.
//! `end` reports whether a stroke completed so the caller can take exactly one
//! history snapshot for it.
//!
//! While the resize modifier is held, pointer movement changes the brush
//! diameter by the horizontal displacement instead of drawing. Size changes
//! are announced as [`BrushEvent`]s to every subscriber.

use std::sync::mpsc::{self, Receiver, Sender};

use image::{GrayImage, Luma};

use crate::config::BrushConfig;
use crate::constants::UNLABELED;
use crate::layer::LabelLayer;

/// A pointer position in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// What the brush writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushMode {
    /// Write a class id
    Paint(u8),
    /// Reset pixels to unlabeled
    Erase,
}

impl BrushMode {
    /// Mask value this mode writes.
    pub fn value(self) -> u8 {
        match self {
            BrushMode::Paint(id) => id,
            BrushMode::Erase => UNLABELED,
        }
    }
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushEvent {
    /// The resize gesture changed the brush diameter
    SizeChanged(u32),
}

#[derive(Debug, Clone, Copy)]
struct ActiveStroke {
    last: Point,
    drew: bool,
}

/// Brush state plus the stroke in progress.
#[derive(Debug)]
pub struct StrokeEngine {
    mode: BrushMode,
    last_class: u8,
    size: u32,
    min_size: u32,
    max_size: u32,
    assist: bool,
    stroke: Option<ActiveStroke>,
    resize_anchor: Option<Point>,
    listeners: Vec<Sender<BrushEvent>>,
}

impl StrokeEngine {
    /// Create an engine painting `class_id`.
    pub fn new(brush: &BrushConfig, class_id: u8) -> Self {
        let min_size = brush.min_size.max(1);
        let max_size = brush.max_size.max(min_size);
        Self {
            mode: BrushMode::Paint(class_id),
            last_class: class_id,
            size: brush.default_size.clamp(min_size, max_size),
            min_size,
            max_size,
            assist: false,
            stroke: None,
            resize_anchor: None,
            listeners: Vec::new(),
        }
    }

    pub fn mode(&self) -> BrushMode {
        self.mode
    }

    /// Brush diameter in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Set the diameter directly (size slider), clamped to the configured range.
    pub fn set_size(&mut self, size: u32) {
        self.size = size.clamp(self.min_size, self.max_size);
    }

    /// Paint with a class. Always leaves erase mode.
    pub fn select_class(&mut self, class_id: u8) {
        self.last_class = class_id;
        self.mode = BrushMode::Paint(class_id);
        log::debug!("Brush: class {}", class_id);
    }

    /// Switch erase mode on, or back to the last painted class.
    pub fn set_eraser(&mut self, erase: bool) {
        self.mode = if erase {
            BrushMode::Erase
        } else {
            BrushMode::Paint(self.last_class)
        };
        log::debug!("Brush: eraser = {}", erase);
    }

    pub fn set_assist(&mut self, enabled: bool) {
        self.assist = enabled;
        log::debug!("Brush: assist = {}", enabled);
    }

    pub fn assist_enabled(&self) -> bool {
        self.assist
    }

    /// Drop the stroke in progress without drawing.
    pub fn cancel(&mut self) {
        self.stroke = None;
        self.resize_anchor = None;
    }

    /// Receive brush notifications.
    pub fn subscribe(&mut self) -> Receiver<BrushEvent> {
        let (sender, receiver) = mpsc::channel();
        self.listeners.push(sender);
        receiver
    }

    fn emit(&mut self, event: BrushEvent) {
        self.listeners.retain(|listener| listener.send(event).is_ok());
    }

    /// Start a stroke at `pos`. Nothing is drawn until the pointer moves or the stroke ends.
    pub fn begin(&mut self, pos: Point) {
        self.stroke = Some(ActiveStroke {
            last: pos,
            drew: false,
        });
        self.resize_anchor = None;
    }

    /// Continue the stroke to `pos`, drawing one segment.
    pub fn extend(&mut self, pos: Point, label: &mut LabelLayer) {
        let Some(stroke) = self.stroke.as_mut() else {
            return;
        };
        draw_segment(
            label.mask_mut(),
            stroke.last,
            pos,
            self.size,
            self.mode.value(),
        );
        stroke.last = pos;
        stroke.drew = true;
    }

    /// Finish the stroke. Returns `true` when a stroke was completed.
    ///
    /// A stroke that never moved stamps a single dab at its start.
    pub fn end(&mut self, label: &mut LabelLayer) -> bool {
        let Some(stroke) = self.stroke.take() else {
            return false;
        };
        if !stroke.drew {
            draw_segment(
                label.mask_mut(),
                stroke.last,
                stroke.last,
                self.size,
                self.mode.value(),
            );
        }
        true
    }

    /// Pointer movement, with or without a stroke in progress.
    ///
    /// With the modifier held this resizes the brush and never draws. Without
    /// it the resize reference is dropped and an active stroke is extended.
    pub fn pointer_moved(&mut self, pos: Point, modifier: bool, label: &mut LabelLayer) {
        if modifier {
            self.resize_towards(pos);
            return;
        }
        self.resize_anchor = None;
        if self.stroke.is_some() {
            self.extend(pos, label);
        }
    }

    fn resize_towards(&mut self, pos: Point) {
        if let Some(anchor) = self.resize_anchor {
            let dx = (pos.x - anchor.x) as i64;
            self.apply_resize(dx);
        }
        self.resize_anchor = Some(pos);
    }

    fn apply_resize(&mut self, dx: i64) {
        if dx == 0 {
            return;
        }
        let size = (i64::from(self.size) + dx)
            .clamp(i64::from(self.min_size), i64::from(self.max_size));
        self.size = u32::try_from(size).unwrap_or(self.max_size);
        log::debug!("Brush: resized to {} px", self.size);
        self.emit(BrushEvent::SizeChanged(self.size));
    }

    /// Stamp single-pixel marks from an assisted-segmentation result.
    ///
    /// No-op unless assist mode is on. Returns whether anything was stamped.
    pub fn stamp_points(&mut self, points: &[(u32, u32)], label: &mut LabelLayer) -> bool {
        if !self.assist {
            return false;
        }
        let value = Luma([self.mode.value()]);
        let mask = label.mask_mut();
        let (width, height) = mask.dimensions();
        for &(x, y) in points {
            if x < width && y < height {
                mask.put_pixel(x, y, value);
            }
        }
        log::trace!("Stamped {} assist points", points.len());
        true
    }
}

/// Draw a round-capped line of the given diameter, writing `value` (no blending).
pub fn draw_segment(mask: &mut GrayImage, from: Point, to: Point, diameter: u32, value: u8) {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let radius = (diameter as f32 / 2.0).max(0.5);

    let min_x = (from.x.min(to.x) - radius).floor().max(0.0) as u32;
    let min_y = (from.y.min(to.y) - radius).floor().max(0.0) as u32;
    let max_x = (from.x.max(to.x) + radius).ceil().min((width - 1) as f32);
    let max_y = (from.y.max(to.y) + radius).ceil().min((height - 1) as f32);
    if max_x < 0.0 || max_y < 0.0 {
        return;
    }
    let (max_x, max_y) = (max_x as u32, max_y as u32);

    let radius_sq = radius * radius;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let p = Point::new(x as f32, y as f32);
            if distance_sq_to_segment(p, from, to) <= radius_sq {
                mask.put_pixel(x, y, Luma([value]));
            }
        }
    }
    log::trace!(
        "Segment ({:.1},{:.1})->({:.1},{:.1}) d={} v={}",
        from.x,
        from.y,
        to.x,
        to.y,
        diameter,
        value
    );
}

fn distance_sq_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    (p.x - cx) * (p.x - cx) + (p.y - cy) * (p.y - cy)
}
