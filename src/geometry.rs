//! Page geometry: visible boxes, rotation and the raw/upright rectangle transform
//!
//! Two coordinate systems are in play for every page:
//!
//! - **raw content space**: the page's own user space as stored in the file,
//!   before `/Rotate` is applied. Rectangles in this module are always made
//!   relative to the visible box origin first.
//! - **upright viewer space**: what a viewer shows after rotation, with a
//!   bottom-left origin. Its width and height are swapped for 90/270 pages.
//!
//! [`to_upright`] and [`to_content_space`] are the only place that branches on
//! rotation; everything else goes through them.

/// Visible area of a page (crop box, falling back to media box)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub width: f32,
    pub height: f32,
    /// Lower-left corner of the box in raw content space
    pub offset_x: f32,
    pub offset_y: f32,
}

impl PageBox {
    /// Build a box from a PDF rectangle array `[llx lly urx ury]`.
    ///
    /// Corners may be given in any order. Returns `None` for a degenerate box.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
        let (llx, urx) = (x1.min(x2), x1.max(x2));
        let (lly, ury) = (y1.min(y2), y1.max(y2));
        let width = urx - llx;
        let height = ury - lly;
        if width > 0.0 && height > 0.0 {
            Some(Self { width, height, offset_x: llx, offset_y: lly })
        } else {
            None
        }
    }
}

/// Page rotation, always one of the four quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalize an arbitrary angle into `[0, 360)` and snap it to the nearest quarter turn.
    pub fn from_degrees(degrees: f32) -> Self {
        let normalized = ((degrees % 360.0) + 360.0) % 360.0;
        match ((normalized / 90.0).round() as i64).rem_euclid(4) {
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            3 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    /// True if `degrees` lands exactly on a quarter turn
    pub fn is_quarter_turn(degrees: f32) -> bool {
        (degrees % 90.0).abs() < f32::EPSILON
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Whether width and height trade places between raw and upright space
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Axis-aligned rectangle in points
///
/// Carries no coordinate-space tag; callers track raw vs upright themselves.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Normalize a PDF rectangle array `[llx lly urx ury]`
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    /// All four components are zero (the "not given" marker for CLI/HTTP callers)
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.width == 0.0 && self.height == 0.0
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self { x: self.x + dx, y: self.y + dy, ..*self }
    }
}

/// A rectangle expressed as fractions (0..1) of the upright page size, bottom-left origin
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fractions {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Fractions {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Express an upright rect as fractions of the upright page size
    pub fn of(upright: Rect, page: PageBox, rotation: Rotation) -> Self {
        let (w, h) = upright_size(page, rotation);
        Self {
            x: upright.x / w,
            y: upright.y / h,
            width: upright.width / w,
            height: upright.height / h,
        }
    }

    /// Scale back onto a (possibly different) page's upright size
    pub fn resolve(&self, page: PageBox, rotation: Rotation) -> Rect {
        let (w, h) = upright_size(page, rotation);
        Rect::new(self.x * w, self.y * h, self.width * w, self.height * h)
    }

    /// Every component lies in `[0, 1]`
    pub fn is_within_unit(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}

/// Size of the page as the viewer sees it
pub fn upright_size(page: PageBox, rotation: Rotation) -> (f32, f32) {
    if rotation.swaps_axes() {
        (page.height, page.width)
    } else {
        (page.width, page.height)
    }
}

/// Map a raw rect (already relative to the box origin) to upright viewer space.
pub fn to_upright(raw: Rect, page: PageBox, rotation: Rotation) -> Rect {
    let Rect { x, y, width: w, height: h } = raw;
    match rotation {
        Rotation::Deg0 => raw,
        Rotation::Deg90 => Rect::new(y, page.width - (x + w), h, w),
        Rotation::Deg180 => Rect::new(page.width - (x + w), page.height - (y + h), w, h),
        Rotation::Deg270 => Rect::new(page.height - (y + h), x, h, w),
    }
}

/// Inverse of [`to_upright`]: map an upright rect back to raw content space
/// (relative to the box origin).
pub fn to_content_space(upright: Rect, page: PageBox, rotation: Rotation) -> Rect {
    let Rect { x, y, width: w, height: h } = upright;
    match rotation {
        Rotation::Deg0 => upright,
        Rotation::Deg90 => Rect::new(page.width - (y + h), x, h, w),
        Rotation::Deg180 => Rect::new(page.width - (x + w), page.height - (y + h), w, h),
        Rotation::Deg270 => Rect::new(y, page.height - (x + w), h, w),
    }
}

/// Flip the vertical origin of an upright rect between bottom and top.
///
/// Applying it twice returns the original rect.
pub fn flip_vertical(rect: Rect, upright_height: f32) -> Rect {
    Rect { y: upright_height - rect.y - rect.height, ..rect }
}

/// `cm` operands that map an image's unit square onto `raw` (absolute raw
/// content space) so that the image reads upright once the page rotation is
/// applied by the viewer.
pub fn image_matrix(raw: Rect, rotation: Rotation) -> [f32; 6] {
    let Rect { x, y, width: w, height: h } = raw;
    match rotation {
        Rotation::Deg0 => [w, 0.0, 0.0, h, x, y],
        Rotation::Deg90 => [0.0, h, -w, 0.0, x + w, y],
        Rotation::Deg180 => [-w, 0.0, 0.0, -h, x + w, y + h],
        Rotation::Deg270 => [0.0, -h, w, 0.0, x, y + h],
    }
}
