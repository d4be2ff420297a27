//! Shared numeric constants for the drawing controller.

// ── Geometry ────────────────────────────────────────────────────

/// Padding added around every stroke point when growing a thread's bounding
/// box, and the half-width of the square used for pointer hit-testing.
pub const DRAW_BORDER_OFFSET: f64 = 5.0;

// ── Spatial index ───────────────────────────────────────────────

/// Maximum number of children per R-tree node.
pub const DEFAULT_NODE_CAPACITY: usize = 9;

/// Smallest node capacity accepted from configuration.
pub const MIN_NODE_CAPACITY: usize = 4;

/// Minimum fill ratio a node must keep after a split.
pub const MIN_FILL_RATIO: f64 = 0.4;

// ── Page layout ─────────────────────────────────────────────────

/// Default page width in document units (US letter at 72 dpi).
pub const DEFAULT_PAGE_WIDTH: f64 = 612.0;

/// Default page height in document units.
pub const DEFAULT_PAGE_HEIGHT: f64 = 792.0;

/// Default vertical gap between consecutive pages.
pub const DEFAULT_PAGE_GAP: f64 = 16.0;

/// Default number of pages in a layout.
pub const DEFAULT_PAGE_COUNT: u32 = 1;
