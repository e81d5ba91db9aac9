//! Tile placement
//!
//! The desktop is pinned to the left edge and centred vertically. Every other
//! source gets a quarter-size tile, starting in the bottom-right corner and
//! nudged left once per tile whose rectangle contains its top-left corner.
//! That single pass is not a full collision search; with three or more
//! tiles they can still overlap.
//!
//! The desktop tile takes part in the collision pass as well, which differs
//! from a pass over non-desktop tiles only. Over a full-canvas desktop every
//! new tile is pushed to x = 0, so further cameras stack on that spot.

use crate::media::Dimensions;
use serde::{Deserialize, Serialize};

/// Most tiles the canvas holds at once, desktop included
pub const MAX_TILES: usize = 5;

/// Position and size of a tile on the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    /// Whether (x, y) lies inside this rectangle (right and bottom edges excluded)
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.offset_x
            && x < self.offset_x.saturating_add(self.width)
            && y >= self.offset_y
            && y < self.offset_y.saturating_add(self.height)
    }

    /// Scale proportionally from canvas `from` to canvas `to`, flooring each value
    pub fn rescale(&self, from: Dimensions, to: Dimensions) -> Placement {
        let scale = |value: u32, old: u32, new: u32| -> u32 {
            if old == 0 {
                value
            } else {
                (value as u64 * new as u64 / old as u64) as u32
            }
        };
        Placement {
            offset_x: scale(self.offset_x, from.width, to.width),
            offset_y: scale(self.offset_y, from.height, to.height),
            width: scale(self.width, from.width, to.width),
            height: scale(self.height, from.height, to.height),
        }
    }
}

/// Placement for a new tile.
///
/// `existing` holds the placements of tiles already on the canvas, in paint
/// order.
pub fn get_position(
    is_desktop: bool,
    handle: Dimensions,
    canvas: Dimensions,
    existing: &[Placement],
) -> Placement {
    if is_desktop {
        let width = handle.width.min(canvas.width);
        let height = handle.height.min(canvas.height);
        return Placement {
            offset_x: 0,
            offset_y: (canvas.height - height) / 2,
            width,
            height,
        };
    }

    let handle_width = handle.width.max(1) as u64;
    let handle_height = handle.height.max(1) as u64;
    let (width, height) = if handle_width > handle_height {
        let width = canvas.width / 4;
        (width, (width as u64 * handle_height / handle_width) as u32)
    } else {
        let height = canvas.height / 4;
        ((height as u64 * handle_width / handle_height) as u32, height)
    };

    let (offset_x, offset_y) = get_default_offsets(width, height, canvas, existing);
    Placement {
        offset_x,
        offset_y,
        width,
        height,
    }
}

/// Bottom-right start, one leftward nudge per colliding tile. `existing`
/// includes the desktop tile.
pub fn get_default_offsets(
    width: u32,
    height: u32,
    canvas: Dimensions,
    existing: &[Placement],
) -> (u32, u32) {
    let mut x = canvas.width.saturating_sub(width);
    let y = canvas.height.saturating_sub(height);
    for tile in existing {
        if tile.contains(x, y) {
            x = tile.offset_x.saturating_sub(width);
        }
    }
    (x, y)
}
