//! Reference grid, tile partition and per-component projections (ISO/IEC 15444-1, Annex B).
//!
//! Every rectangle is half-open, `[x0, x1) x [y0, y1)`. Components are projected through their
//! own subsampling factors, and resolution levels through `ceil(x / 2^d)` where `d` is the
//! number of decomposition levels that are not reconstructed.

use crate::error::ReconError;
use crate::jpeg2000::image::J2kComponentInfo;

/// `ceil(a / b)` for `b > 0`.
#[inline]
pub fn ceil_div(a: u32, b: u32) -> u32 {
    a.div_ceil(b)
}

/// `ceil(a / 2^n)`, valid for any `n` up to 32.
#[inline]
pub fn ceil_div_pow2(a: u32, n: u8) -> u32 {
    if n >= 32 {
        return u32::from(a != 0);
    }
    ((u64::from(a) + (1u64 << n) - 1) >> n) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Projects the rectangle onto a component grid with subsampling `dx` x `dy`.
    pub fn subsampled(&self, dx: u8, dy: u8) -> Rect {
        let dx = u32::from(dx.max(1));
        let dy = u32::from(dy.max(1));
        Rect {
            x0: ceil_div(self.x0, dx),
            y0: ceil_div(self.y0, dy),
            x1: ceil_div(self.x1, dx),
            y1: ceil_div(self.y1, dy),
        }
    }

    /// Projects the rectangle `levels` decomposition levels down.
    pub fn reduced(&self, levels: u8) -> Rect {
        Rect {
            x0: ceil_div_pow2(self.x0, levels),
            y0: ceil_div_pow2(self.y0, levels),
            x1: ceil_div_pow2(self.x1, levels),
            y1: ceil_div_pow2(self.y1, levels),
        }
    }
}

/// Position of the current tile. Passed explicitly to every stage that needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileContext {
    /// Row-major tile index.
    pub index: usize,
    pub x: u32,
    pub y: u32,
}

/// Image and tile layout on the reference grid, as carried by the SIZ marker.
#[derive(Debug, Clone, Default)]
pub struct ImageGeometry {
    /// Horizontal offset of the image area on the reference grid.
    pub x_origin: u32,
    /// Vertical offset of the image area on the reference grid.
    pub y_origin: u32,
    /// Width of the image area on the reference grid.
    pub width: u32,
    /// Height of the image area on the reference grid.
    pub height: u32,
    /// Horizontal offset of the first tile.
    pub tile_x_origin: u32,
    /// Vertical offset of the first tile.
    pub tile_y_origin: u32,
    /// Nominal tile width.
    pub tile_width: u32,
    /// Nominal tile height.
    pub tile_height: u32,
    pub components: Vec<J2kComponentInfo>,
}

impl ImageGeometry {
    /// Single-tile geometry with the image at the grid origin.
    pub fn single_tile(width: u32, height: u32, components: Vec<J2kComponentInfo>) -> Self {
        Self {
            x_origin: 0,
            y_origin: 0,
            width,
            height,
            tile_x_origin: 0,
            tile_y_origin: 0,
            tile_width: width,
            tile_height: height,
            components,
        }
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.width == 0 || self.height == 0 {
            return Err(ReconError::InvalidGeometry("empty image area"));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(ReconError::InvalidGeometry("empty nominal tile size"));
        }
        if self.x_origin.checked_add(self.width).is_none()
            || self.y_origin.checked_add(self.height).is_none()
        {
            return Err(ReconError::InvalidGeometry("image area exceeds the reference grid"));
        }
        if self.tile_x_origin > self.x_origin || self.tile_y_origin > self.y_origin {
            return Err(ReconError::InvalidGeometry("tile origin lies after the image origin"));
        }
        if u64::from(self.tile_x_origin) + u64::from(self.tile_width) <= u64::from(self.x_origin)
            || u64::from(self.tile_y_origin) + u64::from(self.tile_height)
                <= u64::from(self.y_origin)
        {
            return Err(ReconError::InvalidGeometry("first tile does not cover the image origin"));
        }
        if self.components.is_empty() {
            return Err(ReconError::InvalidGeometry("no components"));
        }
        for comp in &self.components {
            if comp.dx == 0 || comp.dy == 0 {
                return Err(ReconError::InvalidGeometry("zero subsampling factor"));
            }
            if comp.depth == 0 || comp.depth > crate::constants::MAXIMUM_COMPONENT_DEPTH {
                return Err(ReconError::InvalidGeometry("unsupported component depth"));
            }
        }
        Ok(())
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// Image area on the reference grid.
    pub fn image_rect(&self) -> Rect {
        Rect::new(
            self.x_origin,
            self.y_origin,
            self.x_origin + self.width,
            self.y_origin + self.height,
        )
    }

    /// Number of tiles horizontally and vertically.
    pub fn num_tiles(&self) -> (u32, u32) {
        let ntx = ceil_div(self.x_origin + self.width - self.tile_x_origin, self.tile_width);
        let nty = ceil_div(self.y_origin + self.height - self.tile_y_origin, self.tile_height);
        (ntx, nty)
    }

    pub fn tile_count(&self) -> usize {
        let (ntx, nty) = self.num_tiles();
        ntx as usize * nty as usize
    }

    /// Tile area on the reference grid, clipped to the image area.
    pub fn tile_rect(&self, tx: u32, ty: u32) -> Rect {
        let img = self.image_rect();
        let x0 = u64::from(self.tile_x_origin) + u64::from(tx) * u64::from(self.tile_width);
        let y0 = u64::from(self.tile_y_origin) + u64::from(ty) * u64::from(self.tile_height);
        let x1 = x0 + u64::from(self.tile_width);
        let y1 = y0 + u64::from(self.tile_height);
        Rect {
            x0: x0.max(u64::from(img.x0)).min(u64::from(img.x1)) as u32,
            y0: y0.max(u64::from(img.y0)).min(u64::from(img.y1)) as u32,
            x1: x1.min(u64::from(img.x1)) as u32,
            y1: y1.min(u64::from(img.y1)) as u32,
        }
    }

    /// Tile-component area on the component's own full-resolution grid.
    pub fn tile_comp_rect(&self, tile: TileContext, c: usize) -> Result<Rect, ReconError> {
        let comp = self.components.get(c).ok_or(ReconError::ComponentOutOfRange(c))?;
        Ok(self.tile_rect(tile.x, tile.y).subsampled(comp.dx, comp.dy))
    }

    /// Component image area, `reduction` decomposition levels below full resolution.
    pub fn comp_image_rect(&self, c: usize, reduction: u8) -> Result<Rect, ReconError> {
        let comp = self.components.get(c).ok_or(ReconError::ComponentOutOfRange(c))?;
        Ok(self.image_rect().subsampled(comp.dx, comp.dy).reduced(reduction))
    }
}

/// Advance-only tile cursor with random access by tile coordinates.
#[derive(Debug, Clone)]
pub struct TileCursor {
    ntx: u32,
    nty: u32,
    current: TileContext,
}

impl TileCursor {
    pub fn new(geometry: &ImageGeometry) -> Self {
        let (ntx, nty) = geometry.num_tiles();
        Self {
            ntx,
            nty,
            current: TileContext::default(),
        }
    }

    pub fn num_tiles(&self) -> (u32, u32) {
        (self.ntx, self.nty)
    }

    pub fn tile(&self) -> TileContext {
        self.current
    }

    pub fn set_tile(&mut self, x: u32, y: u32) -> Result<TileContext, ReconError> {
        if x >= self.ntx || y >= self.nty {
            return Err(ReconError::TileOutOfRange { x, y });
        }
        self.current = TileContext {
            index: y as usize * self.ntx as usize + x as usize,
            x,
            y,
        };
        Ok(self.current)
    }

    /// Moves to the next tile in row-major order.
    pub fn next_tile(&mut self) -> Result<TileContext, ReconError> {
        let (mut x, mut y) = (self.current.x + 1, self.current.y);
        if x >= self.ntx {
            x = 0;
            y += 1;
        }
        if y >= self.nty {
            return Err(ReconError::NoMoreTiles);
        }
        self.set_tile(x, y)
    }
}
