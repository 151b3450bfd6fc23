/// An axis-aligned rectangle in frame coordinates.
///
/// Produced by detection and only meaningful for the frame it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// True if `other` lies entirely inside `self` (edges may touch).
    pub fn contains(&self, other: &Region) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Region {
        Region::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Intersects the region with `[0, width) x [0, height)`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Region {
        let x1 = self.x.clamp(0, width as i32);
        let y1 = self.y.clamp(0, height as i32);
        let x2 = self.right().clamp(0, width as i32);
        let y2 = self.bottom().clamp(0, height as i32);
        Region::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0))
    }

    /// The same rectangle after mirroring a frame of `frame_width` pixels.
    pub fn mirror_x(&self, frame_width: u32) -> Region {
        Region::new(
            frame_width as i32 - self.right(),
            self.y,
            self.width,
            self.height,
        )
    }
}
