use ndarray::{Array2, ArrayView2};

use crate::shared::region::Region;

/// Summed-area tables over a luma image.
///
/// Both tables have shape `(height + 1, width + 1)` with a zero first row and
/// column, so the sum over `[x, x+w) x [y, y+h)` needs four lookups.
pub struct IntegralImage {
    sum: Array2<i64>,
    sq_sum: Array2<i64>,
}

impl IntegralImage {
    pub fn new(luma: ArrayView2<'_, u8>) -> Self {
        let (h, w) = luma.dim();
        let mut sum = Array2::<i64>::zeros((h + 1, w + 1));
        let mut sq_sum = Array2::<i64>::zeros((h + 1, w + 1));

        for y in 0..h {
            let mut row_sum = 0i64;
            let mut row_sq = 0i64;
            for x in 0..w {
                let v = luma[[y, x]] as i64;
                row_sum += v;
                row_sq += v * v;
                sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row_sum;
                sq_sum[[y + 1, x + 1]] = sq_sum[[y, x + 1]] + row_sq;
            }
        }

        Self { sum, sq_sum }
    }

    pub fn width(&self) -> usize {
        self.sum.ncols() - 1
    }

    pub fn height(&self) -> usize {
        self.sum.nrows() - 1
    }

    /// Pixel sum over `rect`, which must lie inside the image.
    #[inline]
    pub fn rect_sum(&self, rect: &Region) -> i64 {
        Self::lookup(&self.sum, rect)
    }

    /// Sum of squared pixels over `rect`, which must lie inside the image.
    #[inline]
    pub fn rect_sq_sum(&self, rect: &Region) -> i64 {
        Self::lookup(&self.sq_sum, rect)
    }

    #[inline]
    fn lookup(table: &Array2<i64>, rect: &Region) -> i64 {
        let x1 = rect.x as usize;
        let y1 = rect.y as usize;
        let x2 = rect.right() as usize;
        let y2 = rect.bottom() as usize;
        table[[y2, x2]] - table[[y1, x2]] - table[[y2, x1]] + table[[y1, x1]]
    }
}
