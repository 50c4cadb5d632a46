use kurbo::{Affine, Point};

use crate::composition::store::PreparedImage;
use crate::foundation::error::{VidloomError, VidloomResult};

/// An owned drawing surface: premultiplied RGBA8 pixels plus a canvas-style
/// transform stack.
///
/// Transform calls concatenate onto the current transform in call order, so
/// `scale` → `translate` → `rotate` leaves scale outermost, matching a
/// standard 2D affine pipeline.
#[derive(Clone, Debug)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
    transform: Affine,
    saved: Vec<Affine>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> VidloomResult<Self> {
        if width == 0 || height == 0 {
            return Err(VidloomError::render("surface width/height must be > 0"));
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(4))
            .ok_or_else(|| VidloomError::render("surface size overflow"))?;
        Ok(Self {
            width,
            height,
            data: vec![0u8; len],
            transform: Affine::IDENTITY,
            saved: Vec::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Premultiplied RGBA8 pixels, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Fill every pixel with `rgba8_premul`, leaving the transform untouched.
    pub fn clear(&mut self, rgba8_premul: [u8; 4]) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba8_premul);
        }
    }

    /// Push the current transform onto the save stack.
    pub fn save(&mut self) {
        self.saved.push(self.transform);
    }

    /// Pop the most recently saved transform. A restore with nothing saved is
    /// a no-op, as on a 2D canvas.
    pub fn restore(&mut self) {
        if let Some(prev) = self.saved.pop() {
            self.transform = prev;
        }
    }

    pub fn current_transform(&self) -> Affine {
        self.transform
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.transform *= Affine::scale_non_uniform(sx, sy);
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.transform *= Affine::translate((dx, dy));
    }

    pub fn rotate(&mut self, rad: f64) {
        self.transform *= Affine::rotate(rad);
    }

    /// Draw `img` into the rectangle `[0, dst_w] × [0, dst_h]` under the
    /// current transform, inverse-mapping each covered target pixel and
    /// sampling nearest.
    pub fn draw_image(
        &mut self,
        img: &PreparedImage,
        dst_w: f64,
        dst_h: f64,
    ) -> VidloomResult<()> {
        if img.width == 0 || img.height == 0 || dst_w <= 0.0 || dst_h <= 0.0 {
            return Ok(());
        }

        // Source pixel coords -> surface coords.
        let full = self.transform
            * Affine::scale_non_uniform(
                dst_w / f64::from(img.width),
                dst_h / f64::from(img.height),
            );
        if full.determinant().abs() < 1e-12 {
            return Ok(());
        }
        let inv = full.inverse();

        let src_w = f64::from(img.width);
        let src_h = f64::from(img.height);
        let corners = [
            full * Point::new(0.0, 0.0),
            full * Point::new(src_w, 0.0),
            full * Point::new(0.0, src_h),
            full * Point::new(src_w, src_h),
        ];
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = (max_x.ceil().min(f64::from(self.width))).max(0.0) as u32;
        let y1 = (max_y.ceil().min(f64::from(self.height))).max(0.0) as u32;

        let src = img.rgba8_premul.as_slice();
        for y in y0..y1 {
            for x in x0..x1 {
                let p = inv * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if p.x < 0.0 || p.y < 0.0 || p.x >= src_w || p.y >= src_h {
                    continue;
                }
                let sx = p.x as u32;
                let sy = p.y as u32;
                let si = ((sy * img.width + sx) * 4) as usize;
                let di = ((y * self.width + x) * 4) as usize;
                let out = over(
                    [
                        self.data[di],
                        self.data[di + 1],
                        self.data[di + 2],
                        self.data[di + 3],
                    ],
                    [src[si], src[si + 1], src[si + 2], src[si + 3]],
                );
                self.data[di..di + 4].copy_from_slice(&out);
            }
        }
        Ok(())
    }
}

/// Premultiplied source-over blend.
fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> PreparedImage {
        let mut data = Vec::new();
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        PreparedImage {
            width,
            height,
            rgba8_premul: Arc::new(data),
        }
    }

    fn px(surface: &Surface, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * surface.width() + x) * 4) as usize;
        let d = surface.data();
        [d[i], d[i + 1], d[i + 2], d[i + 3]]
    }

    const RED: [u8; 4] = [255, 0, 0, 255];
    const CLEAR: [u8; 4] = [0, 0, 0, 0];

    #[test]
    fn identity_draw_covers_target_rect() {
        let mut s = Surface::new(4, 4).unwrap();
        s.draw_image(&solid(2, 2, RED), 4.0, 4.0).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(px(&s, x, y), RED, "({x},{y})");
            }
        }
    }

    #[test]
    fn translate_offsets_the_draw() {
        let mut s = Surface::new(4, 4).unwrap();
        s.translate(2.0, 0.0);
        s.draw_image(&solid(2, 2, RED), 2.0, 2.0).unwrap();
        assert_eq!(px(&s, 3, 0), RED);
        assert_eq!(px(&s, 2, 1), RED);
        assert_eq!(px(&s, 1, 0), CLEAR);
        assert_eq!(px(&s, 3, 2), CLEAR);
    }

    #[test]
    fn scale_is_outermost_when_applied_first() {
        // scale(2,2) then translate(1,0): target offset lands at x=2.
        let mut s = Surface::new(4, 4).unwrap();
        s.scale(2.0, 2.0);
        s.translate(1.0, 0.0);
        s.draw_image(&solid(1, 1, RED), 1.0, 1.0).unwrap();
        assert_eq!(px(&s, 2, 0), RED);
        assert_eq!(px(&s, 3, 1), RED);
        assert_eq!(px(&s, 0, 0), CLEAR);
    }

    #[test]
    fn rotate_half_turn_about_translated_origin() {
        let mut s = Surface::new(4, 4).unwrap();
        s.translate(2.0, 2.0);
        s.rotate(std::f64::consts::PI);
        s.draw_image(&solid(2, 2, RED), 2.0, 2.0).unwrap();
        // The rect reflects through (2,2) back onto [0,2)².
        assert_eq!(px(&s, 0, 0), RED);
        assert_eq!(px(&s, 1, 1), RED);
        assert_eq!(px(&s, 3, 3), CLEAR);
    }

    #[test]
    fn save_restore_round_trips_the_transform() {
        let mut s = Surface::new(4, 4).unwrap();
        s.save();
        s.translate(2.0, 2.0);
        s.restore();
        assert_eq!(s.current_transform(), Affine::IDENTITY);
        // Restore on an empty stack is tolerated.
        s.restore();
        assert_eq!(s.current_transform(), Affine::IDENTITY);
    }

    #[test]
    fn off_canvas_draw_is_a_noop() {
        let mut s = Surface::new(4, 4).unwrap();
        s.translate(100.0, 100.0);
        s.draw_image(&solid(2, 2, RED), 2.0, 2.0).unwrap();
        assert!(s.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn semitransparent_src_blends_over_dst() {
        let mut s = Surface::new(1, 1).unwrap();
        s.clear([0, 0, 255, 255]);
        // Premultiplied 50% red.
        s.draw_image(&solid(1, 1, [128, 0, 0, 128]), 1.0, 1.0).unwrap();
        let got = px(&s, 0, 0);
        assert_eq!(got[0], 128);
        assert!(got[2] > 100 && got[2] < 140, "blue partially retained: {got:?}");
        assert_eq!(got[3], 255);
    }
}
