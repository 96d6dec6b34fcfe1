use rand::Rng;
use vello_cpu::{
    kurbo::{Affine, Circle, Point, Rect, RoundedRect, Shape},
    peniko::Color,
    RenderContext,
};

use crate::analysis::Rgb;

/// Number of decorative shapes scattered over the gradient.
pub const OVERLAY_SHAPES: usize = 20;
pub const MIN_SHAPE_SIZE: u32 = 100;
pub const MAX_SHAPE_SIZE: u32 = 400;
pub const MIN_SHAPE_ALPHA: u8 = 5;
pub const MAX_SHAPE_ALPHA: u8 = 15;
/// Alpha of the bottom row of the depth ramp.
pub const DEPTH_RAMP_MAX_ALPHA: u32 = 30;

const PATH_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Circle,
    RoundedRect,
}

/// One near-invisible texture shape, positioned by its bounding square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayShape {
    pub kind: ShapeKind,
    pub x: i32,
    pub y: i32,
    pub size: u32,
    pub alpha: u8,
    pub rotation_deg: u32,
}

/// Picks `count` shapes for a `width` x `height` canvas.
///
/// Shapes may hang off any edge by up to half their size.
pub fn plan_overlay<R: Rng + ?Sized>(
    rng: &mut R,
    width: u32,
    height: u32,
    count: usize,
) -> Vec<OverlayShape> {
    (0..count)
        .map(|_| {
            let size = rng.random_range(MIN_SHAPE_SIZE..=MAX_SHAPE_SIZE);
            let half = (size / 2) as i32;
            let x = rng.random_range(-half..=width as i32 + half);
            let y = rng.random_range(-half..=height as i32 + half);
            let alpha = rng.random_range(MIN_SHAPE_ALPHA..=MAX_SHAPE_ALPHA);
            let kind = if rng.random_bool(0.5) {
                ShapeKind::Circle
            } else {
                ShapeKind::RoundedRect
            };
            let rotation_deg = rng.random_range(0..360);
            OverlayShape {
                kind,
                x,
                y,
                size,
                alpha,
                rotation_deg,
            }
        })
        .collect()
}

pub fn draw_overlay(ctx: &mut RenderContext, shapes: &[OverlayShape]) {
    for shape in shapes {
        let x0 = f64::from(shape.x);
        let y0 = f64::from(shape.y);
        let size = f64::from(shape.size);
        let center = Point::new(x0 + size / 2.0, y0 + size / 2.0);

        ctx.set_paint(Color::from_rgba8(255, 255, 255, shape.alpha));
        match shape.kind {
            ShapeKind::Circle => {
                ctx.set_transform(Affine::IDENTITY);
                ctx.fill_path(&Circle::new(center, size / 2.0).to_path(PATH_TOLERANCE));
            }
            ShapeKind::RoundedRect => {
                let angle = f64::from(shape.rotation_deg).to_radians();
                ctx.set_transform(Affine::rotate_about(angle, center));
                let rect = RoundedRect::new(x0, y0, x0 + size, y0 + size, size / 4.0);
                ctx.fill_path(&rect.to_path(PATH_TOLERANCE));
            }
        }
    }
    ctx.set_transform(Affine::IDENTITY);
}

/// Soft glow behind the album art: ten nested rectangles, each inset by two
/// pixels and two alpha steps fainter than the last.
pub fn draw_glow(ctx: &mut RenderContext, color: Rgb, x: f64, y: f64, size: f64) {
    ctx.set_transform(Affine::IDENTITY);
    for i in 0..10u8 {
        let inset = f64::from(i) * 2.0;
        let alpha = 20 - i * 2;
        ctx.set_paint(Color::from_rgba8(color.r, color.g, color.b, alpha));
        ctx.fill_rect(&Rect::new(
            x + inset,
            y + inset,
            x + size - inset,
            y + size - inset,
        ));
    }
}

/// Darkens the lower part of the card: row `i` gets black at
/// `i / height * 30` alpha.
pub fn draw_depth_ramp(ctx: &mut RenderContext, width: u32, height: u32) {
    ctx.set_transform(Affine::IDENTITY);
    for row in 0..height {
        let alpha = (row * DEPTH_RAMP_MAX_ALPHA / height) as u8;
        if alpha == 0 {
            continue;
        }
        ctx.set_paint(Color::from_rgba8(0, 0, 0, alpha));
        ctx.fill_rect(&Rect::new(
            0.0,
            f64::from(row),
            f64::from(width),
            f64::from(row + 1),
        ));
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::render::{composite::Canvas, gradient};

    #[test]
    fn seeded_plan_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let shapes = plan_overlay(&mut rng, 1200, 630, OVERLAY_SHAPES);

        assert_eq!(shapes.len(), OVERLAY_SHAPES);
        for shape in &shapes {
            assert!((MIN_SHAPE_SIZE..=MAX_SHAPE_SIZE).contains(&shape.size));
            assert!((MIN_SHAPE_ALPHA..=MAX_SHAPE_ALPHA).contains(&shape.alpha));
            let half = (shape.size / 2) as i32;
            assert!(shape.x >= -half && shape.x <= 1200 + half);
            assert!(shape.y >= -half && shape.y <= 630 + half);
            assert!(shape.rotation_deg < 360);
        }
    }

    #[test]
    fn same_seed_same_plan() {
        let a = plan_overlay(&mut StdRng::seed_from_u64(99), 800, 400, 20);
        let b = plan_overlay(&mut StdRng::seed_from_u64(99), 800, 400, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn both_shape_kinds_are_used() {
        let shapes = plan_overlay(&mut StdRng::seed_from_u64(3), 800, 400, 200);
        assert!(shapes.iter().any(|s| s.kind == ShapeKind::Circle));
        assert!(shapes.iter().any(|s| s.kind == ShapeKind::RoundedRect));
    }

    fn luminance_variance(canvas: &Canvas) -> f64 {
        let values: Vec<f64> = canvas
            .data()
            .chunks_exact(4)
            .map(|px| f64::from(px[0]) + f64::from(px[1]) + f64::from(px[2]))
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    }

    #[test]
    fn overlay_changes_pixel_variance() {
        let mut canvas = Canvas::new(200, 120).unwrap();
        let flat = Rgb::new(60, 60, 60);
        gradient::fill_diagonal(&mut canvas, &[flat, flat]);
        let before = luminance_variance(&canvas);

        let mut layer = canvas.layer();
        let shapes = plan_overlay(&mut StdRng::seed_from_u64(11), 200, 120, OVERLAY_SHAPES);
        draw_overlay(&mut layer, &shapes);
        canvas.composite(layer).unwrap();

        assert_eq!(before, 0.0);
        assert!(luminance_variance(&canvas) > 0.0);
    }

    #[test]
    fn depth_ramp_darkens_bottom_only() {
        let mut canvas = Canvas::new(10, 100).unwrap();
        let grey = Rgb::new(200, 200, 200);
        gradient::fill_diagonal(&mut canvas, &[grey, grey]);

        let mut layer = canvas.layer();
        draw_depth_ramp(&mut layer, 10, 100);
        canvas.composite(layer).unwrap();

        assert_eq!(canvas.pixel(5, 0), [200, 200, 200, 255]);
        assert!(canvas.pixel(5, 99)[0] < 200);
    }
}
