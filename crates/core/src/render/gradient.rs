use crate::analysis::Rgb;

use super::composite::Canvas;

/// Interpolates across `stops` at `position` in `[0, 1]`.
///
/// The position is mapped into `[0, stops - 1)` to pick the bracketing pair,
/// so `0.0` lands exactly on the first stop and `1.0` exactly on the last.
pub fn gradient_color(stops: &[Rgb], position: f32) -> Rgb {
    match stops {
        [] => Rgb::BLACK,
        [only] => *only,
        _ => {
            let span = (stops.len() - 1) as f32;
            let scaled = position.clamp(0.0, 1.0) * span;
            let index = (scaled as usize).min(stops.len() - 2);
            let factor = scaled - index as f32;
            lerp(stops[index], stops[index + 1], factor)
        }
    }
}

fn lerp(a: Rgb, b: Rgb, t: f32) -> Rgb {
    let mix = |x: u8, y: u8| (f32::from(x) * (1.0 - t) + f32::from(y) * t).round() as u8;
    Rgb::new(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b))
}

/// Fills the whole canvas with an opaque diagonal gradient, top-left to
/// bottom-right, where pixel `(x, y)` sits at `(x + y) / (width + height)`.
pub fn fill_diagonal(canvas: &mut Canvas, stops: &[Rgb]) {
    let width = canvas.width() as usize;
    let denom = (canvas.width() + canvas.height()) as f32;
    for (i, px) in canvas.data_mut().chunks_exact_mut(4).enumerate() {
        let (x, y) = (i % width, i / width);
        let color = gradient_color(stops, (x + y) as f32 / denom);
        px.copy_from_slice(&[color.r, color.g, color.b, 255]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb::new(255, 0, 0);
    const BLUE: Rgb = Rgb::new(0, 0, 255);

    #[test]
    fn two_stop_boundaries_are_exact() {
        assert_eq!(gradient_color(&[RED, BLUE], 0.0), RED);
        assert_eq!(gradient_color(&[RED, BLUE], 1.0), BLUE);
    }

    #[test]
    fn midpoint_blends_linearly() {
        let mid = gradient_color(&[Rgb::BLACK, Rgb::new(200, 100, 50)], 0.5);
        assert_eq!(mid, Rgb::new(100, 50, 25));
    }

    #[test]
    fn three_stops_hit_middle_stop_at_half() {
        let green = Rgb::new(0, 255, 0);
        assert_eq!(gradient_color(&[RED, green, BLUE], 0.5), green);
        assert_eq!(gradient_color(&[RED, green, BLUE], 1.0), BLUE);
    }

    #[test]
    fn degenerate_stop_lists() {
        assert_eq!(gradient_color(&[RED], 0.7), RED);
        assert_eq!(gradient_color(&[], 0.7), Rgb::BLACK);
    }

    #[test]
    fn fill_is_opaque_and_diagonal() {
        let mut canvas = Canvas::new(20, 10).unwrap();
        fill_diagonal(&mut canvas, &[RED, BLUE]);

        assert_eq!(canvas.pixel(0, 0), [255, 0, 0, 255]);
        // Pixels on the same anti-diagonal share a colour.
        assert_eq!(canvas.pixel(5, 3), canvas.pixel(3, 5));
        let far = canvas.pixel(19, 9);
        assert!(far[2] > far[0]);
        assert!(canvas.data().chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn output_is_reproducible() {
        let mut a = Canvas::new(16, 16).unwrap();
        let mut b = Canvas::new(16, 16).unwrap();
        fill_diagonal(&mut a, &[RED, BLUE, Rgb::new(10, 10, 10)]);
        fill_diagonal(&mut b, &[RED, BLUE, Rgb::new(10, 10, 10)]);
        assert_eq!(a.data(), b.data());
    }
}
