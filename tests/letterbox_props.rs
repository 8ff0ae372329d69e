use proptest::prelude::*;

use vision_relay::{letterbox, BoundingBox, Frame, LetterboxGeometry, PixelOrder};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn geometry_fits_and_centres(
        src_w in 1u32..=2000,
        src_h in 1u32..=2000,
        dst_w in 1u32..=1024,
        dst_h in 1u32..=1024,
    ) {
        let g = LetterboxGeometry::compute(src_w, src_h, dst_w, dst_h).unwrap();
        let ratio_x = dst_w as f32 / src_w as f32;
        let ratio_y = dst_h as f32 / src_h as f32;
        prop_assert_eq!(g.scale, ratio_x.min(ratio_y));

        prop_assert!(g.scaled_width >= 1 && g.scaled_width <= dst_w);
        prop_assert!(g.scaled_height >= 1 && g.scaled_height <= dst_h);
        prop_assert!(g.pad_left + g.scaled_width <= dst_w);
        prop_assert!(g.pad_top + g.scaled_height <= dst_h);

        let slack_x = dst_w - g.scaled_width - 2 * g.pad_left;
        let slack_y = dst_h - g.scaled_height - 2 * g.pad_top;
        prop_assert!(slack_x <= 1, "horizontal slack {}", slack_x);
        prop_assert!(slack_y <= 1, "vertical slack {}", slack_y);
    }

    #[test]
    fn inverse_stays_inside_source(
        src_w in 1u32..=2000,
        src_h in 1u32..=2000,
        left in -50i32..700,
        top in -50i32..700,
        w in 0i32..700,
        h in 0i32..700,
    ) {
        let g = LetterboxGeometry::compute(src_w, src_h, 640, 640).unwrap();
        let mapped = g.to_source(BoundingBox::new(left, top, left + w, top + h));
        prop_assert!(mapped.left >= 0 && mapped.right < src_w as i32);
        prop_assert!(mapped.top >= 0 && mapped.bottom < src_h as i32);
        prop_assert!(mapped.left <= mapped.right);
        prop_assert!(mapped.top <= mapped.bottom);
    }

    #[test]
    fn canvas_has_target_size_and_is_deterministic(
        src_w in 1u32..=96,
        src_h in 1u32..=96,
        dst in 8u32..=64,
        shade in 1u8..=255,
    ) {
        let frame = Frame::new(
            src_w,
            src_h,
            PixelOrder::Bgr,
            vec![shade; (src_w * src_h * 3) as usize],
        ).unwrap();
        let a = letterbox(&frame, dst, dst).unwrap();
        let b = letterbox(&frame, dst, dst).unwrap();

        prop_assert_eq!(a.canvas.width(), dst);
        prop_assert_eq!(a.canvas.height(), dst);
        prop_assert_eq!(a.canvas.order(), PixelOrder::Bgr);
        prop_assert_eq!(a.canvas.data(), b.canvas.data());

        let g = a.geometry;
        if g.pad_top > 0 {
            prop_assert!(a.canvas.data()[..(dst * 3) as usize].iter().all(|&c| c == 0));
        }
        if g.pad_left > 0 {
            prop_assert!(a.canvas.data()[..3].iter().all(|&c| c == 0));
        }
    }
}
