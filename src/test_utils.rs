use crate::prelude::Float;
use crate::prelude::Point3d;

pub fn assert_float_is_close(x: Float, y: Float) {
    assert!((x - y).abs() < 1e3 * Float::EPSILON, "{} {}", x, y)
}

pub fn assert_float_is_close_high_error(x: Float, y: Float) {
    assert!((x - y).abs() < 1e-9, "{} {}", x, y)
}

pub fn assert_point_is_close(x: Point3d, y: Point3d) {
    assert!((x - y).length() < 1e3 * Float::EPSILON, "{} {}", x, y)
}
