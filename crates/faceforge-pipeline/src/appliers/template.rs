//! A canonical frontal face laid out on the face-mesh indices.
//!
//! Used when no landmark detector is available, for demos and tests.
//! Only the indices the built-in appliers and the quality assessor read
//! are placed deliberately; every other landmark sits at the face
//! center.

use std::f64::consts::PI;

use super::regions::{
    CHIN_TIP, FACE_OUTLINE, FOREHEAD, LEFT_CHEEK, LEFT_CHEEKBONE, LEFT_EYESHADOW, LEFT_FACE_EDGE,
    LEFT_UPPER_LID, LIP_LOWER, LIP_UPPER, NOSE_BRIDGE_SIDES, NOSE_TIP, NOSE_WINGS, RIGHT_CHEEK,
    RIGHT_CHEEKBONE, RIGHT_EYESHADOW, RIGHT_FACE_EDGE, RIGHT_UPPER_LID,
};
use crate::types::{LandmarkSet, Point};

const LEFT_LOWER_LID: &[usize] = &[155, 154, 153, 145, 144, 163, 7];
const RIGHT_LOWER_LID: &[usize] = &[249, 390, 373, 374, 380, 381, 382];

struct Layout {
    points: Vec<Point>,
    cx: f64,
    cy: f64,
    /// Face half-width.
    a: f64,
    /// Face half-height.
    b: f64,
}

impl Layout {
    fn set(&mut self, index: usize, x: f64, y: f64) {
        if let Some(p) = self.points.get_mut(index) {
            *p = Point::new(x, y);
        }
    }

    /// Place `indices` along an elliptical arc from `from` to `to`
    /// (radians, y axis pointing up), both ends inclusive.
    #[allow(clippy::cast_precision_loss)]
    fn arc(&mut self, indices: &[usize], center: (f64, f64), radii: (f64, f64), from: f64, to: f64) {
        let n = indices.len().saturating_sub(1).max(1) as f64;
        for (k, &i) in indices.iter().enumerate() {
            let t = (to - from).mul_add(k as f64 / n, from);
            self.set(i, radii.0.mul_add(t.cos(), center.0), (-radii.1).mul_add(t.sin(), center.1));
        }
    }

    /// Place `indices` strictly inside an arc, excluding both ends.
    #[allow(clippy::cast_precision_loss)]
    fn arc_between(&mut self, indices: &[usize], center: (f64, f64), radii: (f64, f64), from: f64, to: f64) {
        let n = (indices.len() + 1) as f64;
        for (k, &i) in indices.iter().enumerate() {
            let t = (to - from).mul_add((k + 1) as f64 / n, from);
            self.set(i, radii.0.mul_add(t.cos(), center.0), (-radii.1).mul_add(t.sin(), center.1));
        }
    }

    fn mirror(&mut self, left: usize, right: usize) {
        if let Some(p) = self.points.get(left).copied() {
            self.set(right, 2.0f64.mul_add(self.cx, -p.x), p.y);
        }
    }

    fn outline(&mut self) {
        let (cx, cy, a, b) = (self.cx, self.cy, self.a, self.b);
        // Chin to forehead down the left side, then back down the right.
        let split = FACE_OUTLINE.iter().position(|&i| i == FOREHEAD).unwrap_or(FACE_OUTLINE.len() / 2);
        let (left, right) = FACE_OUTLINE.split_at(split);
        self.arc(left, (cx, cy), (a, b), 1.5 * PI, PI * 0.5 + PI * 0.01);
        let mut right: Vec<usize> = right.to_vec();
        right.push(CHIN_TIP);
        self.arc(&right, (cx, cy), (a, b), PI * 0.5, -0.5 * PI);

        self.set(FOREHEAD, cx, cy - b);
        self.set(CHIN_TIP, cx, cy + b);
        self.set(LEFT_FACE_EDGE, cx - a, cy);
        self.set(RIGHT_FACE_EDGE, cx + a, cy);
        for (l, r) in [(172, 397), (136, 365), (58, 288), (132, 361), (150, 379), (149, 378)] {
            self.mirror(l, r);
        }
    }

    fn eyes(&mut self) {
        let (cx, cy, a, b) = (self.cx, self.cy, self.a, self.b);
        let (ew, eh) = (0.18 * a, 0.07 * b);
        let ey = 0.25f64.mul_add(-b, cy);
        let left = (0.4f64.mul_add(-a, cx), ey);
        let right = (0.4f64.mul_add(a, cx), ey);

        // Left eye: outer corner at smaller x.
        self.arc(LEFT_UPPER_LID, left, (ew, eh), PI, 0.0);
        self.arc_between(LEFT_LOWER_LID, left, (ew, eh), 0.0, -PI);
        self.arc(RIGHT_UPPER_LID, right, (ew, eh), 0.0, PI);
        self.arc_between(RIGHT_LOWER_LID, right, (ew, eh), 0.0, -PI);

        // Brow-side arc of each eyeshadow region; lid points are already
        // placed.
        let left_arc = &LEFT_EYESHADOW[..9];
        self.arc(left_arc, (left.0, left.1), (ew * 1.3, eh * 3.0), PI, 0.0);
        self.set(130, left.0 - ew * 1.3, left.1 + eh * 0.3);
        let right_arc = &RIGHT_EYESHADOW[..10];
        self.arc(right_arc, (right.0, right.1), (ew * 1.3, eh * 3.0), PI, 0.0);
    }

    fn mouth(&mut self) {
        let (cx, cy, a, b) = (self.cx, self.cy, self.a, self.b);
        let mouth = (cx, 0.45f64.mul_add(b, cy));
        let mw = 0.35 * a;
        // Outer contours share the corners (61, 291); inner contours
        // share the inner corners (308, 78).
        self.arc(&LIP_UPPER[..11], mouth, (mw, 0.08 * b), PI, 0.0);
        self.arc(&LIP_UPPER[11..], mouth, (mw * 0.8, 0.015 * b), 0.0, PI);
        self.arc(&LIP_LOWER[..11], mouth, (mw, 0.1 * b), PI, 2.0 * PI);
        self.arc_between(&LIP_LOWER[12..20], mouth, (mw * 0.8, 0.015 * b), 0.0, -PI);
    }

    fn cheeks_and_nose(&mut self) {
        let (cx, cy, a, b) = (self.cx, self.cy, self.a, self.b);
        self.set(LEFT_CHEEK, 0.55f64.mul_add(-a, cx), 0.1f64.mul_add(b, cy));
        self.mirror(LEFT_CHEEK, RIGHT_CHEEK);

        let cheek = (0.6f64.mul_add(-a, cx), cy);
        self.arc(LEFT_CHEEKBONE, cheek, (0.1 * a, 0.06 * b), 0.0, 2.0 * PI * 6.0 / 7.0);
        for (&l, &r) in LEFT_CHEEKBONE.iter().zip(RIGHT_CHEEKBONE) {
            self.mirror(l, r);
        }

        for (&i, dy) in NOSE_TIP.iter().zip([0.15f64, 0.2, 0.1, 0.05]) {
            self.set(i, cx, dy.mul_add(b, cy));
        }
        let (left_wings, right_wings) = NOSE_WINGS.split_at(3);
        for (k, (&l, &r)) in left_wings.iter().zip(right_wings).enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let dy = (0.03f64).mul_add(k as f64, 0.12);
            self.set(l, 0.15f64.mul_add(-a, cx), dy.mul_add(b, cy));
            self.mirror(l, r);
        }
        let (left_bridge, right_bridge) = NOSE_BRIDGE_SIDES.split_at(2);
        for (k, (&l, &r)) in left_bridge.iter().zip(right_bridge).enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let dy = (0.08f64).mul_add(k as f64, -0.1);
            self.set(l, 0.07f64.mul_add(-a, cx), dy.mul_add(b, cy));
            self.mirror(l, r);
        }
    }
}

/// A frontal face centered in a `width` x `height` image, filling 60% of
/// the width and 80% of the height.
#[must_use]
pub fn template_landmarks(width: u32, height: u32) -> LandmarkSet {
    let (w, h) = (f64::from(width), f64::from(height));
    let (cx, cy) = (w / 2.0, h / 2.0);
    let mut layout = Layout {
        points: vec![Point::new(cx, cy); LandmarkSet::FACE_MESH_LEN],
        cx,
        cy,
        a: 0.3 * w,
        b: 0.4 * h,
    };
    layout.outline();
    layout.eyes();
    layout.mouth();
    layout.cheeks_and_nose();
    LandmarkSet::new(layout.points)
}
